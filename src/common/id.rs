//! Kademlia node Id, lookup target, or record key.
use rand::Rng;
use sha1_smol::Sha1;
use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits, which is also the largest [Id::distance_class].
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
/// Kademlia node Id, lookup target, or record key.
pub struct Id([u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// SHA-1 hash of arbitrary bytes as an Id.
    pub fn hash(bytes: &[u8]) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(bytes);

        Id(hasher.digest().bytes())
    }

    /// The Id of a node or signer owning this ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Id {
        Id::hash(public_key)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Bitwise XOR of two Ids.
    pub fn xor(&self, other: &Id) -> Id {
        let mut result = [0_u8; ID_SIZE];

        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            result[i] = a ^ b;
        }

        Id(result)
    }

    /// XOR distance between this Id and another.
    ///
    /// The result is itself an [Id] whose [Ord] implementation compares it
    /// as a big-endian unsigned integer, so smaller means closer.
    pub fn distance(&self, other: &Id) -> Id {
        self.xor(other)
    }

    /// Number of significant bits in the XOR distance to `other`.
    ///
    /// Distance class to self is 0
    /// Distance class to the furthest Ids is 160
    /// Distance class to an Id with 5 leading matching bits is 155
    pub fn distance_class(&self, other: &Id) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    /// Orders `a` and `b` by their distance to `self`, ties broken by raw Id.
    pub fn cmp_distance(&self, a: &Id, b: &Id) -> Ordering {
        self.xor(a).cmp(&self.xor(b)).then_with(|| a.cmp(b))
    }

    /// Returns true if `a` is strictly closer to `self` than `b`.
    pub fn closer_than(&self, a: &Id, b: &Id) -> bool {
        self.cmp_distance(a, b) == Ordering::Less
    }

    /// A random Id whose [Id::distance_class] from `self` is exactly `class`.
    pub fn random_at_distance(&self, class: u8) -> Id {
        if class == 0 {
            return *self;
        }

        let class = class.min(MAX_DISTANCE);
        let mut xor: [u8; ID_SIZE] = rand::thread_rng().gen();

        // Index of the highest set bit of the xor, counting from the least significant bit.
        let bit = (class - 1) as usize;
        let byte_index = ID_SIZE - 1 - bit / 8;
        let bit_in_byte = bit % 8;

        for byte in xor.iter_mut().take(byte_index) {
            *byte = 0;
        }
        xor[byte_index] &= ((1_u16 << (bit_in_byte + 1)) - 1) as u8;
        xor[byte_index] |= 1 << bit_in_byte;

        Id(xor).xor(self)
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Id {
        Id(bytes)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if s.len() != ID_SIZE * 2 || !s.is_ascii() {
            return Err(Error::InvalidIdEncoding(s.to_string()));
        }

        let mut bytes = [0_u8; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidIdEncoding(s.to_string()))?;
        }

        Ok(Id(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        for _ in 0..100 {
            let a = Id::random();
            let b = Id::random();

            assert_eq!(a.distance(&b), b.distance(&a));
            assert_eq!(a.distance_class(&b), b.distance_class(&a));
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let id = Id::random();

        assert_eq!(id.distance(&id), Id([0; ID_SIZE]));
        assert_eq!(id.distance_class(&id), 0);
    }

    #[test]
    fn distance_class() {
        let id = Id([0; ID_SIZE]);

        let mut furthest = [0; ID_SIZE];
        furthest[0] = 0b1000_0000;
        assert_eq!(id.distance_class(&Id(furthest)), 160);

        let mut five_matching_bits = [0; ID_SIZE];
        five_matching_bits[0] = 0b0000_0100;
        assert_eq!(id.distance_class(&Id(five_matching_bits)), 155);

        let mut closest = [0; ID_SIZE];
        closest[ID_SIZE - 1] = 1;
        assert_eq!(id.distance_class(&Id(closest)), 1);
    }

    #[test]
    fn random_at_distance() {
        let id = Id::random();

        for class in 1..=MAX_DISTANCE {
            assert_eq!(id.distance_class(&id.random_at_distance(class)), class);
        }

        assert_eq!(id.random_at_distance(0), id);
    }

    #[test]
    fn closer_than_is_a_strict_total_order() {
        let target = Id([0; ID_SIZE]);

        let mut a = [0; ID_SIZE];
        a[ID_SIZE - 1] = 2;
        let mut b = [0; ID_SIZE];
        b[ID_SIZE - 1] = 5;

        assert!(target.closer_than(&Id(a), &Id(b)));
        assert!(!target.closer_than(&Id(b), &Id(a)));
        assert!(!target.closer_than(&Id(a), &Id(a)));
        assert_eq!(target.cmp_distance(&Id(a), &Id(a)), Ordering::Equal);
    }

    #[test]
    fn from_str() {
        let id = Id::from_str("5a3ce9c14e7a08645677bbd1cfe7d8f956d53256").unwrap();

        assert_eq!(id.to_string(), "5a3ce9c14e7a08645677bbd1cfe7d8f956d53256");
        assert!(Id::from_str("5a3ce9").is_err());
        assert!(Id::from_str("zz3ce9c14e7a08645677bbd1cfe7d8f956d53256").is_err());
    }

    #[test]
    fn from_bytes_checks_size() {
        assert!(matches!(
            Id::from_bytes([0_u8; 19]),
            Err(Error::InvalidIdSize(19))
        ));
        assert!(Id::from_bytes([0_u8; 20]).is_ok());
    }
}
