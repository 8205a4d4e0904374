//! Struct and implementation of the Contact entry in the Kademlia routing table
use std::{
    fmt::{self, Debug, Formatter},
    net::SocketAddr,
    time::Instant,
};

use crate::common::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// How a peer is reachable from the public internet.
pub enum NatType {
    #[default]
    Unknown,
    /// Publicly reachable, no NAT in the way.
    Direct,
    /// Reachable once a hole is punched through a rendezvous peer.
    Traversable,
    /// Only reachable through a rendezvous peer.
    Symmetric,
}

impl NatType {
    pub(crate) fn code(&self) -> i64 {
        match self {
            NatType::Unknown => 0,
            NatType::Direct => 1,
            NatType::Traversable => 2,
            NatType::Symmetric => 3,
        }
    }

    pub(crate) fn from_code(code: i64) -> NatType {
        match code {
            1 => NatType::Direct,
            2 => NatType::Traversable,
            3 => NatType::Symmetric,
            _ => NatType::Unknown,
        }
    }
}

#[derive(Clone)]
/// Contact entry in the Kademlia routing table
pub struct Contact {
    id: Id,
    address: SocketAddr,
    local_address: Option<SocketAddr>,
    rendezvous_address: Option<SocketAddr>,
    nat_type: NatType,
    public_key: Option<[u8; 32]>,

    failed_rpcs: u16,
    last_seen: Instant,
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("nat_type", &self.nat_type)
            .field("failed_rpcs", &self.failed_rpcs)
            .finish()
    }
}

impl Contact {
    /// Creates a new Contact from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Contact {
        Contact {
            id,
            address,
            local_address: None,
            rendezvous_address: None,
            nat_type: NatType::Unknown,
            public_key: None,

            failed_rpcs: 0,
            last_seen: Instant::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn random() -> Contact {
        Contact::new(Id::random(), SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    // === Options ===

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = id;
        self
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_local_address(mut self, local_address: Option<SocketAddr>) -> Self {
        self.local_address = local_address;
        self
    }

    pub fn with_rendezvous_address(mut self, rendezvous_address: Option<SocketAddr>) -> Self {
        self.rendezvous_address = rendezvous_address;
        self
    }

    pub fn with_nat_type(mut self, nat_type: NatType) -> Self {
        self.nat_type = nat_type;
        self
    }

    pub fn with_public_key(mut self, public_key: Option<[u8; 32]>) -> Self {
        self.public_key = public_key;
        self
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    pub fn rendezvous_address(&self) -> Option<SocketAddr> {
        self.rendezvous_address
    }

    pub fn nat_type(&self) -> NatType {
        self.nat_type
    }

    pub fn public_key(&self) -> Option<&[u8; 32]> {
        self.public_key.as_ref()
    }

    /// Consecutive RPCs to this contact that timed out since it was last seen.
    pub fn failed_rpcs(&self) -> u16 {
        self.failed_rpcs
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Returns true if this contact failed at least `tolerance` consecutive RPCs.
    pub fn is_stale(&self, tolerance: u16) -> bool {
        self.failed_rpcs >= tolerance
    }

    // === Private Methods ===

    pub(crate) fn mark_failed(&mut self) -> u16 {
        self.failed_rpcs = self.failed_rpcs.saturating_add(1);
        self.failed_rpcs
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.address == other.address
            && self.local_address == other.local_address
            && self.rendezvous_address == other.rendezvous_address
            && self.nat_type == other.nat_type
            && self.public_key == other.public_key
    }
}

impl Eq for Contact {}
