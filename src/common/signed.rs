//! Signed values and the signed requests authorizing changes to them.

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::Id;

/// Sign a message with an ed25519 signing key.
pub fn sign(signer: &SigningKey, message: &[u8]) -> [u8; 64] {
    signer.sign(message).to_bytes()
}

/// Verify an ed25519 signature against a public key.
pub fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), SignatureError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| SignatureError::InvalidPublicKey)?;

    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Hash arbitrary bytes into an [Id], usually to derive a record key.
pub fn hash(bytes: &[u8]) -> Id {
    Id::hash(bytes)
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A value and the ed25519 signature of its bytes.
pub struct SignedValue {
    value: Bytes,
    signature: [u8; 64],
}

impl SignedValue {
    /// Sign a value.
    pub fn new(signer: &SigningKey, value: &[u8]) -> Self {
        Self {
            value: Bytes::copy_from_slice(value),
            signature: sign(signer, value),
        }
    }

    /// Create a signed value from an already computed signature.
    pub fn new_signed_unchecked(value: Bytes, signature: [u8; 64]) -> Self {
        Self { value, signature }
    }

    // === Getters ===

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    // === Public Methods ===

    pub fn verify(&self, public_key: &[u8; 32]) -> Result<(), SignatureError> {
        verify(public_key, &self.value, &self.signature)
            .map_err(|_| SignatureError::InvalidValueSignature)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Proof that the owner of a public key asked for a change to a record key.
pub struct SignedRequest {
    signer_id: Id,
    public_key: [u8; 32],
    /// Self-signature of the public key.
    public_key_validation: [u8; 64],
    /// Signature over `public_key ‖ public_key_validation ‖ key`.
    signature: [u8; 64],
}

impl SignedRequest {
    /// Sign a request to store, update or delete values under `key`.
    pub fn new(signer: &SigningKey, key: &Id) -> Self {
        let public_key = signer.verifying_key().to_bytes();
        let public_key_validation = sign(signer, &public_key);
        let signature = sign(
            signer,
            &encode_signable(&public_key, &public_key_validation, key),
        );

        Self {
            signer_id: Id::from_public_key(&public_key),
            public_key,
            public_key_validation,
            signature,
        }
    }

    /// Create a signed request from already computed parts.
    pub fn new_signed_unchecked(
        signer_id: Id,
        public_key: [u8; 32],
        public_key_validation: [u8; 64],
        signature: [u8; 64],
    ) -> Self {
        Self {
            signer_id,
            public_key,
            public_key_validation,
            signature,
        }
    }

    // === Getters ===

    pub fn signer_id(&self) -> &Id {
        &self.signer_id
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn public_key_validation(&self) -> &[u8; 64] {
        &self.public_key_validation
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    // === Public Methods ===

    /// Verify that this request authorizes a change to `key`.
    pub fn verify(&self, key: &Id) -> Result<(), SignatureError> {
        if Id::from_public_key(&self.public_key) != self.signer_id {
            return Err(SignatureError::SignerMismatch);
        }

        verify(
            &self.public_key,
            &self.public_key,
            &self.public_key_validation,
        )
        .map_err(|error| match error {
            SignatureError::InvalidPublicKey => error,
            _ => SignatureError::InvalidPublicKeyValidation,
        })?;

        verify(
            &self.public_key,
            &encode_signable(&self.public_key, &self.public_key_validation, key),
            &self.signature,
        )
        .map_err(|_| SignatureError::InvalidRequestSignature)
    }

    /// Verify this request for `key`, and that `value` was signed by the same key.
    pub fn verify_value(&self, key: &Id, value: &SignedValue) -> Result<(), SignatureError> {
        self.verify(key)?;
        value.verify(&self.public_key)
    }
}

fn encode_signable(public_key: &[u8; 32], validation: &[u8; 64], key: &Id) -> Vec<u8> {
    let mut signable = Vec::with_capacity(32 + 64 + 20);

    signable.extend_from_slice(public_key);
    signable.extend_from_slice(validation);
    signable.extend_from_slice(key.as_bytes());

    signable
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Signature verification errors
pub enum SignatureError {
    #[error("Invalid ed25519 public key")]
    InvalidPublicKey,

    #[error("Invalid ed25519 signature")]
    InvalidSignature,

    #[error("Signer id is not the hash of the public key")]
    SignerMismatch,

    #[error("Public key validation is not a self-signature of the public key")]
    InvalidPublicKeyValidation,

    #[error("Invalid request signature")]
    InvalidRequestSignature,

    #[error("Invalid value signature")]
    InvalidValueSignature,
}

#[cfg(test)]
mod test {
    use super::*;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&rand::random())
    }

    #[test]
    fn valid_request() {
        let signer = signing_key();
        let key = hash(b"hello");

        let request = SignedRequest::new(&signer, &key);
        let value = SignedValue::new(&signer, b"world");

        assert!(request.verify(&key).is_ok());
        assert!(request.verify_value(&key, &value).is_ok());
        assert_eq!(
            request.signer_id(),
            &Id::from_public_key(&signer.verifying_key().to_bytes())
        );
    }

    #[test]
    fn request_for_another_key() {
        let signer = signing_key();

        let request = SignedRequest::new(&signer, &hash(b"hello"));

        assert_eq!(
            request.verify(&hash(b"other")),
            Err(SignatureError::InvalidRequestSignature)
        );
    }

    #[test]
    fn tampered_request_signature() {
        let signer = signing_key();
        let key = hash(b"hello");

        let request = SignedRequest::new(&signer, &key);
        let tampered = SignedRequest::new_signed_unchecked(
            *request.signer_id(),
            *request.public_key(),
            *request.public_key_validation(),
            [0; 64],
        );

        assert_eq!(
            tampered.verify(&key),
            Err(SignatureError::InvalidRequestSignature)
        );
    }

    #[test]
    fn wrong_public_key() {
        let signer = signing_key();
        let other = signing_key();
        let key = hash(b"hello");

        let request = SignedRequest::new(&signer, &key);

        let swapped = SignedRequest::new_signed_unchecked(
            *request.signer_id(),
            other.verifying_key().to_bytes(),
            *request.public_key_validation(),
            *request.signature(),
        );
        assert_eq!(swapped.verify(&key), Err(SignatureError::SignerMismatch));

        let claimed = SignedRequest::new_signed_unchecked(
            Id::from_public_key(&other.verifying_key().to_bytes()),
            other.verifying_key().to_bytes(),
            *request.public_key_validation(),
            *request.signature(),
        );
        assert_eq!(
            claimed.verify(&key),
            Err(SignatureError::InvalidPublicKeyValidation)
        );
    }

    #[test]
    fn value_signed_by_another_key() {
        let signer = signing_key();
        let key = hash(b"hello");

        let request = SignedRequest::new(&signer, &key);
        let value = SignedValue::new(&signing_key(), b"world");

        assert_eq!(
            request.verify_value(&key, &value),
            Err(SignatureError::InvalidValueSignature)
        );
    }
}
