#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

mod common;
mod core;
mod dht;
mod error;

// Public modules
pub mod actor;
#[cfg(feature = "async")]
pub mod async_dht;

pub use crate::common::{
    hash, messages, sign, verify, AddOutcome, ClosestContacts, Contact, Id, KBucket, NatType,
    RoutingTable, SignatureError, SignedRequest, SignedValue, DEFAULT_FAILED_RPC_TOLERANCE,
    MAX_BUCKET_SIZE_K,
};
pub use crate::core::iterative_query::{LookupParams, LookupResult};
pub use crate::core::put_query::{quorum, PutError, PutSummary};
pub use crate::core::server::{Server, ServerSettings, MAX_VALUE_SIZE};
pub use crate::core::value_store::{RecordError, ValueStore};
pub use bytes::Bytes;
pub use dht::{Dht, DhtBuilder, DhtError, FindValueResult, Testnet};
pub use error::Error;

pub use ed25519_dalek::SigningKey;

/// Alias for `std::result::Result<T, kadnode::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
