//! Main Crate Error

use crate::actor::TransportError;
use crate::dht::DhtError;

#[derive(thiserror::Error, Debug)]
/// Kadnode crate error enum.
pub enum Error {
    /// Id is not 20 bytes long.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id is not a 40 characters hex string.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// A decoded message is missing fields or has fields of the wrong size.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error(transparent)]
    /// Transparent [TransportError]
    Transport(#[from] TransportError),

    #[error(transparent)]
    /// Transparent [DhtError]
    Dht(#[from] DhtError),
}
