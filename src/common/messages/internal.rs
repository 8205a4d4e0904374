use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DhtMessage {
    #[serde(rename = "t")]
    pub transaction_id: ByteBuf,

    /// "q" for requests, "r" for responses and "e" for errors.
    #[serde(rename = "y")]
    pub kind: String,

    /// Method name, echoed on responses.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ByteBuf>,

    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<DhtArguments>,

    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DhtError>,
}

impl DhtMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<DhtMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DhtError {
    #[serde(rename = "c")]
    pub code: i64,
    #[serde(rename = "m")]
    pub description: String,
}

/// Arguments of every request and response, flattened into one dictionary.
///
/// The method name decides which fields are required.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DhtArguments {
    // === Originator ===
    #[serde(rename = "id")]
    pub id: ByteBuf,

    #[serde(rename = "nat", default, skip_serializing_if = "Option::is_none")]
    pub nat_type: Option<i64>,

    #[serde(rename = "local", default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<ByteBuf>,

    #[serde(rename = "rv", default, skip_serializing_if = "Option::is_none")]
    pub rendezvous_address: Option<ByteBuf>,

    #[serde(rename = "pk", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<ByteBuf>,

    // === Requests ===
    #[serde(rename = "target", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ByteBuf>,

    #[serde(rename = "key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ByteBuf>,

    #[serde(rename = "value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<DhtSignedValue>,

    #[serde(rename = "new", default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<DhtSignedValue>,

    #[serde(rename = "req", default, skip_serializing_if = "Option::is_none")]
    pub request: Option<DhtSignedRequest>,

    #[serde(rename = "ttl", default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    #[serde(rename = "ids", default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<ByteBuf>>,

    // === Responses ===
    #[serde(rename = "nodes", default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<DhtContact>>,

    #[serde(rename = "values", default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<DhtSignedValue>>,

    #[serde(rename = "contact", default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<DhtContact>,

    #[serde(rename = "ok", default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<i64>,

    #[serde(rename = "why", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DhtContact {
    #[serde(rename = "id")]
    pub id: ByteBuf,

    /// Compact address, 6 bytes for IPv4 and 18 bytes for IPv6.
    #[serde(rename = "addr")]
    pub address: ByteBuf,

    #[serde(rename = "local", default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<ByteBuf>,

    #[serde(rename = "rv", default, skip_serializing_if = "Option::is_none")]
    pub rendezvous_address: Option<ByteBuf>,

    #[serde(rename = "nat", default)]
    pub nat_type: i64,

    #[serde(rename = "pk", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<ByteBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DhtSignedValue {
    #[serde(rename = "v")]
    pub value: ByteBuf,

    #[serde(rename = "sig")]
    pub signature: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DhtSignedRequest {
    #[serde(rename = "id")]
    pub signer_id: ByteBuf,

    #[serde(rename = "k")]
    pub public_key: ByteBuf,

    #[serde(rename = "kv")]
    pub public_key_validation: ByteBuf,

    #[serde(rename = "sig")]
    pub signature: ByteBuf,
}
