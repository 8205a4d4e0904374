//! Serialize and deserialize RPC messages.

mod internal;

use std::convert::TryInto;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use serde_bytes::ByteBuf;

use crate::common::{Contact, Id, NatType, SignedRequest, SignedValue};
use crate::{Error, Result};

/// Version of this implementation, sent with every message.
pub const VERSION: [u8; 4] = [75, 68, 0, 1]; // "KD" version 01

pub const PING: &str = "ping";
pub const FIND_NODE: &str = "find_node";
pub const FIND_VALUE: &str = "find_value";
pub const STORE: &str = "store";
pub const DELETE: &str = "delete";
pub const UPDATE: &str = "update";
pub const DOWNLIST: &str = "downlist";
pub const GET_CONTACT_DETAILS: &str = "get_contact";

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u32,

    /// The version of the requester or responder.
    pub version: Option<[u8; 4]>,

    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),

    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ErrorSpecific {
    pub code: i32,
    pub description: String,
}

/// Contact information every node attaches to its requests and responses.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Originator {
    pub id: Id,
    pub nat_type: NatType,
    pub local_address: Option<SocketAddr>,
    pub rendezvous_address: Option<SocketAddr>,
    pub public_key: Option<[u8; 32]>,
}

impl Originator {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            nat_type: NatType::Unknown,
            local_address: None,
            rendezvous_address: None,
            public_key: None,
        }
    }

    /// The contact of this originator as reached at `address`.
    pub fn to_contact(&self, address: SocketAddr) -> Contact {
        Contact::new(self.id, address)
            .with_nat_type(self.nat_type)
            .with_local_address(self.local_address)
            .with_rendezvous_address(self.rendezvous_address)
            .with_public_key(self.public_key)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    pub requester: Originator,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestTypeSpecific {
    Ping,
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
    Store(StoreRequestArguments),
    Delete(DeleteRequestArguments),
    Update(UpdateRequestArguments),
    Downlist(DownlistRequestArguments),
    GetContactDetails(GetContactDetailsRequestArguments),
}

impl RequestTypeSpecific {
    /// The method name of this request on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            RequestTypeSpecific::Ping => PING,
            RequestTypeSpecific::FindNode(_) => FIND_NODE,
            RequestTypeSpecific::FindValue(_) => FIND_VALUE,
            RequestTypeSpecific::Store(_) => STORE,
            RequestTypeSpecific::Delete(_) => DELETE,
            RequestTypeSpecific::Update(_) => UPDATE,
            RequestTypeSpecific::Downlist(_) => DOWNLIST,
            RequestTypeSpecific::GetContactDetails(_) => GET_CONTACT_DETAILS,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct ResponseSpecific {
    pub responder: Originator,
    pub response_type: ResponseTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseTypeSpecific {
    /// Response to PING and DOWNLIST requests.
    Ack,
    FindNode(FindNodeResponseArguments),
    FindValue(FindValueResponseArguments),
    /// Response to STORE, DELETE and UPDATE requests.
    Put(PutResponseArguments),
    GetContactDetails(GetContactDetailsResponseArguments),
}

impl ResponseTypeSpecific {
    /// The method name echoed on the wire, identifying the shape of the response.
    pub fn method(&self) -> &'static str {
        match self {
            ResponseTypeSpecific::Ack => PING,
            ResponseTypeSpecific::FindNode(_) => FIND_NODE,
            ResponseTypeSpecific::FindValue(_) => FIND_VALUE,
            ResponseTypeSpecific::Put(_) => STORE,
            ResponseTypeSpecific::GetContactDetails(_) => GET_CONTACT_DETAILS,
        }
    }
}

// === Lookups ===

#[derive(Debug, PartialEq, Clone)]
/// Requests driven by an iterative lookup.
pub enum GetRequestSpecific {
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
    GetContactDetails(GetContactDetailsRequestArguments),
}

impl GetRequestSpecific {
    pub fn target(&self) -> &Id {
        match self {
            GetRequestSpecific::FindNode(args) => &args.target,
            GetRequestSpecific::FindValue(args) => &args.key,
            GetRequestSpecific::GetContactDetails(args) => &args.target,
        }
    }
}

impl From<GetRequestSpecific> for RequestTypeSpecific {
    fn from(request: GetRequestSpecific) -> Self {
        match request {
            GetRequestSpecific::FindNode(args) => RequestTypeSpecific::FindNode(args),
            GetRequestSpecific::FindValue(args) => RequestTypeSpecific::FindValue(args),
            GetRequestSpecific::GetContactDetails(args) => {
                RequestTypeSpecific::GetContactDetails(args)
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeRequestArguments {
    pub target: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeResponseArguments {
    pub nodes: Vec<Contact>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindValueRequestArguments {
    pub key: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindValueResponseArguments {
    /// Values stored at the responder, empty if none.
    pub values: Vec<SignedValue>,
    /// Closer contacts to the key, empty when values are returned.
    pub nodes: Vec<Contact>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetContactDetailsRequestArguments {
    pub target: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetContactDetailsResponseArguments {
    pub contact: Option<Contact>,
    pub nodes: Vec<Contact>,
}

// === Mutations ===

#[derive(Debug, PartialEq, Clone)]
/// Requests replicated to the closest nodes of a key.
pub enum PutRequestSpecific {
    Store(StoreRequestArguments),
    Delete(DeleteRequestArguments),
    Update(UpdateRequestArguments),
}

impl PutRequestSpecific {
    pub fn key(&self) -> &Id {
        match self {
            PutRequestSpecific::Store(args) => &args.key,
            PutRequestSpecific::Delete(args) => &args.key,
            PutRequestSpecific::Update(args) => &args.key,
        }
    }
}

impl From<PutRequestSpecific> for RequestTypeSpecific {
    fn from(request: PutRequestSpecific) -> Self {
        match request {
            PutRequestSpecific::Store(args) => RequestTypeSpecific::Store(args),
            PutRequestSpecific::Delete(args) => RequestTypeSpecific::Delete(args),
            PutRequestSpecific::Update(args) => RequestTypeSpecific::Update(args),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct StoreRequestArguments {
    pub key: Id,
    pub value: SignedValue,
    pub request: SignedRequest,
    pub ttl: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeleteRequestArguments {
    pub key: Id,
    pub value: SignedValue,
    pub request: SignedRequest,
}

#[derive(Debug, PartialEq, Clone)]
pub struct UpdateRequestArguments {
    pub key: Id,
    pub old_value: SignedValue,
    pub new_value: SignedValue,
    pub request: SignedRequest,
    pub ttl: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PutResponseArguments {
    pub accepted: bool,
    pub rejection: Option<Rejection>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Why a node refused a STORE, DELETE or UPDATE.
pub enum Rejection {
    InvalidSignature,
    /// No matching record to delete or update.
    NotFound,
    /// The record belongs to another signer.
    Unauthorized,
}

impl Rejection {
    fn code(&self) -> i64 {
        match self {
            Rejection::InvalidSignature => 1,
            Rejection::NotFound => 2,
            Rejection::Unauthorized => 3,
        }
    }

    fn from_code(code: i64) -> Option<Rejection> {
        match code {
            1 => Some(Rejection::InvalidSignature),
            2 => Some(Rejection::NotFound),
            3 => Some(Rejection::Unauthorized),
            _ => None,
        }
    }
}

// === Downlist ===

#[derive(Debug, PartialEq, Clone)]
pub struct DownlistRequestArguments {
    pub ids: Vec<Id>,
}

impl Message {
    fn into_serde_message(self) -> internal::DhtMessage {
        let transaction_id = ByteBuf::from(self.transaction_id.to_be_bytes().to_vec());
        let version = self.version.map(|version| ByteBuf::from(version.to_vec()));

        match self.message_type {
            MessageType::Request(RequestSpecific {
                requester,
                request_type,
            }) => {
                let method = request_type.method();
                let mut arguments = originator_to_arguments(&requester);

                match request_type {
                    RequestTypeSpecific::Ping => {}
                    RequestTypeSpecific::FindNode(args) => {
                        arguments.target = Some(id_to_bytes(&args.target));
                    }
                    RequestTypeSpecific::FindValue(args) => {
                        arguments.key = Some(id_to_bytes(&args.key));
                    }
                    RequestTypeSpecific::Store(args) => {
                        arguments.key = Some(id_to_bytes(&args.key));
                        arguments.value = Some(signed_value_to_serde(&args.value));
                        arguments.request = Some(signed_request_to_serde(&args.request));
                        arguments.ttl = Some(args.ttl as i64);
                    }
                    RequestTypeSpecific::Delete(args) => {
                        arguments.key = Some(id_to_bytes(&args.key));
                        arguments.value = Some(signed_value_to_serde(&args.value));
                        arguments.request = Some(signed_request_to_serde(&args.request));
                    }
                    RequestTypeSpecific::Update(args) => {
                        arguments.key = Some(id_to_bytes(&args.key));
                        arguments.value = Some(signed_value_to_serde(&args.old_value));
                        arguments.new_value = Some(signed_value_to_serde(&args.new_value));
                        arguments.request = Some(signed_request_to_serde(&args.request));
                        arguments.ttl = Some(args.ttl as i64);
                    }
                    RequestTypeSpecific::Downlist(args) => {
                        arguments.ids = Some(args.ids.iter().map(id_to_bytes).collect());
                    }
                    RequestTypeSpecific::GetContactDetails(args) => {
                        arguments.target = Some(id_to_bytes(&args.target));
                    }
                }

                internal::DhtMessage {
                    transaction_id,
                    kind: "q".to_string(),
                    method: Some(method.to_string()),
                    version,
                    arguments: Some(arguments),
                    error: None,
                }
            }
            MessageType::Response(ResponseSpecific {
                responder,
                response_type,
            }) => {
                let method = response_type.method();
                let mut arguments = originator_to_arguments(&responder);

                match response_type {
                    ResponseTypeSpecific::Ack => {}
                    ResponseTypeSpecific::FindNode(args) => {
                        arguments.nodes = Some(contacts_to_serde(&args.nodes));
                    }
                    ResponseTypeSpecific::FindValue(args) => {
                        arguments.values =
                            Some(args.values.iter().map(signed_value_to_serde).collect());
                        arguments.nodes = Some(contacts_to_serde(&args.nodes));
                    }
                    ResponseTypeSpecific::Put(args) => {
                        arguments.accepted = Some(args.accepted as i64);
                        arguments.reason = args.rejection.map(|rejection| rejection.code());
                    }
                    ResponseTypeSpecific::GetContactDetails(args) => {
                        arguments.contact = args.contact.as_ref().map(contact_to_serde);
                        arguments.nodes = Some(contacts_to_serde(&args.nodes));
                    }
                }

                internal::DhtMessage {
                    transaction_id,
                    kind: "r".to_string(),
                    method: Some(method.to_string()),
                    version,
                    arguments: Some(arguments),
                    error: None,
                }
            }
            MessageType::Error(ErrorSpecific { code, description }) => internal::DhtMessage {
                transaction_id,
                kind: "e".to_string(),
                method: None,
                version,
                arguments: None,
                error: Some(internal::DhtError {
                    code: code as i64,
                    description,
                }),
            },
        }
    }

    fn from_serde_message(msg: internal::DhtMessage) -> Result<Message> {
        let transaction_id: [u8; 4] = msg.transaction_id.as_slice().try_into().map_err(|_| {
            Error::InvalidMessage(format!(
                "invalid transaction id length {}",
                msg.transaction_id.len()
            ))
        })?;

        let version = msg
            .version
            .and_then(|version| version.as_slice().try_into().ok());

        let message_type = match msg.kind.as_str() {
            "q" => {
                let method = required(msg.method, "q")?;
                let arguments = required(msg.arguments, "a")?;

                MessageType::Request(RequestSpecific {
                    requester: originator_from_arguments(&arguments)?,
                    request_type: request_from_arguments(&method, arguments)?,
                })
            }
            "r" => {
                let arguments = required(msg.arguments, "a")?;

                MessageType::Response(ResponseSpecific {
                    responder: originator_from_arguments(&arguments)?,
                    response_type: response_from_arguments(msg.method.as_deref(), arguments)?,
                })
            }
            "e" => {
                let error = required(msg.error, "e")?;

                MessageType::Error(ErrorSpecific {
                    code: error.code as i32,
                    description: error.description,
                })
            }
            kind => {
                return Err(Error::InvalidMessage(format!(
                    "unknown message kind {kind:?}"
                )))
            }
        };

        Ok(Message {
            transaction_id: u32::from_be_bytes(transaction_id),
            version,
            message_type,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.clone()
            .into_serde_message()
            .to_bytes()
            .map_err(Error::BencodeError)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::DhtMessage::from_bytes(bytes.as_ref())?)
    }
}

// === Decoding ===

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| Error::InvalidMessage(format!("missing field {name:?}")))
}

fn request_from_arguments(
    method: &str,
    arguments: internal::DhtArguments,
) -> Result<RequestTypeSpecific> {
    Ok(match method {
        PING => RequestTypeSpecific::Ping,
        FIND_NODE => RequestTypeSpecific::FindNode(FindNodeRequestArguments {
            target: Id::from_bytes(required(arguments.target, "target")?)?,
        }),
        FIND_VALUE => RequestTypeSpecific::FindValue(FindValueRequestArguments {
            key: Id::from_bytes(required(arguments.key, "key")?)?,
        }),
        STORE => RequestTypeSpecific::Store(StoreRequestArguments {
            key: Id::from_bytes(required(arguments.key, "key")?)?,
            value: signed_value_from_serde(required(arguments.value, "value")?)?,
            request: signed_request_from_serde(required(arguments.request, "req")?)?,
            ttl: ttl_from_serde(required(arguments.ttl, "ttl")?),
        }),
        DELETE => RequestTypeSpecific::Delete(DeleteRequestArguments {
            key: Id::from_bytes(required(arguments.key, "key")?)?,
            value: signed_value_from_serde(required(arguments.value, "value")?)?,
            request: signed_request_from_serde(required(arguments.request, "req")?)?,
        }),
        UPDATE => RequestTypeSpecific::Update(UpdateRequestArguments {
            key: Id::from_bytes(required(arguments.key, "key")?)?,
            old_value: signed_value_from_serde(required(arguments.value, "value")?)?,
            new_value: signed_value_from_serde(required(arguments.new_value, "new")?)?,
            request: signed_request_from_serde(required(arguments.request, "req")?)?,
            ttl: ttl_from_serde(required(arguments.ttl, "ttl")?),
        }),
        DOWNLIST => RequestTypeSpecific::Downlist(DownlistRequestArguments {
            ids: required(arguments.ids, "ids")?
                .iter()
                .map(Id::from_bytes)
                .collect::<Result<Vec<Id>>>()?,
        }),
        GET_CONTACT_DETAILS => {
            RequestTypeSpecific::GetContactDetails(GetContactDetailsRequestArguments {
                target: Id::from_bytes(required(arguments.target, "target")?)?,
            })
        }
        method => {
            return Err(Error::InvalidMessage(format!(
                "unknown method {method:?}"
            )))
        }
    })
}

fn response_from_arguments(
    method: Option<&str>,
    arguments: internal::DhtArguments,
) -> Result<ResponseTypeSpecific> {
    let nodes = match arguments.nodes {
        Some(nodes) => Some(contacts_from_serde(nodes)?),
        None => None,
    };

    Ok(match method {
        Some(PING) | Some(DOWNLIST) => ResponseTypeSpecific::Ack,
        Some(FIND_NODE) => ResponseTypeSpecific::FindNode(FindNodeResponseArguments {
            nodes: required(nodes, "nodes")?,
        }),
        Some(FIND_VALUE) => ResponseTypeSpecific::FindValue(FindValueResponseArguments {
            values: arguments
                .values
                .unwrap_or_default()
                .into_iter()
                .map(signed_value_from_serde)
                .collect::<Result<Vec<SignedValue>>>()?,
            nodes: nodes.unwrap_or_default(),
        }),
        Some(STORE) | Some(DELETE) | Some(UPDATE) => {
            ResponseTypeSpecific::Put(PutResponseArguments {
                accepted: required(arguments.accepted, "ok")? != 0,
                rejection: arguments.reason.and_then(Rejection::from_code),
            })
        }
        Some(GET_CONTACT_DETAILS) => {
            ResponseTypeSpecific::GetContactDetails(GetContactDetailsResponseArguments {
                contact: match arguments.contact {
                    Some(contact) => Some(contact_from_serde(contact)?),
                    None => None,
                },
                nodes: nodes.unwrap_or_default(),
            })
        }
        Some(method) => {
            return Err(Error::InvalidMessage(format!(
                "unknown method {method:?}"
            )))
        }
        None => match (arguments.accepted, nodes) {
            (Some(accepted), _) => ResponseTypeSpecific::Put(PutResponseArguments {
                accepted: accepted != 0,
                rejection: arguments.reason.and_then(Rejection::from_code),
            }),
            (None, Some(nodes)) => {
                ResponseTypeSpecific::FindNode(FindNodeResponseArguments { nodes })
            }
            (None, None) => ResponseTypeSpecific::Ack,
        },
    })
}

fn ttl_from_serde(ttl: i64) -> u32 {
    ttl.clamp(0, u32::MAX as i64) as u32
}

fn originator_to_arguments(originator: &Originator) -> internal::DhtArguments {
    internal::DhtArguments {
        id: id_to_bytes(&originator.id),
        nat_type: Some(originator.nat_type.code()),
        local_address: originator
            .local_address
            .as_ref()
            .map(|address| ByteBuf::from(sockaddr_to_bytes(address))),
        rendezvous_address: originator
            .rendezvous_address
            .as_ref()
            .map(|address| ByteBuf::from(sockaddr_to_bytes(address))),
        public_key: originator
            .public_key
            .map(|public_key| ByteBuf::from(public_key.to_vec())),
        ..Default::default()
    }
}

fn originator_from_arguments(arguments: &internal::DhtArguments) -> Result<Originator> {
    Ok(Originator {
        id: Id::from_bytes(&arguments.id)?,
        nat_type: NatType::from_code(arguments.nat_type.unwrap_or_default()),
        local_address: optional_sockaddr(arguments.local_address.as_ref())?,
        rendezvous_address: optional_sockaddr(arguments.rendezvous_address.as_ref())?,
        public_key: match &arguments.public_key {
            Some(public_key) => Some(public_key_from_bytes(public_key)?),
            None => None,
        },
    })
}

fn id_to_bytes(id: &Id) -> ByteBuf {
    ByteBuf::from(id.to_vec())
}

fn public_key_from_bytes(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidMessage(format!("invalid public key length {}", bytes.len())))
}

fn signature_from_bytes(bytes: &[u8]) -> Result<[u8; 64]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidMessage(format!("invalid signature length {}", bytes.len())))
}

fn signed_value_to_serde(value: &SignedValue) -> internal::DhtSignedValue {
    internal::DhtSignedValue {
        value: ByteBuf::from(value.value().to_vec()),
        signature: ByteBuf::from(value.signature().to_vec()),
    }
}

fn signed_value_from_serde(value: internal::DhtSignedValue) -> Result<SignedValue> {
    let signature = signature_from_bytes(&value.signature)?;

    Ok(SignedValue::new_signed_unchecked(
        Bytes::from(value.value.into_vec()),
        signature,
    ))
}

fn signed_request_to_serde(request: &SignedRequest) -> internal::DhtSignedRequest {
    internal::DhtSignedRequest {
        signer_id: id_to_bytes(request.signer_id()),
        public_key: ByteBuf::from(request.public_key().to_vec()),
        public_key_validation: ByteBuf::from(request.public_key_validation().to_vec()),
        signature: ByteBuf::from(request.signature().to_vec()),
    }
}

fn signed_request_from_serde(request: internal::DhtSignedRequest) -> Result<SignedRequest> {
    Ok(SignedRequest::new_signed_unchecked(
        Id::from_bytes(&request.signer_id)?,
        public_key_from_bytes(&request.public_key)?,
        signature_from_bytes(&request.public_key_validation)?,
        signature_from_bytes(&request.signature)?,
    ))
}

fn contact_to_serde(contact: &Contact) -> internal::DhtContact {
    internal::DhtContact {
        id: id_to_bytes(contact.id()),
        address: ByteBuf::from(sockaddr_to_bytes(&contact.address())),
        local_address: contact
            .local_address()
            .map(|address| ByteBuf::from(sockaddr_to_bytes(&address))),
        rendezvous_address: contact
            .rendezvous_address()
            .map(|address| ByteBuf::from(sockaddr_to_bytes(&address))),
        nat_type: contact.nat_type().code(),
        public_key: contact
            .public_key()
            .map(|public_key| ByteBuf::from(public_key.to_vec())),
    }
}

fn contacts_to_serde(contacts: &[Contact]) -> Vec<internal::DhtContact> {
    contacts.iter().map(contact_to_serde).collect()
}

fn contact_from_serde(contact: internal::DhtContact) -> Result<Contact> {
    let address = bytes_to_sockaddr(&contact.address)?;

    Ok(Contact::new(Id::from_bytes(&contact.id)?, address)
        .with_local_address(optional_sockaddr(contact.local_address.as_ref())?)
        .with_rendezvous_address(optional_sockaddr(contact.rendezvous_address.as_ref())?)
        .with_nat_type(NatType::from_code(contact.nat_type))
        .with_public_key(match &contact.public_key {
            Some(public_key) => Some(public_key_from_bytes(public_key)?),
            None => None,
        }))
}

fn contacts_from_serde(contacts: Vec<internal::DhtContact>) -> Result<Vec<Contact>> {
    contacts.into_iter().map(contact_from_serde).collect()
}

fn optional_sockaddr(bytes: Option<&ByteBuf>) -> Result<Option<SocketAddr>> {
    match bytes {
        Some(bytes) => Ok(Some(bytes_to_sockaddr(bytes)?)),
        None => Ok(None),
    }
}

/// Compact encoding, 4 bytes IPv4 or 16 bytes IPv6 followed by a big endian port.
pub fn sockaddr_to_bytes(address: &SocketAddr) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(18);

    match address.ip() {
        IpAddr::V4(ip) => bytes.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => bytes.extend_from_slice(&ip.octets()),
    }
    bytes.extend_from_slice(&address.port().to_be_bytes());

    bytes
}

pub fn bytes_to_sockaddr<T: AsRef<[u8]>>(bytes: T) -> Result<SocketAddr> {
    let bytes = bytes.as_ref();

    match bytes.len() {
        6 => {
            let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
            let port = u16::from_be_bytes([bytes[4], bytes[5]]);

            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }
        18 => {
            let mut octets = [0_u8; 16];
            octets.copy_from_slice(&bytes[..16]);
            let port = u16::from_be_bytes([bytes[16], bytes[17]]);

            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        length => Err(Error::InvalidMessage(format!(
            "invalid compact address length {length}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn originator() -> Originator {
        Originator {
            id: Id::random(),
            nat_type: NatType::Direct,
            local_address: Some(SocketAddr::from(([192, 168, 1, 2], 5000))),
            rendezvous_address: None,
            public_key: Some([7; 32]),
        }
    }

    #[test]
    fn store_request() {
        let signer = SigningKey::from_bytes(&rand::random());
        let key = Id::hash(b"key");

        let original_msg = Message {
            transaction_id: 258,
            version: Some(VERSION),
            message_type: MessageType::Request(RequestSpecific {
                requester: originator(),
                request_type: RequestTypeSpecific::Store(StoreRequestArguments {
                    key,
                    value: SignedValue::new(&signer, &[5; 5000]),
                    request: SignedRequest::new(&signer, &key),
                    ttl: 3600,
                }),
            }),
        };

        let serde_msg = original_msg.clone().into_serde_message();
        let bytes = serde_msg.to_bytes().unwrap();
        let parsed_msg = internal::DhtMessage::from_bytes(&bytes).unwrap();
        let parsed = Message::from_serde_message(parsed_msg).unwrap();

        assert_eq!(parsed, original_msg);
    }

    #[test]
    fn find_value_response() {
        let signer = SigningKey::from_bytes(&rand::random());

        let original_msg = Message {
            transaction_id: 1,
            version: None,
            message_type: MessageType::Response(ResponseSpecific {
                responder: originator(),
                response_type: ResponseTypeSpecific::FindValue(FindValueResponseArguments {
                    values: vec![SignedValue::new(&signer, b"hello")],
                    nodes: vec![],
                }),
            }),
        };

        let bytes = original_msg.to_bytes().unwrap();
        let parsed = Message::from_bytes(&bytes).unwrap();

        assert_eq!(parsed, original_msg);
    }

    #[test]
    fn contacts_with_ipv6() {
        let contact = Contact::new(
            Id::random(),
            SocketAddr::from((Ipv6Addr::LOCALHOST, 6881)),
        )
        .with_nat_type(NatType::Symmetric)
        .with_rendezvous_address(Some(SocketAddr::from(([1, 2, 3, 4], 80))));

        let original_msg = Message {
            transaction_id: 7,
            version: Some(VERSION),
            message_type: MessageType::Response(ResponseSpecific {
                responder: originator(),
                response_type: ResponseTypeSpecific::GetContactDetails(
                    GetContactDetailsResponseArguments {
                        contact: Some(contact.clone()),
                        nodes: vec![Contact::random(), contact],
                    },
                ),
            }),
        };

        let bytes = original_msg.to_bytes().unwrap();
        let parsed = Message::from_bytes(&bytes).unwrap();

        assert_eq!(parsed, original_msg);
    }

    #[test]
    fn put_response_rejection() {
        let original_msg = Message {
            transaction_id: u32::MAX,
            version: None,
            message_type: MessageType::Response(ResponseSpecific {
                responder: Originator::new(Id::random()),
                response_type: ResponseTypeSpecific::Put(PutResponseArguments {
                    accepted: false,
                    rejection: Some(Rejection::InvalidSignature),
                }),
            }),
        };

        let bytes = original_msg.to_bytes().unwrap();

        assert_eq!(Message::from_bytes(&bytes).unwrap(), original_msg);
    }

    #[test]
    fn unknown_method() {
        let mut serde_msg = Message {
            transaction_id: 1,
            version: None,
            message_type: MessageType::Request(RequestSpecific {
                requester: Originator::new(Id::random()),
                request_type: RequestTypeSpecific::Ping,
            }),
        }
        .into_serde_message();

        serde_msg.method = Some("announce_peer".to_string());

        let bytes = serde_msg.to_bytes().unwrap();

        assert!(matches!(
            Message::from_bytes(&bytes),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn missing_target() {
        let mut serde_msg = Message {
            transaction_id: 1,
            version: None,
            message_type: MessageType::Request(RequestSpecific {
                requester: Originator::new(Id::random()),
                request_type: RequestTypeSpecific::FindNode(FindNodeRequestArguments {
                    target: Id::random(),
                }),
            }),
        }
        .into_serde_message();

        if let Some(arguments) = serde_msg.arguments.as_mut() {
            arguments.target = None;
        }

        let bytes = serde_msg.to_bytes().unwrap();

        assert!(Message::from_bytes(&bytes).is_err());
    }
}
