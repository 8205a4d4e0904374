//! Handling of incoming requests, and the local records they mutate.

use std::{net::SocketAddr, time::Duration};

use tracing::debug;

use crate::common::{
    Contact, DeleteRequestArguments, ErrorSpecific, FindNodeRequestArguments,
    FindNodeResponseArguments, FindValueRequestArguments, FindValueResponseArguments,
    GetContactDetailsRequestArguments, GetContactDetailsResponseArguments, Id,
    PutRequestSpecific, PutResponseArguments, Rejection, RequestSpecific, RequestTypeSpecific,
    ResponseTypeSpecific, RoutingTable, SignedValue, StoreRequestArguments,
    UpdateRequestArguments,
};

use super::value_store::{RecordError, ValueStore, MAX_STORED_KEYS};

/// Maximum size of a stored value in bytes.
pub const MAX_VALUE_SIZE: usize = 32 * 1024;
/// Budget for the values of one FIND_VALUE response, so the whole message fits a datagram.
pub const MAX_RESPONSE_VALUES_SIZE: usize = 60 * 1024;
/// Encoding overhead of a value besides its bytes, signature and keys included.
const ENCODED_VALUE_OVERHEAD: usize = 96;
/// Timeout hint for delivering small responses.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout hint for delivering responses carrying values.
pub const VALUE_RESPONSE_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
/// Settings for the request handling server.
pub struct ServerSettings {
    /// Number of closest contacts returned to lookups.
    pub k: usize,
    /// Maximum number of keys to store records for.
    ///
    /// Defaults to [MAX_STORED_KEYS]
    pub max_stored_keys: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            k: crate::common::MAX_BUCKET_SIZE_K,
            max_stored_keys: MAX_STORED_KEYS,
        }
    }
}

#[derive(Debug)]
/// A server that handles incoming requests and owns the local records.
pub struct Server {
    k: usize,
    values: ValueStore,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerSettings::default())
    }
}

impl Server {
    /// Creates a new [Server]
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            k: settings.k.max(1),
            values: ValueStore::new(settings.max_stored_keys),
        }
    }

    // === Getters ===

    pub fn values(&mut self) -> &mut ValueStore {
        &mut self.values
    }

    /// Number of keys with records in the local store.
    pub fn stored_keys(&self) -> usize {
        self.values.len()
    }

    // === Public Methods ===

    /// Returns a response or an error for a request, and a hint for how long
    /// sending it may take.
    ///
    /// `local` is the contact of this node, as returned to lookups for its own Id.
    pub fn handle_request(
        &mut self,
        routing_table: &RoutingTable,
        local: &Contact,
        from: SocketAddr,
        request: RequestSpecific,
    ) -> (Result<ResponseTypeSpecific, ErrorSpecific>, Duration) {
        let requester_id = request.requester.id;

        match request.request_type {
            RequestTypeSpecific::Ping | RequestTypeSpecific::Downlist(_) => {
                (Ok(ResponseTypeSpecific::Ack), DEFAULT_RESPONSE_TIMEOUT)
            }
            RequestTypeSpecific::FindNode(FindNodeRequestArguments { target }) => (
                Ok(ResponseTypeSpecific::FindNode(FindNodeResponseArguments {
                    nodes: self.closest(routing_table, &target, &requester_id),
                })),
                DEFAULT_RESPONSE_TIMEOUT,
            ),
            RequestTypeSpecific::FindValue(FindValueRequestArguments { key }) => {
                let values = fit_in_datagram(&key, self.values.get(&key));

                if values.is_empty() {
                    (
                        Ok(ResponseTypeSpecific::FindValue(FindValueResponseArguments {
                            values,
                            nodes: self.closest(routing_table, &key, &requester_id),
                        })),
                        DEFAULT_RESPONSE_TIMEOUT,
                    )
                } else {
                    (
                        Ok(ResponseTypeSpecific::FindValue(FindValueResponseArguments {
                            values,
                            nodes: vec![],
                        })),
                        VALUE_RESPONSE_TIMEOUT,
                    )
                }
            }
            RequestTypeSpecific::GetContactDetails(GetContactDetailsRequestArguments {
                target,
            }) => {
                let contact = if target == *local.id() {
                    Some(local.clone())
                } else {
                    routing_table.get(&target).cloned()
                };

                let nodes = if contact.is_some() {
                    vec![]
                } else {
                    self.closest(routing_table, &target, &requester_id)
                };

                (
                    Ok(ResponseTypeSpecific::GetContactDetails(
                        GetContactDetailsResponseArguments { contact, nodes },
                    )),
                    DEFAULT_RESPONSE_TIMEOUT,
                )
            }
            RequestTypeSpecific::Store(args) => (
                self.handle_put(from, &requester_id, PutRequestSpecific::Store(args)),
                DEFAULT_RESPONSE_TIMEOUT,
            ),
            RequestTypeSpecific::Delete(args) => (
                self.handle_put(from, &requester_id, PutRequestSpecific::Delete(args)),
                DEFAULT_RESPONSE_TIMEOUT,
            ),
            RequestTypeSpecific::Update(args) => (
                self.handle_put(from, &requester_id, PutRequestSpecific::Update(args)),
                DEFAULT_RESPONSE_TIMEOUT,
            ),
        }
    }

    /// Verify and apply a STORE, DELETE or UPDATE to the local records.
    ///
    /// Also used by this node for its own puts when it is one of the closest nodes to the key.
    pub fn handle_put(
        &mut self,
        from: SocketAddr,
        requester_id: &Id,
        request: PutRequestSpecific,
    ) -> Result<ResponseTypeSpecific, ErrorSpecific> {
        match request {
            PutRequestSpecific::Store(args) => self.handle_store(from, requester_id, args),
            PutRequestSpecific::Delete(args) => self.handle_delete(from, requester_id, args),
            PutRequestSpecific::Update(args) => self.handle_update(from, requester_id, args),
        }
    }

    // === Private Methods ===

    fn closest(&self, routing_table: &RoutingTable, target: &Id, requester_id: &Id) -> Vec<Contact> {
        routing_table.closest_live(target, self.k, &[*requester_id])
    }

    fn handle_store(
        &mut self,
        from: SocketAddr,
        requester_id: &Id,
        StoreRequestArguments {
            key,
            value,
            request,
            ttl,
        }: StoreRequestArguments,
    ) -> Result<ResponseTypeSpecific, ErrorSpecific> {
        check_value_size(&key, requester_id, from, &value)?;

        if let Err(error) = request.verify_value(&key, &value) {
            debug!(?key, ?requester_id, ?from, ?error, request_type = "store", "Invalid signature");

            return Ok(rejected(Rejection::InvalidSignature));
        }

        self.values.store(
            key,
            value,
            *request.public_key(),
            Duration::from_secs(ttl as u64),
        );

        Ok(accepted())
    }

    fn handle_delete(
        &mut self,
        from: SocketAddr,
        requester_id: &Id,
        DeleteRequestArguments {
            key,
            value,
            request,
        }: DeleteRequestArguments,
    ) -> Result<ResponseTypeSpecific, ErrorSpecific> {
        if let Err(error) = request.verify_value(&key, &value) {
            debug!(?key, ?requester_id, ?from, ?error, request_type = "delete", "Invalid signature");

            return Ok(rejected(Rejection::InvalidSignature));
        }

        Ok(match self.values.delete(&key, &value, request.public_key()) {
            Ok(()) => accepted(),
            Err(error) => {
                debug!(?key, ?requester_id, ?from, ?error, "Delete rejected");

                rejected(error.into())
            }
        })
    }

    fn handle_update(
        &mut self,
        from: SocketAddr,
        requester_id: &Id,
        UpdateRequestArguments {
            key,
            old_value,
            new_value,
            request,
            ttl,
        }: UpdateRequestArguments,
    ) -> Result<ResponseTypeSpecific, ErrorSpecific> {
        check_value_size(&key, requester_id, from, &new_value)?;

        if let Err(error) = request
            .verify_value(&key, &old_value)
            .and_then(|_| new_value.verify(request.public_key()))
        {
            debug!(?key, ?requester_id, ?from, ?error, request_type = "update", "Invalid signature");

            return Ok(rejected(Rejection::InvalidSignature));
        }

        Ok(
            match self.values.update(
                &key,
                &old_value,
                new_value,
                request.public_key(),
                Duration::from_secs(ttl as u64),
            ) {
                Ok(()) => accepted(),
                Err(error) => {
                    debug!(?key, ?requester_id, ?from, ?error, "Update rejected");

                    rejected(error.into())
                }
            },
        )
    }
}

/// Keep the first values that fit in [MAX_RESPONSE_VALUES_SIZE].
fn fit_in_datagram(key: &Id, values: Vec<SignedValue>) -> Vec<SignedValue> {
    let total = values.len();
    let mut size = 0;

    let values: Vec<SignedValue> = values
        .into_iter()
        .take_while(|value| {
            size += value.value().len() + ENCODED_VALUE_OVERHEAD;
            size <= MAX_RESPONSE_VALUES_SIZE
        })
        .collect();

    if values.len() < total {
        debug!(?key, total, sent = values.len(), "Trimmed values to fit a datagram");
    }

    values
}

fn check_value_size(
    key: &Id,
    requester_id: &Id,
    from: SocketAddr,
    value: &SignedValue,
) -> Result<(), ErrorSpecific> {
    if value.value().len() > MAX_VALUE_SIZE {
        debug!(?key, ?requester_id, ?from, size = ?value.value().len(), "Message (value field) too big.");

        return Err(ErrorSpecific {
            code: 205,
            description: "Message (value field) too big.".to_string(),
        });
    }

    Ok(())
}

fn accepted() -> ResponseTypeSpecific {
    ResponseTypeSpecific::Put(PutResponseArguments {
        accepted: true,
        rejection: None,
    })
}

fn rejected(rejection: Rejection) -> ResponseTypeSpecific {
    ResponseTypeSpecific::Put(PutResponseArguments {
        accepted: false,
        rejection: Some(rejection),
    })
}

impl From<RecordError> for Rejection {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::NotFound => Rejection::NotFound,
            RecordError::Unauthorized => Rejection::Unauthorized,
        }
    }
}
