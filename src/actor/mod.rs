//! Actor implementation - I/O orchestration layer for the DHT.

pub(crate) mod config;
mod handle_request;
mod handle_response;
mod info;
pub(crate) mod socket;
pub(crate) mod transport;

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, error, info, trace};

use crate::common::{
    AddOutcome, Contact, DownlistRequestArguments, FindNodeRequestArguments, GetRequestSpecific,
    Id, MessageType, Originator, PutRequestSpecific, RequestSpecific, RequestTypeSpecific,
    RoutingTable, SignedValue,
};
use crate::core::downlist::{Downlist, Probe};
use crate::core::iterative_query::{IterativeQuery, LookupResult};
use crate::core::put_query::{PutError, PutQuery, PutSummary};
use crate::core::routing_maintenance::RoutingMaintenance;
use crate::core::server::{Server, ServerSettings};

pub use config::Config;
pub use info::Info;
pub use socket::{CallOutcome, InflightRequest, RpcError, RpcSocket, DEFAULT_REQUEST_TIMEOUT};
pub use transport::{
    MemoryNetwork, MemoryTransport, Transport, TransportError, UdpTransport,
    MAX_THREAD_BLOCK_DURATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Lifecycle state of a node.
pub enum NodeState {
    #[default]
    NotJoined,
    Joining,
    Joined,
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kind of an iterative lookup.
pub enum QueryKind {
    FindNode,
    FindValue,
    GetContactDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Identifies an inflight iterative lookup, concurrent identical lookups share one query.
pub struct QueryKey {
    pub target: Id,
    pub kind: QueryKind,
}

impl From<&GetRequestSpecific> for QueryKey {
    fn from(request: &GetRequestSpecific) -> Self {
        let kind = match request {
            GetRequestSpecific::FindNode(_) => QueryKind::FindNode,
            GetRequestSpecific::FindValue(_) => QueryKind::FindValue,
            GetRequestSpecific::GetContactDetails(_) => QueryKind::GetContactDetails,
        };

        QueryKey {
            target: *request.target(),
            kind,
        }
    }
}

#[derive(Debug)]
/// Internal Actor called in the Dht thread loop, useful to create your own actor setup.
pub struct Actor {
    config: Config,

    socket: RpcSocket,

    // Routing
    /// Closest nodes to this node
    routing_table: RoutingTable,
    /// Routing table maintenance (refresh/purge timing)
    maintenance: RoutingMaintenance,
    /// Suspected dead contacts and the probes confirming them
    downlist: Downlist,

    // Active IterativeQueries
    iterative_queries: HashMap<QueryKey, IterativeQuery>,
    /// Put queries wait for the FIND_NODE of their key to finish, then
    /// send their request to the closest responding nodes.
    put_queries: HashMap<u64, PutQuery>,
    next_put_id: u64,

    server: Server,

    state: NodeState,
    originator: Originator,
}

impl Actor {
    /// Creates a new Actor over a bound transport. Does not perform network I/O;
    /// call [`Actor::join`] then [`Actor::tick`] to bootstrap.
    pub fn new(config: Config, transport: Box<dyn Transport>) -> Self {
        let id = config.node_id();

        let originator = Originator {
            id,
            nat_type: config.nat_type,
            local_address: config.local_address,
            rendezvous_address: config.rendezvous_address,
            public_key: config
                .signing_key
                .as_ref()
                .map(|signing_key| signing_key.verifying_key().to_bytes()),
        };

        let socket = RpcSocket::new(transport);

        debug!(?id, local_addr = ?socket.local_addr(), "Starting node");

        Actor {
            socket,

            routing_table: RoutingTable::with_params(id, config.k, config.failed_rpc_tolerance),
            maintenance: RoutingMaintenance::new(
                config.refresh_interval,
                config.mean_refresh_interval,
            ),
            downlist: Downlist::new(),

            iterative_queries: HashMap::new(),
            put_queries: HashMap::new(),
            next_put_id: 0,

            server: Server::new(ServerSettings {
                k: config.k,
                max_stored_keys: config.max_stored_keys,
            }),

            state: NodeState::NotJoined,
            originator,

            config,
        }
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        self.routing_table.id()
    }

    /// Returns the address the transport is listening to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Contact of this node, as other nodes see it.
    pub fn local_contact(&self) -> Contact {
        self.originator.to_contact(self.local_addr())
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn routing_table_mut(&mut self) -> &mut RoutingTable {
        &mut self.routing_table
    }

    /// Number of keys with records in the local store.
    pub fn stored_keys(&self) -> usize {
        self.server.stored_keys()
    }

    /// Returns a thread safe and lightweight summary of this node's information.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    /// Live contacts of the routing table, to bootstrap from in a future session.
    pub fn to_bootstrap(&self) -> Vec<Contact> {
        self.routing_table.to_bootstrap()
    }

    /// Values stored locally under `key`, no network involved.
    pub fn find_value_local(&mut self, key: &Id) -> Vec<SignedValue> {
        self.server.values().get(key)
    }

    // === Public Methods ===

    /// Advances inflight queries, maintenance and handles one incoming message.
    ///
    /// Call in a loop; delays degrade query completion and routing table quality.
    pub fn tick(&mut self) -> RpcTickReport {
        self.expire_requests();

        let mut done_put_queries = self.tick_put_queries();

        let done_get_queries = self.tick_get_queries();

        let join = self.cleanup_done_queries(&done_get_queries, &mut done_put_queries);

        self.periodic_node_maintenance();

        self.handle_message();

        RpcTickReport {
            done_get_queries,
            done_put_queries,
            join,
        }
    }

    /// Start joining the network through the `bootstrap` contacts.
    ///
    /// Returns the new state; [NodeState::Joined] right away if no bootstrap contact
    /// other than this node remains, otherwise [NodeState::Joining] until
    /// [RpcTickReport::join] reports the outcome.
    pub fn join(&mut self, bootstrap: Vec<Contact>) -> Result<NodeState, JoinError> {
        if self.state != NodeState::NotJoined {
            return Err(JoinError::AlreadyJoined);
        }

        let local_addr = self.local_addr();
        let id = *self.id();

        let bootstrap: Vec<Contact> = bootstrap
            .into_iter()
            .filter(|contact| *contact.id() != id && contact.address() != local_addr)
            .collect();

        if bootstrap.is_empty() {
            info!(?id, "No bootstrap contacts, starting a new network");
            self.state = NodeState::Joined;

            return Ok(self.state);
        }

        self.state = NodeState::Joining;

        for contact in &bootstrap {
            self.add_contact(contact.clone());
        }

        debug!(?id, bootstrap = bootstrap.len(), "Bootstrapping the routing table");

        let key = self.get(GetRequestSpecific::FindNode(FindNodeRequestArguments {
            target: id,
        }));

        if let Some(query) = self.iterative_queries.get_mut(&key) {
            for contact in bootstrap {
                query.add_candidate(contact);
            }
            query.start(&mut self.socket);
        }

        Ok(self.state)
    }

    /// Leave the network without notifying other nodes.
    ///
    /// Cancels all queries and calls, then forgets all contacts and local records.
    pub fn leave(&mut self) {
        self.state = NodeState::Leaving;

        self.cancel_all();

        self.routing_table.clear();
        self.downlist.clear();
        self.server.values().clear();

        self.state = NodeState::NotJoined;

        info!(id = ?self.id(), "Left the network");
    }

    /// Cancel every query and pending call.
    pub fn cancel_all(&mut self) {
        for query in self.iterative_queries.values_mut() {
            query.cancel(&mut self.socket);
        }
        for query in self.put_queries.values_mut() {
            query.cancel(&mut self.socket);
        }

        self.iterative_queries.clear();
        self.put_queries.clear();

        self.socket.cancel_all();
    }

    /// Start an iterative lookup, or join the inflight one with the same target and kind.
    ///
    /// Results are reported in [`RpcTickReport::done_get_queries`] after [`Actor::tick`].
    pub fn get(&mut self, request: GetRequestSpecific) -> QueryKey {
        let key = QueryKey::from(&request);

        // If query is still active, no need to create a new one.
        if self.iterative_queries.contains_key(&key) {
            return key;
        }

        let mut query =
            IterativeQuery::new(self.originator.clone(), request, self.config.lookup_params());

        // Seed this query with the closest live contacts we know about.
        for contact in self
            .routing_table
            .closest_live(&key.target, self.config.k, &[])
        {
            query.add_candidate(contact)
        }

        query.start(&mut self.socket);

        self.iterative_queries.insert(key, query);

        key
    }

    /// Replicate a STORE, DELETE or UPDATE to the closest nodes of its key.
    ///
    /// Returns an id to find this query in [`RpcTickReport::done_put_queries`].
    pub fn put(&mut self, request: PutRequestSpecific) -> u64 {
        let id = self.next_put_id;
        self.next_put_id = self.next_put_id.wrapping_add(1);

        let target = *request.key();

        let query = PutQuery::new(
            request,
            self.config.min_successful_store_ratio,
            self.config.request_timeout,
        );

        self.put_queries.insert(id, query);

        self.get(GetRequestSpecific::FindNode(FindNodeRequestArguments {
            target,
        }));

        id
    }

    /// FIND_NODE a random id inside every bucket not touched within the mean refresh interval.
    ///
    /// Returns the lookups started.
    pub fn refresh(&mut self) -> Vec<QueryKey> {
        let targets = self
            .routing_table
            .refresh_targets(self.maintenance.mean_refresh_interval());

        self.refresh_buckets(targets)
    }

    /// Send a PING, `completion` resolves with its [CallOutcome].
    pub fn ping(
        &mut self,
        address: SocketAddr,
        id: Option<Id>,
        completion: flume::Sender<CallOutcome>,
    ) -> u32 {
        let request = self.request(RequestTypeSpecific::Ping);

        self.socket
            .call_with(address, id, request, self.config.request_timeout, completion)
    }

    /// Add a contact that proved to be alive, probing the least recently seen
    /// contact of its bucket if it is full.
    pub fn add_contact(&mut self, contact: Contact) {
        let id = *contact.id();

        match self.routing_table.add(contact) {
            AddOutcome::Full { oldest, candidate } => {
                if self.downlist.has_replacement_probe_for(oldest.id()) {
                    return;
                }

                trace!(oldest = ?oldest.id(), candidate = ?candidate.id(), "Bucket full, probing oldest contact");

                let request = self.request(RequestTypeSpecific::Ping);
                let tid = self.socket.request(
                    oldest.address(),
                    Some(*oldest.id()),
                    request,
                    self.config.request_timeout,
                );

                self.downlist.add_probe(
                    tid,
                    Probe::Replacement {
                        oldest: *oldest.id(),
                        candidate,
                    },
                );
            }
            AddOutcome::Replaced { evicted } => {
                debug!(evicted = ?evicted.id(), added = ?id, "Replaced stale contact");
                self.downlist.acquit(&id);
            }
            AddOutcome::Added | AddOutcome::Updated => {
                self.downlist.acquit(&id);
            }
            AddOutcome::Rejected => {}
        }
    }

    /// Count a failed request to a contact, suspecting it once it reaches the tolerance.
    pub fn report_failure(&mut self, id: &Id) {
        if let Some(failed_rpcs) = self.routing_table.record_failure(id) {
            trace!(?id, failed_rpcs, "Request failed");

            if failed_rpcs >= self.routing_table.failed_rpc_tolerance() {
                self.downlist.suspect(*id);
            }
        }
    }

    // === Private Methods ===

    fn request(&self, request_type: RequestTypeSpecific) -> RequestSpecific {
        RequestSpecific {
            requester: self.originator.clone(),
            request_type,
        }
    }

    fn refresh_buckets(&mut self, targets: Vec<Id>) -> Vec<QueryKey> {
        if !targets.is_empty() {
            debug!(buckets = targets.len(), "Refreshing buckets");
        }

        targets
            .into_iter()
            .map(|target| self.get(GetRequestSpecific::FindNode(FindNodeRequestArguments { target })))
            .collect()
    }

    /// Run periodic maintenance (bucket refresh, records purge, downlist gossip).
    fn periodic_node_maintenance(&mut self) {
        if self.state != NodeState::Joined {
            return;
        }

        let decisions = self
            .maintenance
            .periodic_maintenance_decisions(&mut self.routing_table);

        self.refresh_buckets(decisions.refresh_targets);

        if decisions.should_purge_records {
            let purged = self.server.values().purge_expired();

            if purged > 0 {
                debug!(purged, "Purged expired records");
            }
        }

        self.gossip_downlist();
    }

    /// Send the downlist batch to `alpha` random contacts.
    fn gossip_downlist(&mut self) {
        let Some(ids) = self.downlist.take_batch(self.config.downlist_interval) else {
            return;
        };

        let recipients = self.routing_table.random_contacts(self.config.alpha, &ids);

        debug!(ids = ids.len(), recipients = recipients.len(), "Gossiping downlist");

        for contact in recipients {
            let request = self.request(RequestTypeSpecific::Downlist(DownlistRequestArguments {
                ids: ids.clone(),
            }));

            self.socket.request(
                contact.address(),
                Some(*contact.id()),
                request,
                self.config.request_timeout,
            );
        }
    }

    // === tick() helpers ===

    /// Settle requests past their deadline, as probe outcomes or contact failures.
    fn expire_requests(&mut self) {
        for (tid, request) in self.socket.expire() {
            match self.downlist.take_probe(tid) {
                Some(Probe::Downlist(id)) => {
                    if self.routing_table.remove(&id).is_some() {
                        debug!(?id, "Confirmed downlisted contact, removed");
                    }
                }
                Some(Probe::Replacement { oldest, candidate }) => {
                    debug!(?oldest, candidate = ?candidate.id(), "Oldest contact timed out, replaced");
                    self.routing_table.replace(&oldest, candidate);
                }
                None => {
                    if let Some(id) = request.to_id {
                        self.report_failure(&id);
                    }
                }
            }
        }
    }

    /// Advance all PUT queries, return done ones.
    fn tick_put_queries(&mut self) -> Vec<(u64, Result<PutSummary, PutError>)> {
        let mut done_put_queries = Vec::with_capacity(self.put_queries.len());

        for (id, query) in self.put_queries.iter_mut() {
            match query.tick(&self.socket) {
                Ok(Some(summary)) => done_put_queries.push((*id, Ok(summary))),
                Ok(None) => {}
                Err(error) => done_put_queries.push((*id, Err(error))),
            };
        }

        done_put_queries
    }

    /// Advance all iterative queries, return done ones.
    fn tick_get_queries(&mut self) -> Vec<(QueryKey, LookupResult)> {
        let mut done_get_queries = Vec::with_capacity(self.iterative_queries.len());

        for (key, query) in self.iterative_queries.iter_mut() {
            if query.tick(&mut self.socket) {
                done_get_queries.push((*key, query.result()));
            }
        }

        done_get_queries
    }

    /// Remove completed queries, start put queries waiting for their closest nodes,
    /// and finish joining if the bootstrapping lookup is done.
    fn cleanup_done_queries(
        &mut self,
        done_get: &[(QueryKey, LookupResult)],
        done_put: &mut Vec<(u64, Result<PutSummary, PutError>)>,
    ) -> Option<Result<(), JoinError>> {
        let mut join = None;

        for (key, result) in done_get {
            if self.iterative_queries.remove(key).is_none() {
                continue;
            }

            if key.kind != QueryKind::FindNode {
                continue;
            }

            if key.target == *self.id() && self.state == NodeState::Joining {
                join = Some(self.finish_join(result));
            }

            let own_id = *self.id();
            let local_addr = self.local_addr();
            let k = self.config.k;

            // A joined node is a replica if fewer than k responders are closer to the key.
            let local_replica = self.state == NodeState::Joined
                && result
                    .closest
                    .iter()
                    .filter(|contact| key.target.closer_than(contact.id(), &own_id))
                    .count()
                    < k;

            let remote = if local_replica { k.saturating_sub(1) } else { k };
            let remote = &result.closest[..result.closest.len().min(remote)];

            for (id, put_query) in self.put_queries.iter_mut() {
                if put_query.started() || *put_query.key() != key.target {
                    continue;
                }

                let local = if local_replica {
                    Some(
                        self.server
                            .handle_put(local_addr, &own_id, put_query.request().clone()),
                    )
                } else {
                    None
                };

                if let Err(error) = put_query.start(&mut self.socket, &self.originator, remote, local)
                {
                    done_put.push((*id, Err(error)))
                }
            }
        }

        for (id, _) in done_put.iter() {
            self.put_queries.remove(id);
        }

        join
    }

    fn finish_join(&mut self, result: &LookupResult) -> Result<(), JoinError> {
        if result.closest.is_empty() {
            error!(id = ?self.id(), "Could not bootstrap the routing table");

            self.routing_table.clear();
            self.downlist.clear();
            self.state = NodeState::NotJoined;

            return Err(JoinError::BootstrapFailed);
        }

        info!(
            id = ?self.id(),
            table_size = self.routing_table.size(),
            "Joined the network"
        );
        self.state = NodeState::Joined;

        Ok(())
    }

    /// Handle one incoming message, either a request or a response message. One message per tick.
    fn handle_message(&mut self) {
        let Some((message, from)) = self.socket.recv_from() else {
            return;
        };

        match message.message_type {
            MessageType::Request(request) => {
                self.handle_request(from, message.transaction_id, request)
            }
            MessageType::Response(response) => {
                self.handle_response(from, message.transaction_id, response)
            }
            MessageType::Error(error) => self.handle_error(from, message.transaction_id, error),
        }
    }
}

/// Results from a single [`Actor::tick`] call.
#[derive(Debug, Clone)]
pub struct RpcTickReport {
    /// Completed iterative lookups.
    pub done_get_queries: Vec<(QueryKey, LookupResult)>,
    /// Completed put queries by the id [Actor::put] returned.
    pub done_put_queries: Vec<(u64, Result<PutSummary, PutError>)>,
    /// Outcome of joining, once the bootstrapping lookup is done.
    pub join: Option<Result<(), JoinError>>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Join errors
pub enum JoinError {
    /// Join was called on a node that is not [NodeState::NotJoined].
    #[error("Node already joined or is joining")]
    AlreadyJoined,

    /// None of the bootstrap contacts responded.
    #[error("Failed to bootstrap, no contact responded")]
    BootstrapFailed,
}
