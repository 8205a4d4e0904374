//! Dht node.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use flume::{Receiver, Sender, TryRecvError};
use tracing::{debug, info};

use crate::actor::{
    Actor, CallOutcome, Config, Info, JoinError, MemoryNetwork, NodeState, QueryKey, RpcError,
    Transport, TransportError, UdpTransport,
};
use crate::common::{
    Contact, DeleteRequestArguments, FindNodeRequestArguments, FindValueRequestArguments,
    GetContactDetailsRequestArguments, GetRequestSpecific, Id, NatType, PutRequestSpecific,
    RoutingTable, SignedRequest, SignedValue, StoreRequestArguments, UpdateRequestArguments,
};
use crate::core::iterative_query::LookupResult;
use crate::core::put_query::{PutError, PutSummary};

#[derive(Debug, Clone)]
/// Kademlia Dht node, a handle to the actor thread owning its state.
pub struct Dht(pub(crate) Sender<ActorMessage>);

#[derive(Debug, Default, Clone)]
/// A builder for the [Dht] node.
pub struct DhtBuilder(Config);

impl DhtBuilder {
    /// Set the bucket size, and the number of nodes records are replicated at.
    pub fn k(&mut self, k: usize) -> &mut Self {
        self.0.k = k;

        self
    }

    /// Set the maximum number of concurrent requests per lookup.
    pub fn alpha(&mut self, alpha: usize) -> &mut Self {
        self.0.alpha = alpha;

        self
    }

    /// Set the number of closest candidates a lookup must query before converging.
    pub fn beta(&mut self, beta: usize) -> &mut Self {
        self.0.beta = beta;

        self
    }

    pub fn max_rounds(&mut self, max_rounds: usize) -> &mut Self {
        self.0.max_rounds = max_rounds;

        self
    }

    /// Set the ratio of contacted nodes that must accept a store, delete or update.
    pub fn min_successful_store_ratio(&mut self, ratio: f64) -> &mut Self {
        self.0.min_successful_store_ratio = ratio;

        self
    }

    pub fn failed_rpc_tolerance(&mut self, tolerance: u16) -> &mut Self {
        self.0.failed_rpc_tolerance = tolerance;

        self
    }

    /// Set the request timeout.
    pub fn request_timeout(&mut self, request_timeout: Duration) -> &mut Self {
        self.0.request_timeout = request_timeout;

        self
    }

    pub fn mean_refresh_interval(&mut self, interval: Duration) -> &mut Self {
        self.0.mean_refresh_interval = interval;

        self
    }

    /// Set how often buckets are refreshed automatically, `None` to disable.
    pub fn refresh_interval(&mut self, interval: Option<Duration>) -> &mut Self {
        self.0.refresh_interval = interval;

        self
    }

    pub fn downlist_interval(&mut self, interval: Duration) -> &mut Self {
        self.0.downlist_interval = interval;

        self
    }

    pub fn max_stored_keys(&mut self, max_stored_keys: usize) -> &mut Self {
        self.0.max_stored_keys = max_stored_keys;

        self
    }

    /// Set an explicit port to listen on.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.0.port = Some(port);

        self
    }

    pub fn nat_type(&mut self, nat_type: NatType) -> &mut Self {
        self.0.nat_type = nat_type;

        self
    }

    pub fn local_address(&mut self, address: SocketAddr) -> &mut Self {
        self.0.local_address = Some(address);

        self
    }

    pub fn rendezvous_address(&mut self, address: SocketAddr) -> &mut Self {
        self.0.rendezvous_address = Some(address);

        self
    }

    /// Set the node identity, the node [Id] is derived from its public key.
    pub fn signing_key(&mut self, signing_key: SigningKey) -> &mut Self {
        self.0.signing_key = Some(signing_key);

        self
    }

    /// Set an explicit node [Id].
    pub fn id(&mut self, id: Id) -> &mut Self {
        self.0.id = Some(id);

        self
    }

    /// Create a Dht node listening on UDP.
    pub fn build(&self) -> Result<Dht, TransportError> {
        let transport = UdpTransport::bind(self.0.port)?;

        Ok(Dht::with_transport(self.0.clone(), Box::new(transport)))
    }

    /// Create a Dht node over a custom [Transport].
    pub fn build_with_transport<T: Transport + 'static>(&self, transport: T) -> Dht {
        Dht::with_transport(self.0.clone(), Box::new(transport))
    }
}

impl Dht {
    /// Create a new Dht node listening on UDP with the given [Config].
    pub fn new(config: Config) -> Result<Self, TransportError> {
        let transport = UdpTransport::bind(config.port)?;

        Ok(Dht::with_transport(config, Box::new(transport)))
    }

    /// Returns a builder to edit settings before creating a Dht node.
    pub fn builder() -> DhtBuilder {
        DhtBuilder::default()
    }

    /// Spawn the actor thread of a new node over `transport`.
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        let (sender, receiver) = flume::unbounded();

        let actor = Actor::new(config, transport);

        thread::spawn(move || run(actor, receiver));

        Dht(sender)
    }

    // === Getters ===

    /// Information about this node.
    pub fn info(&self) -> Result<Info, DhtError> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.send(ActorMessage::Info(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// Contact of this node, as other nodes see it.
    pub fn local_contact(&self) -> Result<Contact, DhtError> {
        let (sender, receiver) = flume::bounded::<Contact>(1);

        self.send(ActorMessage::LocalContact(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// Contact with this `id` in the routing table, no network involved.
    pub fn contact(&self, id: Id) -> Result<Option<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Option<Contact>>(1);

        self.send(ActorMessage::Contact(id, sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// Turn this node's routing table to a list of bootstrapping contacts.
    pub fn to_bootstrap(&self) -> Result<Vec<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Vec<Contact>>(1);

        self.send(ActorMessage::ToBootstrap(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// A snapshot of this node's routing table.
    pub fn routing_table(&self) -> Result<RoutingTable, DhtError> {
        let (sender, receiver) = flume::bounded::<RoutingTable>(1);

        self.send(ActorMessage::RoutingTable(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    // === Lifecycle ===

    /// Join the network through the `bootstrap` contacts, blocking until the
    /// routing table is populated.
    ///
    /// An empty `bootstrap` starts a new network.
    pub fn join(&self, bootstrap: &[Contact]) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<Result<(), DhtError>>(1);

        self.send(ActorMessage::Join(
            bootstrap.to_vec(),
            JoinNotifier::Channel(sender),
        ))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    /// Same as [Self::join] but returns immediately, calling `callback` from the
    /// actor thread once joining is done.
    pub fn join_with_callback<F>(&self, bootstrap: &[Contact], callback: F) -> Result<(), DhtError>
    where
        F: FnOnce(Result<(), DhtError>) + Send + 'static,
    {
        self.send(ActorMessage::Join(
            bootstrap.to_vec(),
            JoinNotifier::Callback(Box::new(callback)),
        ))
    }

    /// Leave the network, forgetting all contacts and local records.
    ///
    /// Other nodes are not notified, inflight operations fail with [DhtError::Cancelled].
    pub fn leave(&self) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<()>(1);

        self.send(ActorMessage::Leave(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// Start a FIND_NODE lookup for a random id in every bucket not touched
    /// within the mean refresh interval, returning the number of refreshed buckets.
    pub fn refresh(&self) -> Result<usize, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<usize, DhtError>>(1);

        self.send(ActorMessage::Refresh(sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    /// Shutdown the actor thread loop.
    pub fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }

    // === Liveness ===

    /// Ping a contact.
    pub fn ping(&self, contact: &Contact) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<CallOutcome>(1);

        self.send(ActorMessage::Ping(
            contact.address(),
            Some(*contact.id()),
            sender,
        ))?;

        let outcome = receiver.recv().map_err(|_| DhtError::Shutdown)?;

        outcome.into_result()?;

        Ok(())
    }

    /// Ping the contact with this `id` in the routing table.
    pub fn ping_id(&self, id: Id) -> Result<(), DhtError> {
        let contact = self.contact(id)?.ok_or(RpcError::NotFound)?;

        self.ping(&contact)
    }

    // === Lookups ===

    /// Find the contact details of a node, from the routing table if known,
    /// otherwise with a GET_CONTACT_DETAILS lookup.
    pub fn get_contact(&self, id: Id) -> Result<Contact, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<Contact, DhtError>>(1);

        let request =
            GetRequestSpecific::GetContactDetails(GetContactDetailsRequestArguments { target: id });

        self.send(ActorMessage::Get(request, ResponseSender::Contact(sender)))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    /// Find the closest responding contacts to a target.
    pub fn find_node(&self, target: Id) -> Result<Vec<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<Vec<Contact>, DhtError>>(1);

        let request = GetRequestSpecific::FindNode(FindNodeRequestArguments { target });

        self.send(ActorMessage::Get(request, ResponseSender::ClosestNodes(sender)))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    // === Records ===

    /// Find the values stored under `key`, locally first, then on the network.
    pub fn find_value(&self, key: Id) -> Result<FindValueResult, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<FindValueResult, DhtError>>(1);

        let request = GetRequestSpecific::FindValue(FindValueRequestArguments { key });

        self.send(ActorMessage::Get(request, ResponseSender::Values(sender)))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    /// Values stored at this node under `key`, no network involved.
    pub fn find_value_local(&self, key: Id) -> Result<Vec<SignedValue>, DhtError> {
        let (sender, receiver) = flume::bounded::<Vec<SignedValue>>(1);

        self.send(ActorMessage::FindValueLocal(key, sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)
    }

    /// Store a signed value at the closest nodes to `key` for `ttl`.
    pub fn store(
        &self,
        key: Id,
        value: SignedValue,
        request: SignedRequest,
        ttl: Duration,
    ) -> Result<PutSummary, DhtError> {
        self.put(PutRequestSpecific::Store(StoreRequestArguments {
            key,
            value,
            request,
            ttl: ttl_secs(ttl),
        }))
    }

    /// Delete a value from the closest nodes to `key`, if it was stored by the
    /// same signer as the `request`.
    pub fn delete(
        &self,
        key: Id,
        value: SignedValue,
        request: SignedRequest,
    ) -> Result<PutSummary, DhtError> {
        self.put(PutRequestSpecific::Delete(DeleteRequestArguments {
            key,
            value,
            request,
        }))
    }

    /// Replace `old_value` with `new_value` at the closest nodes to `key`.
    pub fn update(
        &self,
        key: Id,
        old_value: SignedValue,
        new_value: SignedValue,
        request: SignedRequest,
        ttl: Duration,
    ) -> Result<PutSummary, DhtError> {
        self.put(PutRequestSpecific::Update(UpdateRequestArguments {
            key,
            old_value,
            new_value,
            request,
            ttl: ttl_secs(ttl),
        }))
    }

    /// Send a [PutRequestSpecific] to the closest nodes to its key.
    pub fn put(&self, request: PutRequestSpecific) -> Result<PutSummary, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<PutSummary, DhtError>>(1);

        self.send(ActorMessage::Put(request, sender))?;

        receiver.recv().map_err(|_| DhtError::Shutdown)?
    }

    // === Private Methods ===

    pub(crate) fn send(&self, message: ActorMessage) -> Result<(), DhtError> {
        self.0.send(message).map_err(|_| DhtError::Shutdown)
    }
}

pub(crate) fn ttl_secs(ttl: Duration) -> u32 {
    ttl.as_secs().min(u32::MAX as u64) as u32
}

/// Outcome of a FIND_VALUE lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FindValueResult {
    /// Values stored under the key.
    Found(Vec<SignedValue>),
    /// No node returned a value, these are the closest responding contacts to the key.
    NotFound { closest: Vec<Contact> },
}

impl FindValueResult {
    /// The found values, empty if none.
    pub fn values(&self) -> &[SignedValue] {
        match self {
            FindValueResult::Found(values) => values,
            FindValueResult::NotFound { .. } => &[],
        }
    }
}

// === Actor thread ===

fn run(actor: Actor, receiver: Receiver<ActorMessage>) {
    let mut actor_loop = ActorLoop {
        actor,
        get_senders: HashMap::new(),
        put_senders: HashMap::new(),
        join_notifier: None,
    };

    loop {
        match receiver.try_recv() {
            Ok(ActorMessage::Shutdown(sender)) => {
                actor_loop.shutdown();
                let _ = sender.send(());

                break;
            }
            Ok(message) => actor_loop.handle(message),
            Err(TryRecvError::Disconnected) => {
                // All handles were dropped.
                actor_loop.shutdown();

                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        actor_loop.tick();
    }
}

/// The [Actor] and the senders waiting for its queries.
struct ActorLoop {
    actor: Actor,
    get_senders: HashMap<QueryKey, Vec<ResponseSender>>,
    put_senders: HashMap<u64, Sender<Result<PutSummary, DhtError>>>,
    join_notifier: Option<JoinNotifier>,
}

impl ActorLoop {
    fn handle(&mut self, message: ActorMessage) {
        let actor = &mut self.actor;

        match message {
            ActorMessage::Info(sender) => {
                let _ = sender.send(actor.info());
            }
            ActorMessage::LocalContact(sender) => {
                let _ = sender.send(actor.local_contact());
            }
            ActorMessage::Contact(id, sender) => {
                let _ = sender.send(actor.routing_table().get(&id).cloned());
            }
            ActorMessage::ToBootstrap(sender) => {
                let _ = sender.send(actor.to_bootstrap());
            }
            ActorMessage::RoutingTable(sender) => {
                let _ = sender.send(actor.routing_table().clone());
            }
            ActorMessage::Join(bootstrap, notifier) => match actor.join(bootstrap) {
                Ok(NodeState::Joined) => notifier.notify(Ok(())),
                Ok(_) => self.join_notifier = Some(notifier),
                Err(error) => notifier.notify(Err(error.into())),
            },
            ActorMessage::Leave(sender) => {
                actor.leave();
                self.fail_pending(DhtError::Cancelled);

                let _ = sender.send(());
            }
            ActorMessage::Refresh(sender) => {
                let result = if actor.state() == NodeState::Joined {
                    Ok(actor.refresh().len())
                } else {
                    Err(DhtError::NotJoined)
                };

                let _ = sender.send(result);
            }
            ActorMessage::Ping(address, id, sender) => {
                actor.ping(address, id, sender);
            }
            ActorMessage::FindValueLocal(key, sender) => {
                let _ = sender.send(actor.find_value_local(&key));
            }
            ActorMessage::Get(request, sender) => {
                if actor.state() == NodeState::NotJoined {
                    sender.fail(DhtError::NotJoined);
                    return;
                }

                match &request {
                    GetRequestSpecific::FindValue(FindValueRequestArguments { key }) => {
                        let values = actor.find_value_local(key);

                        if !values.is_empty() {
                            debug!(?key, "Found values locally");
                            sender.values(values);
                            return;
                        }
                    }
                    GetRequestSpecific::GetContactDetails(GetContactDetailsRequestArguments {
                        target,
                    }) => {
                        let local = if target == actor.id() {
                            Some(actor.local_contact())
                        } else {
                            actor.routing_table().get(target).cloned()
                        };

                        if let Some(contact) = local {
                            sender.contact(contact);
                            return;
                        }
                    }
                    GetRequestSpecific::FindNode(_) => {}
                }

                let key = actor.get(request);

                self.get_senders.entry(key).or_default().push(sender);
            }
            ActorMessage::Put(request, sender) => {
                if actor.state() == NodeState::NotJoined {
                    let _ = sender.send(Err(DhtError::NotJoined));
                    return;
                }

                let id = actor.put(request);

                self.put_senders.insert(id, sender);
            }
            ActorMessage::Shutdown(sender) => {
                // Handled by the run loop.
                let _ = sender.send(());
            }
        }
    }

    fn tick(&mut self) {
        let report = self.actor.tick();

        for (key, result) in report.done_get_queries {
            if let Some(senders) = self.get_senders.remove(&key) {
                for sender in senders {
                    sender.send(&result);
                }
            }
        }

        for (id, result) in report.done_put_queries {
            if let Some(sender) = self.put_senders.remove(&id) {
                let _ = sender.send(result.map_err(DhtError::from));
            }
        }

        if let Some(result) = report.join {
            if let Some(notifier) = self.join_notifier.take() {
                notifier.notify(result.map_err(DhtError::from));
            }
        }
    }

    fn shutdown(&mut self) {
        info!(id = ?self.actor.id(), "Shutting down node");

        self.actor.cancel_all();
        self.fail_pending(DhtError::Shutdown);
    }

    fn fail_pending(&mut self, error: DhtError) {
        for (_, senders) in self.get_senders.drain() {
            for sender in senders {
                sender.fail(error.clone());
            }
        }

        for (_, sender) in self.put_senders.drain() {
            let _ = sender.send(Err(error.clone()));
        }

        if let Some(notifier) = self.join_notifier.take() {
            notifier.notify(Err(error));
        }
    }
}

pub(crate) enum ActorMessage {
    Info(Sender<Info>),
    LocalContact(Sender<Contact>),
    Contact(Id, Sender<Option<Contact>>),
    ToBootstrap(Sender<Vec<Contact>>),
    RoutingTable(Sender<RoutingTable>),
    Join(Vec<Contact>, JoinNotifier),
    Leave(Sender<()>),
    Refresh(Sender<Result<usize, DhtError>>),
    Ping(SocketAddr, Option<Id>, Sender<CallOutcome>),
    FindValueLocal(Id, Sender<Vec<SignedValue>>),
    Get(GetRequestSpecific, ResponseSender),
    Put(PutRequestSpecific, Sender<Result<PutSummary, DhtError>>),
    Shutdown(Sender<()>),
}

pub(crate) enum JoinNotifier {
    Channel(Sender<Result<(), DhtError>>),
    Callback(Box<dyn FnOnce(Result<(), DhtError>) + Send>),
}

impl JoinNotifier {
    fn notify(self, result: Result<(), DhtError>) {
        match self {
            JoinNotifier::Channel(sender) => {
                let _ = sender.send(result);
            }
            JoinNotifier::Callback(callback) => callback(result),
        }
    }
}

pub(crate) enum ResponseSender {
    ClosestNodes(Sender<Result<Vec<Contact>, DhtError>>),
    Values(Sender<Result<FindValueResult, DhtError>>),
    Contact(Sender<Result<Contact, DhtError>>),
}

impl ResponseSender {
    fn send(self, result: &LookupResult) {
        match self {
            ResponseSender::ClosestNodes(sender) => {
                let _ = sender.send(Ok(result.closest.clone()));
            }
            ResponseSender::Values(sender) => {
                let response = if result.values.is_empty() {
                    FindValueResult::NotFound {
                        closest: result.closest.clone(),
                    }
                } else {
                    FindValueResult::Found(result.values.clone())
                };

                let _ = sender.send(Ok(response));
            }
            ResponseSender::Contact(sender) => {
                let _ = sender.send(
                    result
                        .contact
                        .clone()
                        .ok_or(DhtError::Rpc(RpcError::NotFound)),
                );
            }
        }
    }

    fn values(self, values: Vec<SignedValue>) {
        if let ResponseSender::Values(sender) = self {
            let _ = sender.send(Ok(FindValueResult::Found(values)));
        }
    }

    fn contact(self, contact: Contact) {
        if let ResponseSender::Contact(sender) = self {
            let _ = sender.send(Ok(contact));
        }
    }

    fn fail(self, error: DhtError) {
        match self {
            ResponseSender::ClosestNodes(sender) => {
                let _ = sender.send(Err(error));
            }
            ResponseSender::Values(sender) => {
                let _ = sender.send(Err(error));
            }
            ResponseSender::Contact(sender) => {
                let _ = sender.send(Err(error));
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Dht handle errors
pub enum DhtError {
    /// The actor thread is no longer running.
    #[error("Dht was shutdown")]
    Shutdown,

    /// The operation needs a joined node.
    #[error("Node is not joined")]
    NotJoined,

    /// The node left while the operation was inflight.
    #[error("Operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Put(#[from] PutError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Create a testnet of Dht nodes over an in-memory network.
#[derive(Debug)]
pub struct Testnet {
    /// Contact of the first node, every other node joined through it.
    pub bootstrap: Vec<Contact>,
    pub nodes: Vec<Dht>,
    pub network: MemoryNetwork,
}

impl Testnet {
    pub fn new(count: usize) -> crate::Result<Testnet> {
        Testnet::with_builder(count, &Dht::builder())
    }

    /// Create a testnet of `count` joined nodes built with `builder`.
    pub fn with_builder(count: usize, builder: &DhtBuilder) -> crate::Result<Testnet> {
        let network = MemoryNetwork::new();

        let mut nodes: Vec<Dht> = Vec::with_capacity(count);
        let mut bootstrap = vec![];

        for _ in 0..count {
            let node = builder.build_with_transport(network.bind(None)?);

            node.join(&bootstrap)?;

            if bootstrap.is_empty() {
                bootstrap.push(node.local_contact()?);
            }

            nodes.push(node);
        }

        Ok(Self {
            bootstrap,
            nodes,
            network,
        })
    }

    /// Build one more node on this network, without joining it.
    pub fn spawn(&self, builder: &DhtBuilder) -> crate::Result<Dht> {
        Ok(builder.build_with_transport(self.network.bind(None)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shutdown() {
        let mut dht = Dht::builder()
            .build_with_transport(MemoryNetwork::new().bind(None).unwrap());

        let clone = dht.clone();
        dht.shutdown();

        assert_eq!(clone.info().map(|_| ()), Err(DhtError::Shutdown));
    }

    #[test]
    fn join_alone() {
        let dht = Dht::builder()
            .build_with_transport(MemoryNetwork::new().bind(None).unwrap());

        dht.join(&[]).unwrap();

        assert_eq!(dht.info().unwrap().state(), NodeState::Joined);
        assert_eq!(
            dht.join(&[]),
            Err(DhtError::Join(JoinError::AlreadyJoined))
        );
    }

    #[test]
    fn lookups_require_joining() {
        let dht = Dht::builder()
            .build_with_transport(MemoryNetwork::new().bind(None).unwrap());

        assert_eq!(dht.find_node(Id::random()), Err(DhtError::NotJoined));
        assert_eq!(dht.refresh(), Err(DhtError::NotJoined));
    }

    #[test]
    fn ttl_seconds() {
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 1);
        assert_eq!(ttl_secs(Duration::MAX), u32::MAX);
    }
}
