//! AsyncDht node.

use std::time::Duration;

use crate::{
    actor::{CallOutcome, Info, RpcError},
    common::{
        Contact, DeleteRequestArguments, FindNodeRequestArguments, FindValueRequestArguments,
        GetContactDetailsRequestArguments, GetRequestSpecific, Id, PutRequestSpecific,
        RoutingTable, SignedRequest, SignedValue, StoreRequestArguments, UpdateRequestArguments,
    },
    core::put_query::PutSummary,
    dht::{
        ttl_secs, ActorMessage, Dht, DhtError, FindValueResult, JoinNotifier, ResponseSender,
    },
};

impl Dht {
    /// Return an async version of the Dht client.
    pub fn as_async(self) -> AsyncDht {
        AsyncDht(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the Dht node.
pub struct AsyncDht(Dht);

impl AsyncDht {
    /// Returns a reference to the wrapped [Dht] node.
    pub fn as_sync(&self) -> &Dht {
        &self.0
    }

    // === Getters ===

    /// Information about this [Dht] node.
    pub async fn info(&self) -> Result<Info, DhtError> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0.send(ActorMessage::Info(sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// Contact of this node, as other nodes see it.
    pub async fn local_contact(&self) -> Result<Contact, DhtError> {
        let (sender, receiver) = flume::bounded::<Contact>(1);

        self.0.send(ActorMessage::LocalContact(sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// Contact with this `id` in the routing table, no network involved.
    pub async fn contact(&self, id: Id) -> Result<Option<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Option<Contact>>(1);

        self.0.send(ActorMessage::Contact(id, sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// Turn this node's routing table to a list of bootstrapping contacts.
    pub async fn to_bootstrap(&self) -> Result<Vec<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Vec<Contact>>(1);

        self.0.send(ActorMessage::ToBootstrap(sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// A snapshot of this node's routing table.
    pub async fn routing_table(&self) -> Result<RoutingTable, DhtError> {
        let (sender, receiver) = flume::bounded::<RoutingTable>(1);

        self.0.send(ActorMessage::RoutingTable(sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    // === Lifecycle ===

    /// Join the network through the `bootstrap` contacts.
    pub async fn join(&self, bootstrap: &[Contact]) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<Result<(), DhtError>>(1);

        self.0.send(ActorMessage::Join(
            bootstrap.to_vec(),
            JoinNotifier::Channel(sender),
        ))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }

    /// Leave the network, forgetting all contacts and local records.
    pub async fn leave(&self) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<()>(1);

        self.0.send(ActorMessage::Leave(sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// Refresh stale buckets, returning the number of refreshed buckets.
    pub async fn refresh(&self) -> Result<usize, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<usize, DhtError>>(1);

        self.0.send(ActorMessage::Refresh(sender))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }

    /// Shutdown the actor thread loop.
    pub async fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }

    // === Liveness ===

    /// Ping a contact.
    pub async fn ping(&self, contact: &Contact) -> Result<(), DhtError> {
        let (sender, receiver) = flume::bounded::<CallOutcome>(1);

        self.0.send(ActorMessage::Ping(
            contact.address(),
            Some(*contact.id()),
            sender,
        ))?;

        let outcome = receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?;

        outcome.into_result()?;

        Ok(())
    }

    /// Ping the contact with this `id` in the routing table.
    pub async fn ping_id(&self, id: Id) -> Result<(), DhtError> {
        let contact = self.contact(id).await?.ok_or(RpcError::NotFound)?;

        self.ping(&contact).await
    }

    // === Lookups ===

    /// Find the contact details of a node.
    pub async fn get_contact(&self, id: Id) -> Result<Contact, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<Contact, DhtError>>(1);

        let request =
            GetRequestSpecific::GetContactDetails(GetContactDetailsRequestArguments { target: id });

        self.0
            .send(ActorMessage::Get(request, ResponseSender::Contact(sender)))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }

    /// Find the closest responding contacts to a target.
    pub async fn find_node(&self, target: Id) -> Result<Vec<Contact>, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<Vec<Contact>, DhtError>>(1);

        let request = GetRequestSpecific::FindNode(FindNodeRequestArguments { target });

        self.0
            .send(ActorMessage::Get(request, ResponseSender::ClosestNodes(sender)))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }

    // === Records ===

    /// Find the values stored under `key`, locally first, then on the network.
    pub async fn find_value(&self, key: Id) -> Result<FindValueResult, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<FindValueResult, DhtError>>(1);

        let request = GetRequestSpecific::FindValue(FindValueRequestArguments { key });

        self.0
            .send(ActorMessage::Get(request, ResponseSender::Values(sender)))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }

    /// Values stored at this node under `key`, no network involved.
    pub async fn find_value_local(&self, key: Id) -> Result<Vec<SignedValue>, DhtError> {
        let (sender, receiver) = flume::bounded::<Vec<SignedValue>>(1);

        self.0.send(ActorMessage::FindValueLocal(key, sender))?;

        receiver.recv_async().await.map_err(|_| DhtError::Shutdown)
    }

    /// Store a signed value at the closest nodes to `key` for `ttl`.
    pub async fn store(
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
        .await
    }

    /// Delete a value from the closest nodes to `key`.
    pub async fn delete(
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
        .await
    }

    /// Replace `old_value` with `new_value` at the closest nodes to `key`.
    pub async fn update(
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
        .await
    }

    /// Send a [PutRequestSpecific] to the closest nodes to its key.
    pub async fn put(&self, request: PutRequestSpecific) -> Result<PutSummary, DhtError> {
        let (sender, receiver) = flume::bounded::<Result<PutSummary, DhtError>>(1);

        self.0.send(ActorMessage::Put(request, sender))?;

        receiver
            .recv_async()
            .await
            .map_err(|_| DhtError::Shutdown)?
    }
}
