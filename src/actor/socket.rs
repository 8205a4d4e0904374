//! Socket layer correlating outgoing requests with incoming responses.

mod inflight_requests;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::{
    ErrorSpecific, Id, Message, MessageType, RequestSpecific, ResponseSpecific, VERSION,
};
use crate::Result;

use super::transport::Transport;

pub use inflight_requests::{CallOutcome, InflightRequest, RpcError};
use inflight_requests::InflightRequests;

/// Default request timeout before abandoning an inflight request to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000); // 2 seconds

/// A [Transport] wrapper that formats and correlates DHT requests and responses.
#[derive(Debug)]
pub struct RpcSocket {
    next_tid: u32,
    transport: Box<dyn Transport>,
    inflight_requests: InflightRequests,
    local_addr: SocketAddr,
}

impl RpcSocket {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let local_addr = transport.local_addr();

        Self {
            next_tid: 0,
            transport,
            inflight_requests: InflightRequests::new(),
            local_addr,
        }
    }

    // === Getters ===

    /// Returns the address the transport is listening to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns true if this message's transaction_id is still inflight
    pub fn inflight(&self, transaction_id: &u32) -> bool {
        self.inflight_requests.contains(*transaction_id)
    }

    /// Number of pending calls.
    pub fn inflight_count(&self) -> usize {
        self.inflight_requests.len()
    }

    // === Public Methods ===

    /// Send a request to the given address and return the transaction_id
    pub fn request(
        &mut self,
        address: SocketAddr,
        to_id: Option<Id>,
        request: RequestSpecific,
        timeout: Duration,
    ) -> u32 {
        self.send_request(address, to_id, request, timeout, None)
    }

    /// Same as [Self::request] but the returned receiver resolves once the
    /// call gets a response, times out, or gets cancelled.
    pub fn call(
        &mut self,
        address: SocketAddr,
        to_id: Option<Id>,
        request: RequestSpecific,
        timeout: Duration,
    ) -> (u32, flume::Receiver<CallOutcome>) {
        let (sender, receiver) = flume::bounded(1);

        let tid = self.send_request(address, to_id, request, timeout, Some(sender));

        (tid, receiver)
    }

    /// Same as [Self::call] but resolves an existing sender.
    pub fn call_with(
        &mut self,
        address: SocketAddr,
        to_id: Option<Id>,
        request: RequestSpecific,
        timeout: Duration,
        completion: flume::Sender<CallOutcome>,
    ) -> u32 {
        self.send_request(address, to_id, request, timeout, Some(completion))
    }

    /// Send a response to the given address.
    pub fn response(
        &mut self,
        address: SocketAddr,
        transaction_id: u32,
        response: ResponseSpecific,
        timeout: Duration,
    ) {
        let message = self.response_message(MessageType::Response(response), transaction_id);

        let _ = self.send(address, message, timeout).map_err(|e| {
            debug!(?e, "Error sending response message");
        });
    }

    /// Send an error to the given address.
    pub fn error(&mut self, address: SocketAddr, transaction_id: u32, error: ErrorSpecific) {
        let message = self.response_message(MessageType::Error(error), transaction_id);

        let _ = self
            .send(address, message, DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| {
                debug!(?e, "Error sending error message");
            });
    }

    /// Receives a single message from the transport.
    /// On success, returns the message and the origin.
    ///
    /// Responses and errors are only returned if they match an inflight
    /// request sent to the same address, and complete its call if any.
    pub fn recv_from(&mut self) -> Option<(Message, SocketAddr)> {
        let (bytes, from) = self.transport.recv()?;

        if from.port() == 0 {
            trace!(
                context = "socket_validation",
                message = "Response from port 0"
            );
            return None;
        }

        match Message::from_bytes(&bytes) {
            Ok(message) => match &message.message_type {
                MessageType::Request(_) => {
                    trace!(
                        context = "socket_message_receiving",
                        ?message,
                        ?from,
                        "Received request message"
                    );

                    Some((message, from))
                }
                MessageType::Response(response) => {
                    trace!(
                        context = "socket_message_receiving",
                        ?message,
                        ?from,
                        "Received response message"
                    );

                    let request = self.expected_request(message.transaction_id, &from)?;
                    request.complete(CallOutcome::Response(response.clone()));

                    Some((message, from))
                }
                MessageType::Error(error) => {
                    trace!(
                        context = "socket_message_receiving",
                        ?message,
                        ?from,
                        "Received error message"
                    );

                    let request = self.expected_request(message.transaction_id, &from)?;
                    request.complete(CallOutcome::Error(error.clone()));

                    Some((message, from))
                }
            },
            Err(error) => {
                trace!(
                    context = "socket_error",
                    ?error,
                    ?from,
                    message = ?String::from_utf8_lossy(&bytes),
                    "Received invalid message."
                );

                None
            }
        }
    }

    /// Remove every inflight request past its deadline, resolving their calls
    /// as [CallOutcome::Timeout], and return them.
    pub fn expire(&mut self) -> Vec<(u32, InflightRequest)> {
        let expired = self.inflight_requests.expire(Instant::now());

        for (tid, request) in &expired {
            trace!(
                context = "socket_timeout",
                tid,
                to = ?request.to,
                to_id = ?request.to_id,
                "Request timed out"
            );

            request.clone().complete(CallOutcome::Timeout);
        }

        expired
    }

    /// Cancel an inflight request, resolving its call as [CallOutcome::Cancelled].
    pub fn cancel(&mut self, transaction_id: u32) {
        if let Some(request) = self.inflight_requests.take(transaction_id) {
            request.complete(CallOutcome::Cancelled);
        }
    }

    /// Cancel all inflight requests.
    pub fn cancel_all(&mut self) {
        for (_, request) in self.inflight_requests.drain() {
            request.complete(CallOutcome::Cancelled);
        }
    }

    // === Private Methods ===

    fn expected_request(&mut self, transaction_id: u32, from: &SocketAddr) -> Option<InflightRequest> {
        // Find and remove the matching inflight request
        let request = self.inflight_requests.remove(transaction_id, from);

        if request.is_none() {
            trace!(
                context = "socket_validation",
                message = "Unexpected response id or wrong address"
            );
        }

        request
    }

    fn send_request(
        &mut self,
        address: SocketAddr,
        to_id: Option<Id>,
        request: RequestSpecific,
        timeout: Duration,
        completion: Option<flume::Sender<CallOutcome>>,
    ) -> u32 {
        let message = self.request_message(request);
        let tid = message.transaction_id;

        self.inflight_requests
            .add(tid, address, to_id, timeout, completion);

        // Unreachable contacts time out like any other unresponsive contact.
        let _ = self.send(address, message, timeout).map_err(|e| {
            debug!(?e, "Error sending request message");
        });

        tid
    }

    /// Increments self.next_tid and returns the previous value.
    fn tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }

    fn request_message(&mut self, message: RequestSpecific) -> Message {
        let transaction_id = self.tid();

        Message {
            transaction_id,
            message_type: MessageType::Request(message),
            version: Some(VERSION),
        }
    }

    /// Same as request_message but with the request's transaction_id.
    fn response_message(&mut self, message: MessageType, request_tid: u32) -> Message {
        Message {
            transaction_id: request_tid,
            message_type: message,
            version: Some(VERSION),
        }
    }

    /// Send a raw dht message
    fn send(&mut self, address: SocketAddr, message: Message, timeout: Duration) -> Result<()> {
        self.transport
            .send(&message.to_bytes()?, address, timeout)?;
        trace!(context = "socket_message_sending", message = ?message);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::actor::transport::MemoryNetwork;
    use crate::common::{Originator, RequestTypeSpecific, ResponseTypeSpecific};

    use super::*;

    fn socket(network: &MemoryNetwork) -> RpcSocket {
        RpcSocket::new(Box::new(network.bind(None).unwrap()))
    }

    fn ping() -> RequestSpecific {
        RequestSpecific {
            requester: Originator::new(Id::random()),
            request_type: RequestTypeSpecific::Ping,
        }
    }

    fn ack() -> ResponseSpecific {
        ResponseSpecific {
            responder: Originator::new(Id::random()),
            response_type: ResponseTypeSpecific::Ack,
        }
    }

    fn recv(socket: &mut RpcSocket) -> (Message, SocketAddr) {
        loop {
            if let Some(received) = socket.recv_from() {
                return received;
            }
        }
    }

    #[test]
    fn tid() {
        let network = MemoryNetwork::new();
        let mut socket = socket(&network);

        assert_eq!(socket.tid(), 0);
        assert_eq!(socket.tid(), 1);
        assert_eq!(socket.tid(), 2);

        socket.next_tid = u32::MAX;

        assert_eq!(socket.tid(), 4294967295);
        assert_eq!(socket.tid(), 0);
    }

    #[test]
    fn recv_request() {
        let network = MemoryNetwork::new();
        let mut server = socket(&network);
        let mut client = socket(&network);
        client.next_tid = 120;

        let request = ping();

        client.request(server.local_addr(), None, request.clone(), DEFAULT_REQUEST_TIMEOUT);

        let (message, from) = recv(&mut server);

        assert_eq!(from, client.local_addr());
        assert_eq!(message.transaction_id, 120);
        assert_eq!(message.version, Some(VERSION));
        assert_eq!(message.message_type, MessageType::Request(request));
    }

    #[test]
    fn call_resolves_with_response() {
        let network = MemoryNetwork::new();
        let mut server = socket(&network);
        let mut client = socket(&network);

        let (tid, receiver) =
            client.call(server.local_addr(), None, ping(), DEFAULT_REQUEST_TIMEOUT);
        assert!(client.inflight(&tid));

        let (message, from) = recv(&mut server);
        let response = ack();
        server.response(from, message.transaction_id, response.clone(), DEFAULT_REQUEST_TIMEOUT);

        let (message, _) = recv(&mut client);

        assert_eq!(message.message_type, MessageType::Response(response.clone()));
        assert_eq!(receiver.recv(), Ok(CallOutcome::Response(response)));
        assert!(!client.inflight(&tid));
    }

    #[test]
    fn ignore_unexpected_responses() {
        let network = MemoryNetwork::new();
        let mut stranger = socket(&network);
        let mut server = socket(&network);
        let mut client = socket(&network);

        let tid = client.request(server.local_addr(), None, ping(), DEFAULT_REQUEST_TIMEOUT);

        // Right transaction id from the wrong address
        stranger.response(client.local_addr(), tid, ack(), DEFAULT_REQUEST_TIMEOUT);
        // Unknown transaction id
        server.response(client.local_addr(), tid + 1, ack(), DEFAULT_REQUEST_TIMEOUT);

        assert!(client.recv_from().is_none());
        assert!(client.recv_from().is_none());
        assert!(client.inflight(&tid));
    }

    #[test]
    fn expire_and_cancel() {
        let network = MemoryNetwork::new();
        let server = socket(&network);
        let mut client = socket(&network);
        let id = Id::random();

        let (expiring, timeout) = client.call(server.local_addr(), Some(id), ping(), Duration::ZERO);
        let (cancelled, cancel) =
            client.call(server.local_addr(), None, ping(), DEFAULT_REQUEST_TIMEOUT);

        let expired = client.expire();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, expiring);
        assert_eq!(expired[0].1.to_id, Some(id));
        assert_eq!(timeout.recv(), Ok(CallOutcome::Timeout));

        client.cancel(cancelled);
        assert_eq!(cancel.recv(), Ok(CallOutcome::Cancelled));
        assert_eq!(client.inflight_count(), 0);
    }

    #[test]
    fn unreachable_requests_time_out() {
        let network = MemoryNetwork::new();
        let mut client = socket(&network);

        let (_, receiver) = client.call(
            SocketAddr::from(([127, 0, 0, 1], 1)),
            None,
            ping(),
            Duration::ZERO,
        );

        assert_eq!(client.expire().len(), 1);
        assert_eq!(
            receiver.recv().map(CallOutcome::into_result),
            Ok(Err(RpcError::Timeout))
        );
    }
}
