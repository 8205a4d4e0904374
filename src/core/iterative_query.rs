//! Manage iterative queries and their corresponding request/response.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, trace};

use crate::actor::RpcSocket;
use crate::common::{
    ClosestContacts, Contact, GetRequestSpecific, Id, Originator, RequestSpecific,
    ResponseTypeSpecific, SignedValue, MAX_BUCKET_SIZE_K,
};

/// Default number of concurrent requests per lookup.
pub const DEFAULT_ALPHA: usize = 3;
/// Default number of closest candidates that must be queried before a lookup converges.
pub const DEFAULT_BETA: usize = MAX_BUCKET_SIZE_K;
/// Default number of rounds of [DEFAULT_ALPHA] requests a lookup may send.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Parameters of an [IterativeQuery].
pub struct LookupParams {
    /// Number of closest contacts to return, and to consider as candidates.
    pub k: usize,
    /// Maximum number of requests in flight.
    pub alpha: usize,
    /// The lookup converges once the `beta` closest live candidates were queried.
    pub beta: usize,
    /// The lookup sends at most `max_rounds * alpha` requests.
    pub max_rounds: usize,
    pub timeout: Duration,
}

impl Default for LookupParams {
    fn default() -> Self {
        Self {
            k: MAX_BUCKET_SIZE_K,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout: crate::actor::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// What an [IterativeQuery] found.
pub struct LookupResult {
    /// Closest responding contacts, closest first.
    pub closest: Vec<Contact>,
    /// Values found by a FIND_VALUE lookup.
    pub values: Vec<SignedValue>,
    /// Contact found by a GET_CONTACT_DETAILS lookup.
    pub contact: Option<Contact>,
}

/// An iterative process of concurrently sending a request to the closest known contacts to
/// the target, adding closer contacts discovered in the responses as candidates, and
/// repeating this process until the closest candidates were all queried.
#[derive(Debug)]
pub struct IterativeQuery {
    requester: Originator,
    request: GetRequestSpecific,
    params: LookupParams,

    candidates: ClosestContacts,
    responders: ClosestContacts,

    inflight_requests: HashMap<u32, Id>,
    queried: HashSet<Id>,
    failed: HashSet<Id>,
    sent: usize,

    values: Vec<SignedValue>,
    contact: Option<Contact>,
    done: bool,
}

impl IterativeQuery {
    pub fn new(requester: Originator, request: GetRequestSpecific, params: LookupParams) -> Self {
        let target = *request.target();

        trace!(?target, ?request, "New Query");

        let params = LookupParams {
            k: params.k.max(1),
            alpha: params.alpha.max(1),
            beta: params.beta.clamp(1, params.k.max(1)),
            max_rounds: params.max_rounds.max(1),
            timeout: params.timeout,
        };

        Self {
            requester,
            request,
            params,

            candidates: ClosestContacts::new(target),
            responders: ClosestContacts::new(target),

            inflight_requests: HashMap::new(),
            queried: HashSet::new(),
            failed: HashSet::new(),
            sent: 0,

            values: Vec::new(),
            contact: None,
            done: false,
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.candidates.target()
    }

    pub fn request(&self) -> &GetRequestSpecific {
        &self.request
    }

    /// Closest contacts according to other contacts.
    pub fn candidates(&self) -> &ClosestContacts {
        &self.candidates
    }

    /// Closest contacts that responded.
    pub fn responders(&self) -> &ClosestContacts {
        &self.responders
    }

    /// Return true if a response (by transaction_id) is expected by this query.
    pub fn inflight(&self, tid: u32) -> bool {
        self.inflight_requests.contains_key(&tid)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// What this query found so far.
    pub fn result(&self) -> LookupResult {
        LookupResult {
            closest: self.responders.take(self.params.k),
            values: self.values.clone(),
            contact: self.contact.clone(),
        }
    }

    // === Public Methods ===

    /// Add a candidate contact to query on next tick if it is among the closest contacts.
    pub fn add_candidate(&mut self, contact: Contact) {
        if *contact.id() != self.requester.id {
            self.candidates.add(contact);
        }
    }

    /// Force start query traversal by visiting closest contacts.
    pub fn start(&mut self, socket: &mut RpcSocket) {
        self.visit_closest(socket);
    }

    /// Handle a response from a queried contact.
    pub fn response(&mut self, tid: u32, from: Contact, response: ResponseTypeSpecific) {
        if self.inflight_requests.remove(&tid).is_none() {
            return;
        }

        let target = self.target();
        debug!(?target, from = ?from.id(), "Query got response");

        match response {
            ResponseTypeSpecific::FindNode(args) => self.add_candidates(args.nodes),
            ResponseTypeSpecific::FindValue(args) => {
                if !args.values.is_empty()
                    && matches!(self.request, GetRequestSpecific::FindValue(_))
                {
                    for value in args.values {
                        if !self.values.contains(&value) {
                            self.values.push(value);
                        }
                    }
                    self.done = true;
                }

                self.add_candidates(args.nodes);
            }
            ResponseTypeSpecific::GetContactDetails(args) => {
                if let Some(contact) = args.contact {
                    if *contact.id() == target
                        && matches!(self.request, GetRequestSpecific::GetContactDetails(_))
                    {
                        self.contact = Some(contact);
                        self.done = true;
                    }
                }

                self.add_candidates(args.nodes);
            }
            _ => {}
        }

        self.queried.insert(*from.id());
        self.responders.add(from);
    }

    /// Handle an error response, the contact stays queried but not a responder.
    pub fn error(&mut self, tid: u32) {
        self.inflight_requests.remove(&tid);
    }

    /// Query closest contacts for this query's target and message.
    ///
    /// Returns true if it is done.
    pub fn tick(&mut self, socket: &mut RpcSocket) -> bool {
        if self.done {
            // A found value or contact ends the query before its other requests settle.
            self.cancel(socket);

            return true;
        }

        // Requests no longer inflight in the socket timed out or got cancelled.
        let settled: Vec<u32> = self
            .inflight_requests
            .keys()
            .filter(|tid| !socket.inflight(tid))
            .copied()
            .collect();

        for tid in settled {
            if let Some(id) = self.inflight_requests.remove(&tid) {
                self.failed.insert(id);
            }
        }

        self.visit_closest(socket);

        if self.inflight_requests.is_empty() {
            self.done = true;

            debug!(
                target = ?self.target(),
                candidates = ?self.candidates.len(),
                queried = ?self.queried.len(),
                failed = ?self.failed.len(),
                responders = ?self.responders.len(),
                "Done query"
            );
        }

        self.done
    }

    /// Cancel all inflight requests of this query.
    pub fn cancel(&mut self, socket: &mut RpcSocket) {
        for tid in self.inflight_requests.keys() {
            socket.cancel(*tid);
        }

        self.inflight_requests.clear();
        self.done = true;
    }

    // === Private Methods ===

    fn add_candidates(&mut self, contacts: Vec<Contact>) {
        for contact in contacts {
            self.add_candidate(contact);
        }
    }

    /// Visit the closest unqueried candidates, keeping at most `alpha` requests inflight.
    fn visit_closest(&mut self, socket: &mut RpcSocket) {
        let live: Vec<&Contact> = self
            .candidates
            .contacts()
            .iter()
            .filter(|contact| !self.failed.contains(contact.id()))
            .take(self.params.k)
            .collect();

        let converged = live
            .iter()
            .take(self.params.beta)
            .all(|contact| self.queried.contains(contact.id()));

        if converged {
            return;
        }

        let budget = (self.params.max_rounds * self.params.alpha).saturating_sub(self.sent);
        let slots = self
            .params
            .alpha
            .saturating_sub(self.inflight_requests.len())
            .min(budget);

        let to_visit: Vec<Contact> = live
            .into_iter()
            .filter(|contact| !self.queried.contains(contact.id()))
            .take(slots)
            .cloned()
            .collect();

        for contact in to_visit {
            self.visit(socket, &contact);
        }
    }

    fn visit(&mut self, socket: &mut RpcSocket, contact: &Contact) {
        let tid = socket.request(
            contact.address(),
            Some(*contact.id()),
            RequestSpecific {
                requester: self.requester.clone(),
                request_type: self.request.clone().into(),
            },
            self.params.timeout,
        );

        self.inflight_requests.insert(tid, *contact.id());
        self.queried.insert(*contact.id());
        self.sent += 1;
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use crate::actor::MemoryNetwork;
    use crate::common::{
        FindNodeRequestArguments, FindNodeResponseArguments, FindValueRequestArguments,
        FindValueResponseArguments, MessageType, ResponseSpecific,
    };

    use super::*;

    fn id(last_byte: u8) -> Id {
        let mut bytes = [0; 20];
        bytes[19] = last_byte;
        Id::from(bytes)
    }

    fn contact(last_byte: u8) -> Contact {
        Contact::new(id(last_byte), SocketAddr::from(([127, 0, 0, 1], 20_000 + last_byte as u16)))
    }

    fn find_node(target: Id, params: LookupParams) -> IterativeQuery {
        IterativeQuery::new(
            Originator::new(id(255)),
            GetRequestSpecific::FindNode(FindNodeRequestArguments { target }),
            params,
        )
    }

    fn respond_all(query: &mut IterativeQuery, nodes: &HashMap<Id, Vec<Contact>>) {
        let inflight: Vec<(u32, Id)> = query
            .inflight_requests
            .iter()
            .map(|(tid, id)| (*tid, *id))
            .collect();

        for (tid, id) in inflight {
            let from = query
                .candidates
                .contacts()
                .iter()
                .find(|c| *c.id() == id)
                .cloned()
                .unwrap();

            query.response(
                tid,
                from,
                ResponseTypeSpecific::FindNode(FindNodeResponseArguments {
                    nodes: nodes.get(&id).cloned().unwrap_or_default(),
                }),
            );
        }
    }

    #[test]
    fn closest_responders_sorted() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));

        let mut query = find_node(id(0), LookupParams::default());

        for last_byte in [5, 9, 2, 7] {
            query.add_candidate(contact(last_byte));
        }

        query.start(&mut socket);
        // Never more than alpha inflight
        assert_eq!(query.inflight_requests.len(), DEFAULT_ALPHA);

        while !query.tick(&mut socket) {
            respond_all(&mut query, &HashMap::new());
        }

        let closest: Vec<Id> = query.result().closest.iter().map(|c| *c.id()).collect();

        assert_eq!(closest, vec![id(2), id(5), id(7), id(9)]);
    }

    #[test]
    fn discovers_closer_contacts() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));

        let mut query = find_node(id(0), LookupParams::default());
        query.add_candidate(contact(100));

        let mut nodes = HashMap::new();
        nodes.insert(id(100), vec![contact(50), contact(20)]);
        nodes.insert(id(20), vec![contact(1), contact(100)]);

        query.start(&mut socket);

        while !query.tick(&mut socket) {
            respond_all(&mut query, &nodes);
        }

        let closest: Vec<Id> = query.result().closest.iter().map(|c| *c.id()).collect();

        assert_eq!(closest, vec![id(1), id(20), id(50), id(100)]);
    }

    #[test]
    fn unresponsive_contacts_do_not_abort() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));

        let mut query = find_node(
            id(0),
            LookupParams {
                timeout: Duration::ZERO,
                ..Default::default()
            },
        );

        for last_byte in 1..=5 {
            query.add_candidate(contact(last_byte));
        }

        query.start(&mut socket);

        while !query.tick(&mut socket) {
            socket.expire();
        }

        assert_eq!(query.failed.len(), 5);
        assert!(query.result().closest.is_empty());
    }

    #[test]
    fn converges_on_beta_closest() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));

        let mut query = find_node(
            id(0),
            LookupParams {
                k: 4,
                alpha: 1,
                beta: 2,
                ..Default::default()
            },
        );

        for last_byte in 1..=4 {
            query.add_candidate(contact(last_byte));
        }

        query.start(&mut socket);

        while !query.tick(&mut socket) {
            respond_all(&mut query, &HashMap::new());
        }

        assert_eq!(query.sent, 2);
    }

    #[test]
    fn round_budget() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));

        let mut query = find_node(
            id(0),
            LookupParams {
                alpha: 2,
                max_rounds: 2,
                ..Default::default()
            },
        );

        for last_byte in 1..=10 {
            query.add_candidate(contact(last_byte));
        }

        query.start(&mut socket);

        while !query.tick(&mut socket) {
            respond_all(&mut query, &HashMap::new());
        }

        assert_eq!(query.sent, 4);
    }

    #[test]
    fn find_value_short_circuits() {
        let network = MemoryNetwork::new();
        let mut socket = RpcSocket::new(Box::new(network.bind(None).unwrap()));
        let mut responder = RpcSocket::new(Box::new(
            network.bind(Some(contact(1).address().port())).unwrap(),
        ));
        let signer = ed25519_dalek::SigningKey::from_bytes(&rand::random());
        let value = SignedValue::new(&signer, b"value");

        let mut query = IterativeQuery::new(
            Originator::new(id(255)),
            GetRequestSpecific::FindValue(FindValueRequestArguments { key: id(0) }),
            LookupParams::default(),
        );

        for last_byte in 1..=5 {
            query.add_candidate(contact(last_byte));
        }

        query.start(&mut socket);
        assert_eq!(socket.inflight_count(), DEFAULT_ALPHA);

        let (request, from) = responder.recv_from().unwrap();
        responder.response(
            from,
            request.transaction_id,
            ResponseSpecific {
                responder: Originator::new(id(1)),
                response_type: ResponseTypeSpecific::FindValue(FindValueResponseArguments {
                    values: vec![value.clone()],
                    nodes: vec![],
                }),
            },
            Duration::from_secs(1),
        );

        let (message, from) = socket.recv_from().unwrap();
        let MessageType::Response(response) = message.message_type else {
            panic!("expected a response");
        };

        query.response(
            message.transaction_id,
            response.responder.to_contact(from),
            response.response_type,
        );

        assert!(query.tick(&mut socket));
        assert_eq!(query.result().values, vec![value]);
        assert!(query.inflight_requests.is_empty());
        assert_eq!(socket.inflight_count(), 0);
    }

    #[test]
    fn ignores_requester() {
        let mut query = find_node(id(0), LookupParams::default());

        query.add_candidate(contact(255));

        assert!(query.candidates().is_empty());
    }
}
