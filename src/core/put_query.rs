use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    actor::RpcSocket,
    common::{
        Contact, ErrorSpecific, Id, Originator, PutRequestSpecific, PutResponseArguments,
        Rejection, RequestSpecific, ResponseTypeSpecific,
    },
};

/// Default ratio of contacted nodes that must accept a STORE, DELETE or UPDATE.
pub const DEFAULT_MIN_SUCCESSFUL_STORE_RATIO: f64 = 0.8;

/// Number of accepting nodes required out of `contacted` for a put to succeed.
///
/// `max(1, floor(contacted * ratio))`
pub fn quorum(contacted: usize, ratio: f64) -> usize {
    let ratio = ratio.clamp(0.0, 1.0);

    // Tolerate float error, so 5 * 0.8 is 4 and not 3.
    ((contacted as f64 * ratio + 1e-9).floor() as usize).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a successful [PutQuery].
pub struct PutSummary {
    /// Nodes that accepted the request.
    pub accepted: usize,
    /// Nodes the request was sent to.
    pub contacted: usize,
}

#[derive(Debug)]
/// Once an [super::IterativeQuery] found the closest nodes to a key, the
/// [PutRequestSpecific] is sent to each of them, and this query keeps track of
/// accepting nodes, rejections and errors.
pub struct PutQuery {
    key: Id,
    request: PutRequestSpecific,
    min_successful_ratio: f64,
    timeout: Duration,

    inflight_requests: HashMap<u32, Id>,
    contacted: usize,
    /// Nodes that accepted the request
    accepted_at: Vec<Id>,
    rejections: Vec<(Id, Option<Rejection>)>,
    errors: Vec<ErrorSpecific>,
    started: bool,
}

impl PutQuery {
    pub fn new(request: PutRequestSpecific, min_successful_ratio: f64, timeout: Duration) -> Self {
        Self {
            key: *request.key(),
            request,
            min_successful_ratio,
            timeout,

            inflight_requests: HashMap::new(),
            contacted: 0,
            accepted_at: Vec::new(),
            rejections: Vec::new(),
            errors: Vec::new(),
            started: false,
        }
    }

    // === Getters ===

    pub fn key(&self) -> &Id {
        &self.key
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn inflight(&self, tid: u32) -> bool {
        self.inflight_requests.contains_key(&tid)
    }

    pub fn request(&self) -> &PutRequestSpecific {
        &self.request
    }

    pub fn required(&self) -> usize {
        quorum(self.contacted, self.min_successful_ratio)
    }

    // === Public Methods ===

    /// Send the request to each of the `contacts` closest to the key.
    ///
    /// `local` is the outcome of applying the request to this node's own records,
    /// when this node is one of the closest nodes to the key. It counts as a
    /// contacted node like any other.
    pub fn start(
        &mut self,
        socket: &mut RpcSocket,
        requester: &Originator,
        contacts: &[Contact],
        local: Option<Result<ResponseTypeSpecific, ErrorSpecific>>,
    ) -> Result<(), PutError> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let key = self.key;
        trace!(?key, contacts = contacts.len(), local = local.is_some(), "PutQuery start");

        if contacts.is_empty() && local.is_none() {
            Err(PutError::NoClosestNodes)?;
        }

        for contact in contacts {
            let tid = socket.request(
                contact.address(),
                Some(*contact.id()),
                RequestSpecific {
                    requester: requester.clone(),
                    request_type: self.request.clone().into(),
                },
                self.timeout,
            );

            self.inflight_requests.insert(tid, *contact.id());
        }

        self.contacted = contacts.len();

        if let Some(outcome) = local {
            self.contacted += 1;
            self.settle(requester.id, outcome);
        }

        Ok(())
    }

    /// Handle the response or error response to one of this query's requests.
    pub fn response(&mut self, tid: u32, response: Result<ResponseTypeSpecific, ErrorSpecific>) {
        if let Some(id) = self.inflight_requests.remove(&tid) {
            self.settle(id, response);
        }
    }

    /// Cancel all inflight requests of this query.
    pub fn cancel(&mut self, socket: &mut RpcSocket) {
        for tid in self.inflight_requests.keys() {
            socket.cancel(*tid);
        }
        self.inflight_requests.clear();
    }

    /// Check if the query is done, returning its summary or error if so.
    pub fn tick(&mut self, socket: &RpcSocket) -> Result<Option<PutSummary>, PutError> {
        // Didn't start yet.
        if !self.started {
            return Ok(None);
        }

        // Requests that timed out or got cancelled.
        self.inflight_requests.retain(|tid, _| socket.inflight(tid));

        if !self.inflight_requests.is_empty() {
            return Ok(None);
        }

        let key = self.key;
        let accepted = self.accepted_at.len();
        let required = self.required();

        if accepted >= required {
            debug!(?key, accepted, contacted = self.contacted, "PutQuery done successfully");

            return Ok(Some(PutSummary {
                accepted,
                contacted: self.contacted,
            }));
        }

        debug!(
            ?key,
            accepted,
            required,
            rejections = ?self.rejections,
            errors = ?self.errors,
            "PutQuery failed"
        );

        if accepted == 0
            && self
                .rejections
                .iter()
                .any(|(_, rejection)| *rejection == Some(Rejection::InvalidSignature))
        {
            return Err(PutError::InvalidSignature);
        }

        Err(PutError::QuorumNotReached { accepted, required })
    }

    // === Private Methods ===

    fn settle(&mut self, id: Id, response: Result<ResponseTypeSpecific, ErrorSpecific>) {
        let key = self.key;

        match response {
            Ok(ResponseTypeSpecific::Put(PutResponseArguments { accepted: true, .. })) => {
                debug!(?key, ?id, "PutQuery got success response");
                self.accepted_at.push(id);
            }
            Ok(ResponseTypeSpecific::Put(PutResponseArguments { rejection, .. })) => {
                debug!(?key, ?id, ?rejection, "PutQuery got rejected");
                self.rejections.push((id, rejection));
            }
            Ok(response_type) => {
                debug!(?key, ?id, method = response_type.method(), "PutQuery got unexpected response");
                self.errors.push(ErrorSpecific {
                    code: 203,
                    description: format!("Unexpected {} response", response_type.method()),
                });
            }
            Err(error) => {
                debug!(?key, ?id, ?error, "PutQuery got error");
                self.errors.push(error);
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Put query errors
pub enum PutError {
    /// Failed to find any nodes close, usually means the node failed to bootstrap,
    /// so the routing table is empty.
    #[error("Failed to find any nodes close to store value at")]
    NoClosestNodes,

    /// Not enough of the closest nodes accepted the request.
    #[error("Quorum not reached: {accepted} nodes accepted, {required} required")]
    QuorumNotReached { accepted: usize, required: usize },

    /// No node accepted the request, and some rejected its signature.
    #[error("Request was rejected for an invalid signature")]
    InvalidSignature,
}
