use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::common::{ErrorSpecific, Id, ResponseSpecific};

#[derive(Debug, Clone, PartialEq)]
/// How a pending call was settled.
pub enum CallOutcome {
    Response(ResponseSpecific),
    Error(ErrorSpecific),
    Timeout,
    Cancelled,
}

impl CallOutcome {
    pub fn into_result(self) -> Result<ResponseSpecific, RpcError> {
        match self {
            CallOutcome::Response(response) => Ok(response),
            CallOutcome::Error(error) => Err(RpcError::ErrorResponse(error)),
            CallOutcome::Timeout => Err(RpcError::Timeout),
            CallOutcome::Cancelled => Err(RpcError::Cancelled),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors of a single remote procedure call.
pub enum RpcError {
    #[error("Request timed out")]
    Timeout,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Error response: {0:?}")]
    ErrorResponse(ErrorSpecific),

    /// No contact with the requested Id could be found.
    #[error("Contact not found")]
    NotFound,
}

#[derive(Debug, Clone)]
pub struct InflightRequest {
    pub to: SocketAddr,
    /// Id of the contact this request was sent to, if known.
    pub to_id: Option<Id>,
    pub sent_at: Instant,
    pub deadline: Instant,
    completion: Option<flume::Sender<CallOutcome>>,
}

impl InflightRequest {
    pub fn does_match(&self, from: &SocketAddr) -> bool {
        if self.to.port() != from.port() {
            return false;
        }

        if self.to.ip().is_unspecified() {
            return true;
        }

        self.to.ip() == from.ip()
    }

    pub(crate) fn complete(self, outcome: CallOutcome) {
        if let Some(completion) = self.completion {
            // Caller may have stopped waiting
            let _ = completion.send(outcome);
        }
    }
}

#[derive(Debug, Default)]
pub struct InflightRequests {
    requests: HashMap<u32, InflightRequest>,
}

impl InflightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new inflight request O(1) amortized
    pub fn add(
        &mut self,
        transaction_id: u32,
        to: SocketAddr,
        to_id: Option<Id>,
        timeout: Duration,
        completion: Option<flume::Sender<CallOutcome>>,
    ) {
        let sent_at = Instant::now();

        self.requests.insert(
            transaction_id,
            InflightRequest {
                to,
                to_id,
                sent_at,
                deadline: sent_at + timeout,
                completion,
            },
        );
    }

    /// Check if a transaction_id is still inflight and not expired O(1)
    pub fn contains(&self, transaction_id: u32) -> bool {
        self.requests
            .get(&transaction_id)
            .map(|request| Instant::now() < request.deadline)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove inflight request by transaction_id if it exists and matches the address
    /// O(1) amortized
    pub fn remove(&mut self, transaction_id: u32, from: &SocketAddr) -> Option<InflightRequest> {
        let request = self.requests.get(&transaction_id)?;

        if Instant::now() >= request.deadline {
            // Leave it to `expire` so the timeout gets reported.
            return None;
        }

        if !request.does_match(from) {
            return None;
        }

        self.requests.remove(&transaction_id)
    }

    /// Remove inflight request by transaction_id regardless of its address.
    pub fn take(&mut self, transaction_id: u32) -> Option<InflightRequest> {
        self.requests.remove(&transaction_id)
    }

    /// Remove and return all requests past their deadline.
    pub fn expire(&mut self, now: Instant) -> Vec<(u32, InflightRequest)> {
        let expired: Vec<u32> = self
            .requests
            .iter()
            .filter(|(_, request)| now >= request.deadline)
            .map(|(tid, _)| *tid)
            .collect();

        expired
            .into_iter()
            .filter_map(|tid| self.requests.remove(&tid).map(|request| (tid, request)))
            .collect()
    }

    /// Remove all requests.
    pub fn drain(&mut self) -> Vec<(u32, InflightRequest)> {
        self.requests.drain().collect()
    }
}
