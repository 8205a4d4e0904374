use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::common::{ErrorSpecific, ResponseSpecific};

use super::{Actor, NodeState};

impl Actor {
    /// Handle an inbound response the socket matched to one of our requests:
    /// learn the responder, then settle the probe or query that sent the request.
    pub(super) fn handle_response(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        response: ResponseSpecific,
    ) {
        let contact = response.responder.to_contact(from);

        if self.state != NodeState::NotJoined {
            self.add_contact(contact.clone());
        }

        if let Some(probe) = self.downlist.take_probe(transaction_id) {
            debug!(id = ?probe.target(), "Probed contact is alive");
            return;
        }

        if let Some(query) = self
            .put_queries
            .values_mut()
            .find(|query| query.inflight(transaction_id))
        {
            query.response(transaction_id, Ok(response.response_type));

            return;
        }

        if let Some(query) = self
            .iterative_queries
            .values_mut()
            .find(|query| query.inflight(transaction_id))
        {
            query.response(transaction_id, contact, response.response_type);

            return;
        }

        trace!(?from, transaction_id, "Response to a direct call");
    }

    /// Handle an inbound error response, the responder is alive but refused the request.
    pub(super) fn handle_error(&mut self, from: SocketAddr, transaction_id: u32, error: ErrorSpecific) {
        debug!(?from, ?error, "Received error response");

        if let Some(probe) = self.downlist.take_probe(transaction_id) {
            debug!(id = ?probe.target(), "Probed contact is alive");
            return;
        }

        if let Some(query) = self
            .put_queries
            .values_mut()
            .find(|query| query.inflight(transaction_id))
        {
            query.response(transaction_id, Err(error));
            return;
        }

        if let Some(query) = self
            .iterative_queries
            .values_mut()
            .find(|query| query.inflight(transaction_id))
        {
            query.error(transaction_id);
        }
    }
}
