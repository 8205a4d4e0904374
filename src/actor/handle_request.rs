use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::common::{Id, RequestSpecific, RequestTypeSpecific, ResponseSpecific};
use crate::core::downlist::Probe;

use super::{Actor, NodeState};

impl Actor {
    /// Handle an inbound request: learn the requester, confirm downlisted ids,
    /// and answer with the server's response.
    pub(super) fn handle_request(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
    ) {
        if self.state == NodeState::NotJoined {
            trace!(?from, "Ignoring request, node is not joined");
            return;
        }

        let requester_id = request.requester.id;

        if requester_id == *self.id() {
            trace!(?from, "Ignoring request from a node with our own id");
            return;
        }

        // The requester reached us, so it is alive.
        self.add_contact(request.requester.to_contact(from));

        if let RequestTypeSpecific::Downlist(args) = &request.request_type {
            self.confirm_downlist(&args.ids, &requester_id);
        }

        let local = self.local_contact();

        let (result, timeout) =
            self.server
                .handle_request(&self.routing_table, &local, from, request);

        match result {
            Ok(response_type) => self.socket.response(
                from,
                transaction_id,
                ResponseSpecific {
                    responder: self.originator.clone(),
                    response_type,
                },
                timeout,
            ),
            Err(error) => {
                debug!(?from, ?error, "Responding with an error");

                self.socket.error(from, transaction_id, error)
            }
        }
    }

    /// Remove the downlisted contacts we consider stale ourselves, and probe the others.
    fn confirm_downlist(&mut self, ids: &[Id], reporter: &Id) {
        let tolerance = self.routing_table.failed_rpc_tolerance();

        for id in ids {
            if id == self.id() || id == reporter {
                continue;
            }

            let Some(contact) = self.routing_table.get(id) else {
                // Unknown ids are ignored.
                continue;
            };

            if contact.is_stale(tolerance) {
                self.routing_table.remove(id);
                debug!(?id, ?reporter, "Removed downlisted contact");

                continue;
            }

            if self.downlist.is_probing(id) {
                continue;
            }

            let address = contact.address();
            let request = self.request(RequestTypeSpecific::Ping);

            let tid = self
                .socket
                .request(address, Some(*id), request, self.config.request_timeout);

            self.downlist.add_probe(tid, Probe::Downlist(*id));
        }
    }
}
