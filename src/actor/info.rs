use std::net::SocketAddr;

use crate::Id;

use super::{Actor, NodeState};

/// Information about this node.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    local_addr: SocketAddr,
    state: NodeState,
    routing_table_size: usize,
    stored_keys: usize,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }
    /// Local socket address that this node is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    pub fn state(&self) -> NodeState {
        self.state
    }
    /// Number of contacts in the routing table.
    pub fn routing_table_size(&self) -> usize {
        self.routing_table_size
    }
    /// Number of keys with records stored at this node.
    pub fn stored_keys(&self) -> usize {
        self.stored_keys
    }
}

impl From<&Actor> for Info {
    fn from(actor: &Actor) -> Self {
        Self {
            id: *actor.id(),
            local_addr: actor.local_addr(),
            state: actor.state(),
            routing_table_size: actor.routing_table().size(),
            stored_keys: actor.stored_keys(),
        }
    }
}
