use std::net::SocketAddr;
use std::time::Duration;

use ed25519_dalek::SigningKey;

use crate::common::{Id, NatType, DEFAULT_FAILED_RPC_TOLERANCE, MAX_BUCKET_SIZE_K};
use crate::core::downlist::DEFAULT_DOWNLIST_INTERVAL;
use crate::core::iterative_query::{
    LookupParams, DEFAULT_ALPHA, DEFAULT_BETA, DEFAULT_MAX_ROUNDS,
};
use crate::core::put_query::DEFAULT_MIN_SUCCESSFUL_STORE_RATIO;
use crate::core::routing_maintenance::{DEFAULT_MEAN_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL};
use crate::core::value_store::MAX_STORED_KEYS;

use super::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone)]
/// Dht Configurations
pub struct Config {
    /// Maximum number of contacts per bucket, and number of closest nodes
    /// records are replicated at.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub k: usize,
    /// Maximum number of concurrent requests per lookup.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// A lookup converges once the `beta` closest candidates responded or failed.
    ///
    /// Clamped to `k`, defaults to [DEFAULT_BETA]
    pub beta: usize,
    /// A lookup sends at most `max_rounds * alpha` requests.
    ///
    /// Defaults to [DEFAULT_MAX_ROUNDS]
    pub max_rounds: usize,
    /// Ratio of contacted nodes that must accept a store, delete or update.
    ///
    /// Defaults to [DEFAULT_MIN_SUCCESSFUL_STORE_RATIO]
    pub min_successful_store_ratio: f64,
    /// Consecutive failed requests before a contact is considered stale.
    ///
    /// Defaults to [DEFAULT_FAILED_RPC_TOLERANCE]
    pub failed_rpc_tolerance: u16,
    /// Request timeout duration.
    ///
    /// The longer this duration is, the longer queries take until they are deemeed "done".
    /// The shorter this duration is, the more responses from busy nodes we miss out on,
    /// which affects the accuracy of queries trying to find closest nodes to a target.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Buckets not touched within this window get refreshed.
    ///
    /// Defaults to [DEFAULT_MEAN_REFRESH_INTERVAL]
    pub mean_refresh_interval: Duration,
    /// How often the actor looks for buckets to refresh, `None` disables automatic refresh.
    ///
    /// Defaults to [DEFAULT_REFRESH_INTERVAL]
    pub refresh_interval: Option<Duration>,
    /// How often the local downlist batch is gossiped.
    ///
    /// Defaults to [DEFAULT_DOWNLIST_INTERVAL]
    pub downlist_interval: Duration,
    /// Maximum number of keys stored locally.
    ///
    /// Defaults to [MAX_STORED_KEYS]
    pub max_stored_keys: usize,
    /// Explicit port to listen on.
    ///
    /// Defaults to None
    pub port: Option<u16>,
    /// NAT classification advertised to other nodes.
    pub nat_type: NatType,
    /// Endpoint advertised for nodes in the same local network.
    pub local_address: Option<SocketAddr>,
    /// Endpoint of a relay this node can be reached through.
    pub rendezvous_address: Option<SocketAddr>,
    /// Node identity, its public key is advertised and the node [Id] derived from it.
    ///
    /// Defaults to None
    pub signing_key: Option<SigningKey>,
    /// Explicit node [Id], overrides the one derived from [Config::signing_key].
    ///
    /// Defaults to None, where a random Id is generated.
    pub id: Option<Id>,
}

impl Config {
    /// The node Id this configuration resolves to.
    pub fn node_id(&self) -> Id {
        match (self.id, &self.signing_key) {
            (Some(id), _) => id,
            (None, Some(signing_key)) => {
                Id::from_public_key(&signing_key.verifying_key().to_bytes())
            }
            (None, None) => Id::random(),
        }
    }

    pub fn lookup_params(&self) -> LookupParams {
        LookupParams {
            k: self.k,
            alpha: self.alpha,
            beta: self.beta.min(self.k),
            max_rounds: self.max_rounds,
            timeout: self.request_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: MAX_BUCKET_SIZE_K,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            max_rounds: DEFAULT_MAX_ROUNDS,
            min_successful_store_ratio: DEFAULT_MIN_SUCCESSFUL_STORE_RATIO,
            failed_rpc_tolerance: DEFAULT_FAILED_RPC_TOLERANCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            mean_refresh_interval: DEFAULT_MEAN_REFRESH_INTERVAL,
            refresh_interval: Some(DEFAULT_REFRESH_INTERVAL),
            downlist_interval: DEFAULT_DOWNLIST_INTERVAL,
            max_stored_keys: MAX_STORED_KEYS,
            port: None,
            nat_type: NatType::default(),
            local_address: None,
            rendezvous_address: None,
            signing_key: None,
            id: None,
        }
    }
}
