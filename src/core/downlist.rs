//! Dead contact tracking and the DOWNLIST gossip batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::common::{Contact, Id};

/// Default interval between DOWNLIST gossips.
pub const DEFAULT_DOWNLIST_INTERVAL: Duration = Duration::from_secs(30);
/// Maximum number of ids sent in one DOWNLIST.
pub const MAX_DOWNLIST_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
/// A liveness ping whose outcome decides an eviction.
pub enum Probe {
    /// Another node reported this contact dead, a timeout confirms it.
    Downlist(Id),
    /// `oldest` blocks `candidate` from a full bucket, a timeout replaces it.
    Replacement { oldest: Id, candidate: Contact },
}

impl Probe {
    /// Id of the probed contact.
    pub fn target(&self) -> &Id {
        match self {
            Probe::Downlist(id) => id,
            Probe::Replacement { oldest, .. } => oldest,
        }
    }
}

#[derive(Debug)]
/// Local downlist batch and the probes confirming evictions.
pub struct Downlist {
    suspects: Vec<Id>,
    last_gossip: Instant,
    probes: HashMap<u32, Probe>,
}

impl Downlist {
    pub fn new() -> Self {
        Self {
            suspects: Vec::new(),
            last_gossip: Instant::now(),
            probes: HashMap::new(),
        }
    }

    // === Getters ===

    pub fn suspects(&self) -> &[Id] {
        &self.suspects
    }

    pub fn probes_count(&self) -> usize {
        self.probes.len()
    }

    /// Returns true if a probe is already deciding whether `oldest` gets replaced.
    pub fn has_replacement_probe_for(&self, oldest: &Id) -> bool {
        self.probes
            .values()
            .any(|probe| matches!(probe, Probe::Replacement { oldest: id, .. } if id == oldest))
    }

    /// Returns true if any probe targets `id`.
    pub fn is_probing(&self, id: &Id) -> bool {
        self.probes.values().any(|probe| probe.target() == id)
    }

    // === Public Methods ===

    /// Add a contact that reached the failed rpc tolerance to the next batch.
    pub fn suspect(&mut self, id: Id) {
        if !self.suspects.contains(&id) {
            self.suspects.push(id);
        }

        if self.suspects.len() > MAX_DOWNLIST_BATCH {
            self.suspects.remove(0);
        }
    }

    /// Forget a suspect that proved to be alive.
    pub fn acquit(&mut self, id: &Id) {
        self.suspects.retain(|suspect| suspect != id);
    }

    /// Take the current batch if the gossip `interval` elapsed.
    ///
    /// The gossip timer resets whenever the interval elapsed, even with an empty batch.
    pub fn take_batch(&mut self, interval: Duration) -> Option<Vec<Id>> {
        self.take_batch_at(Instant::now(), interval)
    }

    pub(crate) fn take_batch_at(&mut self, now: Instant, interval: Duration) -> Option<Vec<Id>> {
        if now.saturating_duration_since(self.last_gossip) < interval {
            return None;
        }

        self.last_gossip = now;

        if self.suspects.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.suspects))
    }

    pub fn add_probe(&mut self, tid: u32, probe: Probe) {
        self.probes.insert(tid, probe);
    }

    pub fn take_probe(&mut self, tid: u32) -> Option<Probe> {
        self.probes.remove(&tid)
    }

    pub fn clear(&mut self) {
        self.suspects.clear();
        self.probes.clear();
    }
}

impl Default for Downlist {
    fn default() -> Self {
        Self::new()
    }
}
