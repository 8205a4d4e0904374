//! Local store of signed records, bounded and expiring.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::common::{Id, SignedValue};

/// Default maximum number of keys to store records for.
pub const MAX_STORED_KEYS: usize = 1000;

#[derive(Debug, Clone)]
struct StoredRecord {
    value: SignedValue,
    /// Public key of the signer allowed to delete or update this record.
    public_key: [u8; 32],
    expires_at: Instant,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a record could not be deleted or updated.
pub enum RecordError {
    /// No live record with this value under this key.
    NotFound,
    /// The record was stored by another signer.
    Unauthorized,
}

#[derive(Debug)]
/// Records indexed by key, multiple values per key.
pub struct ValueStore {
    records: LruCache<Id, Vec<StoredRecord>>,
}

impl ValueStore {
    pub fn new(max_keys: usize) -> Self {
        Self {
            records: LruCache::new(
                NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }

    // === Getters ===

    /// Number of keys with at least one record, including expired records not yet purged.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // === Public Methods ===

    /// Store a value under a key, refreshing the expiry if the same value is
    /// already stored.
    pub fn store(&mut self, key: Id, value: SignedValue, public_key: [u8; 32], ttl: Duration) {
        let now = Instant::now();
        let expires_at = now + ttl;

        let records = self.records.get_or_insert_mut(key, Vec::new);
        records.retain(|record| !record.is_expired(now));

        match records.iter_mut().find(|record| record.value == value) {
            Some(existing) => {
                existing.public_key = public_key;
                existing.expires_at = expires_at;
            }
            None => records.push(StoredRecord {
                value,
                public_key,
                expires_at,
            }),
        }
    }

    /// Live values stored under a key.
    pub fn get(&mut self, key: &Id) -> Vec<SignedValue> {
        let now = Instant::now();

        let Some(records) = self.records.get_mut(key) else {
            return vec![];
        };

        records.retain(|record| !record.is_expired(now));

        let values = records.iter().map(|record| record.value.clone()).collect();

        if records.is_empty() {
            self.records.pop(key);
        }

        values
    }

    /// Delete a record if it was stored by the owner of `public_key`.
    pub fn delete(
        &mut self,
        key: &Id,
        value: &SignedValue,
        public_key: &[u8; 32],
    ) -> Result<(), RecordError> {
        let now = Instant::now();

        let records = self.records.get_mut(key).ok_or(RecordError::NotFound)?;

        let position = records
            .iter()
            .position(|record| !record.is_expired(now) && record.value == *value)
            .ok_or(RecordError::NotFound)?;

        if records[position].public_key != *public_key {
            return Err(RecordError::Unauthorized);
        }

        records.remove(position);

        if records.is_empty() {
            self.records.pop(key);
        }

        Ok(())
    }

    /// Replace `old` with `new` if `old` is still stored and was stored by the
    /// owner of `public_key`, leaving the records untouched otherwise.
    pub fn update(
        &mut self,
        key: &Id,
        old: &SignedValue,
        new: SignedValue,
        public_key: &[u8; 32],
        ttl: Duration,
    ) -> Result<(), RecordError> {
        let now = Instant::now();

        let records = self.records.get_mut(key).ok_or(RecordError::NotFound)?;

        let position = records
            .iter()
            .position(|record| !record.is_expired(now) && record.value == *old)
            .ok_or(RecordError::NotFound)?;

        if records[position].public_key != *public_key {
            return Err(RecordError::Unauthorized);
        }

        // Avoid duplicates if `new` is already stored.
        records.retain(|record| record.value != new || record.value == *old);

        if let Some(record) = records.iter_mut().find(|record| record.value == *old) {
            record.value = new;
            record.expires_at = now + ttl;
        }

        Ok(())
    }

    /// Drop all expired records.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        let mut empty_keys = vec![];

        for (key, records) in self.records.iter_mut() {
            let before = records.len();
            records.retain(|record| !record.is_expired(now));
            purged += before - records.len();

            if records.is_empty() {
                empty_keys.push(*key);
            }
        }

        for key in empty_keys {
            self.records.pop(&key);
        }

        purged
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
