//! Kademlia routing table with lazily splitting k-buckets

use std::slice::Iter;
use std::time::{Duration, Instant};

use rand::{seq::SliceRandom, Rng};

use crate::common::{ClosestContacts, Contact, Id, MAX_DISTANCE};

/// K = the default maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 20;
/// Default number of consecutive failed RPCs before a contact is considered stale.
pub const DEFAULT_FAILED_RPC_TOLERANCE: u16 = 2;

#[derive(Debug, Clone, PartialEq)]
/// Result of [RoutingTable::add].
pub enum AddOutcome {
    /// The contact was inserted into a bucket with free space.
    Added,
    /// The contact was already known, and got moved to the most recently seen position.
    Updated,
    /// The bucket was full, and a stale contact was evicted to make room.
    Replaced { evicted: Contact },
    /// The bucket is full of responsive contacts and can not be split.
    ///
    /// The `oldest` contact should be pinged, and replaced by the `candidate`
    /// with [RoutingTable::replace] if it doesn't respond.
    Full { oldest: Contact, candidate: Contact },
    /// The contact has the same Id as this table.
    Rejected,
}

#[derive(Debug, Clone)]
/// Kademlia routing table
pub struct RoutingTable {
    id: Id,
    k: usize,
    failed_rpc_tolerance: u16,
    /// Buckets sorted by ascending distance, the first one always covers the
    /// closest distances and is the only one allowed to split.
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id.
    pub fn new(id: Id) -> Self {
        RoutingTable::with_params(id, MAX_BUCKET_SIZE_K, DEFAULT_FAILED_RPC_TOLERANCE)
    }

    /// Create a new [RoutingTable] with a custom bucket size and failed RPC tolerance.
    pub fn with_params(id: Id, k: usize, failed_rpc_tolerance: u16) -> Self {
        RoutingTable {
            id,
            k: k.max(1),
            failed_rpc_tolerance: failed_rpc_tolerance.max(1),
            buckets: vec![KBucket::new(1, MAX_DISTANCE, k)],
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Maximum number of contacts per bucket.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn failed_rpc_tolerance(&self) -> u16 {
        self.failed_rpc_tolerance
    }

    pub fn buckets(&self) -> &[KBucket] {
        &self.buckets
    }

    // === Public Methods ===

    /// Attempts to add a contact to this routing table.
    ///
    /// Known contacts are updated and moved to the tail of their bucket.
    pub fn add(&mut self, contact: Contact) -> AddOutcome {
        let class = self.id.distance_class(contact.id());

        if class == 0 {
            // Do not add self to the routing_table
            return AddOutcome::Rejected;
        }

        loop {
            let index = self.bucket_index(class);

            let bucket = &mut self.buckets[index];

            if let Some(position) = bucket.position(contact.id()) {
                bucket.contacts.remove(position);
                bucket.push(contact);

                return AddOutcome::Updated;
            }

            if bucket.contacts.len() < self.k {
                bucket.push(contact);

                return AddOutcome::Added;
            }

            if index == 0 && bucket.max > 1 {
                self.split_closest_bucket();
                continue;
            }

            let tolerance = self.failed_rpc_tolerance;

            if let Some(position) = bucket.contacts.iter().position(|c| c.is_stale(tolerance)) {
                let evicted = bucket.contacts.remove(position);
                bucket.push(contact);

                return AddOutcome::Replaced { evicted };
            }

            return AddOutcome::Full {
                oldest: bucket.contacts[0].clone(),
                candidate: contact,
            };
        }
    }

    /// Remove the contact with `old` id and add the `candidate` in its place.
    pub fn replace(&mut self, old: &Id, candidate: Contact) -> AddOutcome {
        self.remove(old);
        self.add(candidate)
    }

    /// Remove a contact from this routing table.
    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let class = self.id.distance_class(id);

        if class == 0 {
            return None;
        }

        let index = self.bucket_index(class);
        let bucket = &mut self.buckets[index];

        bucket
            .position(id)
            .map(|position| bucket.contacts.remove(position))
    }

    /// Increment the failed RPC counter of a known contact, returning the new count.
    pub fn record_failure(&mut self, id: &Id) -> Option<u16> {
        let index = self.index_of(id)?;

        self.buckets[index]
            .contacts
            .iter_mut()
            .find(|c| c.id() == id)
            .map(|contact| contact.mark_failed())
    }

    pub fn get(&self, id: &Id) -> Option<&Contact> {
        let index = self.index_of(id)?;

        self.buckets[index].contacts.iter().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.get(id).is_some()
    }

    /// Return up to `count` contacts closest to the `target`, closest first,
    /// skipping any Id in `exclude`.
    pub fn closest(&self, target: &Id, count: usize, exclude: &[Id]) -> Vec<Contact> {
        self.collect_closest(target, count, exclude, |_| true)
    }

    /// Same as [Self::closest] but skips stale contacts.
    pub fn closest_live(&self, target: &Id, count: usize, exclude: &[Id]) -> Vec<Contact> {
        let tolerance = self.failed_rpc_tolerance;

        self.collect_closest(target, count, exclude, |c| !c.is_stale(tolerance))
    }

    /// Up to `count` random non-stale contacts, skipping any Id in `exclude`.
    pub fn random_contacts(&self, count: usize, exclude: &[Id]) -> Vec<Contact> {
        let tolerance = self.failed_rpc_tolerance;

        let candidates: Vec<&Contact> = self
            .contacts()
            .filter(|c| !c.is_stale(tolerance) && !exclude.contains(c.id()))
            .collect();

        candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .map(|c| (*c).clone())
            .collect()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Returns an iterator over the contacts in this routing table.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Turn this routing table to a list of bootstrapping contacts.
    pub fn to_bootstrap(&self) -> Vec<Contact> {
        let tolerance = self.failed_rpc_tolerance;

        self.contacts()
            .filter(|c| !c.is_stale(tolerance))
            .cloned()
            .collect()
    }

    /// Drop all contacts and merge all buckets back into one.
    pub fn clear(&mut self) {
        self.buckets = vec![KBucket::new(1, MAX_DISTANCE, self.k)];
    }

    /// Random targets within every bucket that was not touched for `window`,
    /// marking these buckets as touched.
    pub fn refresh_targets(&mut self, window: Duration) -> Vec<Id> {
        self.refresh_targets_at(Instant::now(), window)
    }

    pub(crate) fn refresh_targets_at(&mut self, now: Instant, window: Duration) -> Vec<Id> {
        let id = self.id;
        let mut rng = rand::thread_rng();

        self.buckets
            .iter_mut()
            .filter(|bucket| now.saturating_duration_since(bucket.last_touched) >= window)
            .map(|bucket| {
                bucket.last_touched = now;

                id.random_at_distance(rng.gen_range(bucket.min..=bucket.max))
            })
            .collect()
    }

    // === Private Methods ===

    fn bucket_index(&self, class: u8) -> usize {
        self.buckets
            .iter()
            .position(|bucket| bucket.covers(class))
            // Buckets always cover 1..=160
            .unwrap_or(0)
    }

    fn index_of(&self, id: &Id) -> Option<usize> {
        let class = self.id.distance_class(id);

        if class == 0 {
            return None;
        }

        Some(self.bucket_index(class))
    }

    /// Split the closest bucket `[1, max]` into `[1, max - 1]` and `[max, max]`.
    fn split_closest_bucket(&mut self) {
        let id = self.id;
        let closest = &mut self.buckets[0];
        let far_class = closest.max;

        let (far, near): (Vec<Contact>, Vec<Contact>) = closest
            .contacts
            .drain(..)
            .partition(|c| id.distance_class(c.id()) == far_class);

        closest.contacts = near;
        closest.max = far_class - 1;

        let mut bucket = KBucket::new(far_class, far_class, self.k);
        bucket.contacts = far;
        bucket.last_touched = closest.last_touched;

        self.buckets.insert(1, bucket);
    }

    fn collect_closest(
        &self,
        target: &Id,
        count: usize,
        exclude: &[Id],
        filter: impl Fn(&Contact) -> bool,
    ) -> Vec<Contact> {
        let mut closest = ClosestContacts::new(*target);

        for contact in self.contacts() {
            if filter(contact) && !exclude.contains(contact.id()) {
                closest.add(contact.clone());
            }
        }

        closest.take(count)
    }
}

/// Kbuckets are similar to LRU caches that checks and evicts unresponsive contacts,
/// without dropping any responsive contacts in the process.
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Inclusive range of [Id::distance_class] covered by this bucket.
    min: u8,
    max: u8,
    /// Contacts in the k-bucket, sorted by the least recently seen.
    contacts: Vec<Contact>,
    last_touched: Instant,
}

impl KBucket {
    fn new(min: u8, max: u8, k: usize) -> Self {
        KBucket {
            min,
            max,
            contacts: Vec::with_capacity(k),
            last_touched: Instant::now(),
        }
    }

    // === Getters ===

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    // === Private Methods ===

    fn covers(&self, class: u8) -> bool {
        self.min <= class && class <= self.max
    }

    fn position(&self, id: &Id) -> Option<usize> {
        self.contacts.iter().position(|c| c.id() == id)
    }

    fn push(&mut self, contact: Contact) {
        self.contacts.push(contact);
        self.last_touched = Instant::now();
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use super::*;

    /// A contact at exactly `class` distance from `id`.
    fn contact_at(id: &Id, class: u8) -> Contact {
        Contact::random().with_id(id.random_at_distance(class))
    }

    #[test]
    fn table_is_empty() {
        let mut table = RoutingTable::new(Id::random());
        assert!(table.is_empty());

        table.add(Contact::random());
        assert!(!table.is_empty());
    }

    #[test]
    fn contains() {
        let mut table = RoutingTable::new(Id::random());

        let contact = Contact::random();

        assert!(!table.contains(contact.id()));

        table.add(contact.clone());
        assert!(table.contains(contact.id()));
    }

    #[test]
    fn remove() {
        let mut table = RoutingTable::new(Id::random());

        let contact = Contact::random();

        table.add(contact.clone());
        assert!(table.contains(contact.id()));

        assert_eq!(table.remove(contact.id()), Some(contact.clone()));
        assert!(!table.contains(contact.id()));
        assert_eq!(table.remove(contact.id()), None);
    }

    #[test]
    fn buckets_are_sets() {
        let mut table = RoutingTable::new(Id::random());

        let contact1 = Contact::random();
        let contact2 = Contact::new(*contact1.id(), SocketAddr::from(([127, 0, 0, 1], 1)));

        assert_eq!(table.add(contact1), AddOutcome::Added);
        assert_eq!(table.add(contact2.clone()), AddOutcome::Updated);

        assert_eq!(table.size(), 1);
        assert_eq!(
            table.get(contact2.id()).map(|c| c.address()),
            Some(contact2.address())
        );
    }

    #[test]
    fn should_not_add_self() {
        let mut table = RoutingTable::new(Id::random());
        let contact = Contact::random().with_id(*table.id());

        assert_eq!(table.add(contact), AddOutcome::Rejected);
        assert!(table.is_empty())
    }

    #[test]
    fn splits_closest_bucket() {
        let id = Id::random();
        let mut table = RoutingTable::with_params(id, 4, 2);

        for _ in 0..4 {
            table.add(contact_at(&id, 160));
        }
        assert_eq!(table.buckets().len(), 1);

        // Fifth contact forces a split of [1, 160] into [1, 159] and [160, 160]
        assert_eq!(table.add(contact_at(&id, 150)), AddOutcome::Added);

        assert_eq!(table.buckets().len(), 2);
        assert_eq!(
            (table.buckets()[0].min(), table.buckets()[0].max()),
            (1, 159)
        );
        assert_eq!(
            (table.buckets()[1].min(), table.buckets()[1].max()),
            (160, 160)
        );
        assert_eq!(table.buckets()[0].len(), 1);
        assert_eq!(table.buckets()[1].len(), 4);
        assert_eq!(table.size(), 5);
    }

    #[test]
    fn should_not_add_more_than_k() {
        let id = Id::random();
        let mut table = RoutingTable::with_params(id, 4, 2);

        for _ in 0..200 {
            table.add(Contact::random());
        }

        for bucket in table.buckets() {
            assert!(bucket.len() <= 4);
        }

        // Buckets must cover every distance class exactly once
        let mut expected_min = 1;
        for bucket in table.buckets() {
            assert_eq!(bucket.min(), expected_min);
            expected_min = bucket.max() + 1;
        }
        assert_eq!(expected_min as usize, MAX_DISTANCE as usize + 1);
    }

    #[test]
    fn full_bucket_reports_oldest() {
        let id = Id::random();
        let mut table = RoutingTable::with_params(id, 2, 2);

        let first = contact_at(&id, 160);
        let second = contact_at(&id, 160);
        table.add(first.clone());
        table.add(second);
        // Split the closest bucket away
        table.add(contact_at(&id, 10));

        let candidate = contact_at(&id, 160);

        match table.add(candidate.clone()) {
            AddOutcome::Full {
                oldest,
                candidate: returned,
            } => {
                assert_eq!(oldest.id(), first.id());
                assert_eq!(returned.id(), candidate.id());
            }
            outcome => panic!("expected full bucket, got {outcome:?}"),
        }

        assert!(!table.contains(candidate.id()));

        table.replace(first.id(), candidate.clone());

        assert!(table.contains(candidate.id()));
        assert!(!table.contains(first.id()));
    }

    #[test]
    fn stale_contacts_get_replaced() {
        let id = Id::random();
        let mut table = RoutingTable::with_params(id, 2, 2);

        let first = contact_at(&id, 160);
        let second = contact_at(&id, 160);
        table.add(first.clone());
        table.add(second.clone());
        table.add(contact_at(&id, 10));

        assert_eq!(table.record_failure(second.id()), Some(1));
        assert_eq!(table.record_failure(second.id()), Some(2));

        let candidate = contact_at(&id, 160);

        match table.add(candidate.clone()) {
            AddOutcome::Replaced { evicted } => assert_eq!(evicted.id(), second.id()),
            outcome => panic!("expected replacement, got {outcome:?}"),
        }

        assert!(table.contains(candidate.id()));
        assert!(table.contains(first.id()));
        assert!(!table.contains(second.id()));
    }

    #[test]
    fn seen_again_resets_failures() {
        let mut table = RoutingTable::new(Id::random());
        let contact = Contact::random();
        table.add(contact.clone());

        table.record_failure(contact.id());
        table.record_failure(contact.id());
        assert!(table.closest_live(contact.id(), 20, &[]).is_empty());

        assert_eq!(table.add(contact.clone()), AddOutcome::Updated);
        assert_eq!(table.get(contact.id()).map(|c| c.failed_rpcs()), Some(0));
        assert_eq!(table.closest_live(contact.id(), 20, &[]).len(), 1);

        assert_eq!(table.record_failure(&Id::random()), None);
    }

    #[test]
    fn closest_is_sorted_and_bounded() {
        let mut table = RoutingTable::new(Id::random());

        for _ in 0..200 {
            table.add(Contact::random());
        }

        let target = Id::random();
        let closest = table.closest(&target, 8, &[]);

        assert_eq!(closest.len(), 8);
        for pair in closest.windows(2) {
            assert!(target.closer_than(pair[0].id(), pair[1].id()));
        }

        // No contact outside the result is closer than the furthest returned
        let furthest = closest[7].id();
        for contact in table.contacts() {
            if !closest.iter().any(|c| c.id() == contact.id()) {
                assert!(target.closer_than(furthest, contact.id()));
            }
        }

        let excluded = *closest[0].id();
        let without = table.closest(&target, 8, &[excluded]);
        assert!(without.iter().all(|c| *c.id() != excluded));
    }

    #[test]
    fn random_contacts_excludes() {
        let mut table = RoutingTable::new(Id::random());

        let contacts: Vec<Contact> = (0..10).map(|_| Contact::random()).collect();
        for contact in &contacts {
            table.add(contact.clone());
        }

        let excluded = *contacts[0].id();
        let random = table.random_contacts(5, &[excluded]);

        assert_eq!(random.len(), 5);
        assert!(random.iter().all(|c| *c.id() != excluded));
        assert_eq!(table.random_contacts(100, &[]).len(), 10);
    }

    #[test]
    fn refresh_targets_within_stale_buckets() {
        let id = Id::random();
        let mut table = RoutingTable::with_params(id, 2, 2);

        for _ in 0..50 {
            table.add(Contact::random());
        }

        let later = Instant::now() + Duration::from_secs(3600);
        let targets = table.refresh_targets_at(later, Duration::from_secs(60));

        assert_eq!(targets.len(), table.buckets().len());
        for (target, bucket) in targets.iter().zip(table.buckets()) {
            assert!(bucket.covers(id.distance_class(target)));
        }

        // All buckets were touched
        assert!(table
            .refresh_targets_at(later, Duration::from_secs(60))
            .is_empty());
    }

    #[test]
    fn clear() {
        let mut table = RoutingTable::with_params(Id::random(), 2, 2);

        for _ in 0..50 {
            table.add(Contact::random());
        }

        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.buckets().len(), 1);
    }
}
