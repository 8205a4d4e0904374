use std::cmp::Ordering;

use crate::{Contact, Id};

#[derive(Debug, Clone)]
/// Contacts kept sorted by their XOR distance to a target, without duplicates.
pub struct ClosestContacts {
    target: Id,
    contacts: Vec<Contact>,
}

impl ClosestContacts {
    pub fn new(target: Id) -> Self {
        Self {
            target,
            contacts: Vec::with_capacity(64),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    // === Public Methods ===

    /// Insert a contact at its sorted position.
    ///
    /// Returns false if a contact with the same id is already present.
    pub fn add(&mut self, contact: Contact) -> bool {
        if self.contacts.iter().any(|c| c.id() == contact.id()) {
            return false;
        }

        let target = self.target;
        let position = self
            .contacts
            .binary_search_by(|probe| match target.cmp_distance(probe.id(), contact.id()) {
                Ordering::Equal => Ordering::Less,
                ordering => ordering,
            })
            .unwrap_or_else(|position| position);

        self.contacts.insert(position, contact);

        true
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.contacts.iter().any(|c| c.id() == id)
    }

    /// Keep only the `count` closest contacts.
    pub fn truncate(&mut self, count: usize) {
        self.contacts.truncate(count)
    }

    /// The `count` closest contacts, closest first.
    pub fn take(&self, count: usize) -> Vec<Contact> {
        self.contacts.iter().take(count).cloned().collect()
    }
}

impl IntoIterator for ClosestContacts {
    type Item = Contact;
    type IntoIter = std::vec::IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}
