//! The lock-guarded contact directory.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A full, point-in-time copy of a directory.
///
/// Ordered so that two equal directories always encode to the same bytes.
pub type Snapshot = BTreeMap<String, String>;

/// A single directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactEntry {
    /// Unique key.
    pub name: String,
    /// Phone number.
    pub phone: String,
}

impl ContactEntry {
    /// Creates a new entry.
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
        }
    }
}

/// The node-local name → phone mapping.
///
/// Every operation takes the single internal lock for the whole
/// check-then-act sequence and releases it before returning. Nothing
/// borrowed from the map escapes the lock, so no caller can hold it
/// across a network call.
///
/// # Example
///
/// ```rust
/// use agenda_store::DirectoryStore;
///
/// let store = DirectoryStore::new();
/// store.add("alice", "123").unwrap();
/// store.update("alice", "456").unwrap();
///
/// let snapshot = store.view();
/// assert_eq!(snapshot.get("alice").map(String::as_str), Some("456"));
/// ```
#[derive(Debug, Default)]
pub struct DirectoryStore {
    entries: Mutex<Snapshot>,
}

impl DirectoryStore {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with `entries`.
    #[must_use]
    pub fn with_entries(entries: Snapshot) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Inserts a new contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateName`] if `name` is already present.
    pub fn add(&self, name: &str, phone: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Err(StoreError::duplicate(name));
        }
        entries.insert(name.to_string(), phone.to_string());
        Ok(())
    }

    /// Deletes an existing contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `name` is absent.
    pub fn remove(&self, name: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(name))
    }

    /// Overwrites the phone of an existing contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `name` is absent.
    pub fn update(&self, name: &str, phone: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(current) => {
                *current = phone.to_string();
                Ok(())
            }
            None => Err(StoreError::not_found(name)),
        }
    }

    /// Returns a copy of the whole directory.
    ///
    /// An empty snapshot is a valid result.
    #[must_use]
    pub fn view(&self) -> Snapshot {
        self.entries.lock().clone()
    }

    /// Folds an incoming snapshot into the directory.
    ///
    /// Every incoming key overwrites (or inserts) the local entry. Local
    /// keys missing from `snapshot` are kept: this is a union, not a replace.
    ///
    /// Returns the number of entries that were inserted or changed.
    pub fn merge_snapshot(&self, snapshot: Snapshot) -> usize {
        let mut entries = self.entries.lock();
        let mut changed = 0;
        for (name, phone) in snapshot {
            if entries.get(&name) != Some(&phone) {
                entries.insert(name, phone);
                changed += 1;
            }
        }
        changed
    }

    /// Applies a peer-originated add or update.
    ///
    /// Inserts or overwrites unconditionally. Returns `true` if the
    /// directory changed.
    pub fn replicate_put(&self, name: &str, phone: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(current) if current == phone => false,
            _ => {
                entries.insert(name.to_string(), phone.to_string());
                true
            }
        }
    }

    /// Applies a peer-originated remove.
    ///
    /// Removing an absent name is a no-op. Returns `true` if an entry was
    /// deleted.
    pub fn replicate_remove(&self, name: &str) -> bool {
        self.entries.lock().remove(name).is_some()
    }

    /// Returns the phone stored for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.lock().get(name).cloned()
    }

    /// Returns the number of contacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the directory has no contacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl From<Snapshot> for DirectoryStore {
    fn from(entries: Snapshot) -> Self {
        Self::with_entries(entries)
    }
}

impl FromIterator<ContactEntry> for DirectoryStore {
    fn from_iter<I: IntoIterator<Item = ContactEntry>>(iter: I) -> Self {
        Self::with_entries(iter.into_iter().map(|e| (e.name, e.phone)).collect())
    }
}
