use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{IdentifierStore, StoreError};
use crate::types::Identifier;

/// An in-process store, for local runs and tests. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    ids: Arc<Mutex<HashSet<Identifier>>>,
    lookups: Arc<AtomicUsize>,
    inserts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifiers(ids: impl IntoIterator<Item = Identifier>) -> Self {
        let store = Self::default();
        store.lock().extend(ids);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Identifier>> {
        // A poisoned lock only means another holder panicked mid-insert of plain values.
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> HashSet<Identifier> {
        self.lock().clone()
    }

    /// Number of `batch_exists` calls served.
    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of `batch_insert` calls served.
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentifierStore for MemoryStore {
    async fn batch_exists(&self, keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let ids = self.lock();
        Ok(keys.iter().filter(|k| ids.contains(*k)).copied().collect())
    }

    async fn batch_insert(&self, items: &[Identifier]) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.lock().extend(items.iter().copied());
        Ok(())
    }
}
