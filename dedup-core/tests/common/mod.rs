#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dedup_core::{Cell, Identifier, IdentifierStore, MemoryStore, StoreError};

pub fn id(value: f64) -> Identifier {
    Identifier::new(value).unwrap()
}

pub fn ids(values: impl IntoIterator<Item = u32>) -> Vec<Identifier> {
    values.into_iter().map(|v| id(f64::from(v))).collect()
}

pub fn rows(values: &[&[&str]]) -> Vec<Vec<Cell>> {
    values
        .iter()
        .map(|row| row.iter().map(|v| Cell::from(*v)).collect())
        .collect()
}

/// One identifier per row.
pub fn column(values: impl IntoIterator<Item = u32>) -> Vec<Vec<Cell>> {
    values
        .into_iter()
        .map(|v| vec![Cell::Number(f64::from(v))])
        .collect()
}

#[derive(Clone, Copy, Debug)]
pub enum Fault {
    Retryable,
    Fatal,
}

impl Fault {
    fn error(self) -> StoreError {
        match self {
            Fault::Retryable => StoreError::Retryable("throttled".to_owned()),
            Fault::Fatal => StoreError::Fatal("rejected".to_owned()),
        }
    }
}

/// Wraps a [`MemoryStore`] and fails chosen calls, counted from zero per operation.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    lookup_faults: Arc<Mutex<HashMap<usize, Fault>>>,
    insert_faults: Arc<Mutex<HashMap<usize, Fault>>>,
    lookups: Arc<AtomicUsize>,
    inserts: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_lookup(self, call: usize, fault: Fault) -> Self {
        self.lookup_faults.lock().unwrap().insert(call, fault);
        self
    }

    pub fn fail_insert(self, call: usize, fault: Fault) -> Self {
        self.insert_faults.lock().unwrap().insert(call, fault);
        self
    }

    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentifierStore for FaultyStore {
    async fn batch_exists(&self, keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError> {
        let call = self.lookups.fetch_add(1, Ordering::SeqCst);
        let fault = self.lookup_faults.lock().unwrap().get(&call).copied();
        if let Some(fault) = fault {
            return Err(fault.error());
        }
        self.inner.batch_exists(keys).await
    }

    async fn batch_insert(&self, items: &[Identifier]) -> Result<(), StoreError> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst);
        let fault = self.insert_faults.lock().unwrap().get(&call).copied();
        if let Some(fault) = fault {
            return Err(fault.error());
        }
        self.inner.batch_insert(items).await
    }
}

/// Holds every call open for a moment and records the peak number of calls in flight.
#[derive(Clone, Default)]
pub struct SlowStore {
    pub inner: MemoryStore,
    in_flight: Arc<AtomicUsize>,
    peak_lookups: Arc<AtomicUsize>,
    peak_inserts: Arc<AtomicUsize>,
}

impl SlowStore {
    pub fn peak_lookups(&self) -> usize {
        self.peak_lookups.load(Ordering::SeqCst)
    }

    pub fn peak_inserts(&self) -> usize {
        self.peak_inserts.load(Ordering::SeqCst)
    }

    async fn hold(&self, peak: &AtomicUsize) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentifierStore for SlowStore {
    async fn batch_exists(&self, keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError> {
        self.hold(&self.peak_lookups).await;
        self.inner.batch_exists(keys).await
    }

    async fn batch_insert(&self, items: &[Identifier]) -> Result<(), StoreError> {
        self.hold(&self.peak_inserts).await;
        self.inner.batch_insert(items).await
    }
}

/// Never answers.
pub struct HangingStore;

#[async_trait]
impl IdentifierStore for HangingStore {
    async fn batch_exists(&self, _keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError> {
        std::future::pending().await
    }

    async fn batch_insert(&self, _items: &[Identifier]) -> Result<(), StoreError> {
        std::future::pending().await
    }
}
