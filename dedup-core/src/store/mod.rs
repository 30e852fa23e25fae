use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Identifier;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors a store can report. The distinction drives the retry decision: retryable faults are
/// transient (overload, throttling, dropped connections), fatal ones will not go away.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is temporarily unavailable: {0}")]
    Retryable(String),
    #[error("store request failed: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Retryable(_))
    }
}

/// The persistent set of every identifier accepted so far.
///
/// Callers keep each request within the store's batch limits. Implementations must make
/// inserting an identifier that is already present harmless.
#[async_trait]
pub trait IdentifierStore {
    /// Return the subset of `keys` already present in the store.
    async fn batch_exists(&self, keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError>;

    /// Record every item of the batch. A batch is all-or-nothing.
    async fn batch_insert(&self, items: &[Identifier]) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn IdentifierStore + Send + Sync>;
