use std::collections::HashSet;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::metrics_consts::{LOOKUP_BATCHES, LOOKUP_BATCH_TIME};
use crate::retry::{retry_store_call, RetryPolicy};
use crate::store::{IdentifierStore, SharedStore};
use crate::types::{Batches, Identifier};

/// Finds which candidates the store already knows, with bounded batch size and fan-out.
pub struct ExistenceResolver {
    store: SharedStore,
    batch_size: usize,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
}

impl ExistenceResolver {
    pub fn new(
        store: SharedStore,
        batch_size: usize,
        max_concurrency: usize,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_concurrency: max_concurrency.max(1),
            retry_policy,
        }
    }

    /// Return the subset of `candidates` present in the store.
    ///
    /// Any batch that still fails after retries fails the whole call: a failed lookup never
    /// reads as "not present". Dropping the returned future cancels in-flight lookups.
    pub async fn resolve(
        &self,
        candidates: &[Identifier],
    ) -> Result<HashSet<Identifier>, PipelineError> {
        let batches = Batches::new(candidates, self.batch_size);
        let mut lookups = stream::iter(0..batches.len())
            .map(move |index| self.lookup(index, batches.get(index)))
            .buffer_unordered(self.max_concurrency);

        let mut existing = HashSet::new();
        while let Some(found) = lookups.next().await {
            existing.extend(found?);
        }

        debug!(
            candidates = candidates.len(),
            existing = existing.len(),
            "resolved existing identifiers"
        );
        Ok(existing)
    }

    async fn lookup(
        &self,
        index: usize,
        items: &[Identifier],
    ) -> Result<HashSet<Identifier>, PipelineError> {
        let start = Instant::now();
        let store: &(dyn IdentifierStore + Send + Sync) = self.store.as_ref();

        let result = retry_store_call(&self.retry_policy, "resolving", index, move || {
            store.batch_exists(items)
        })
        .await;
        metrics::histogram!(LOOKUP_BATCH_TIME).record(start.elapsed().as_secs_f64());

        match result {
            Ok(found) => {
                metrics::counter!(LOOKUP_BATCHES, "result" => "success").increment(1);
                // Only keys we asked about count, whatever the store sends back.
                Ok(found
                    .into_iter()
                    .filter(|id| items.contains(id))
                    .collect())
            }
            Err(exhausted) => {
                metrics::counter!(LOOKUP_BATCHES, "result" => "failed").increment(1);
                error!(
                    stage = "resolving",
                    batch = index,
                    attempts = exhausted.attempts,
                    "existence lookup failed: {}",
                    exhausted.error
                );
                Err(PipelineError::ExistenceCheck {
                    batch: index,
                    attempts: exhausted.attempts,
                    source: exhausted.error,
                })
            }
        }
    }
}
