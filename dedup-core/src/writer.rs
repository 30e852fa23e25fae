use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::metrics_consts::{IDENTIFIERS_WRITTEN, WRITE_BATCHES, WRITE_BATCH_TIME};
use crate::retry::{retry_store_call, RetryPolicy};
use crate::store::{IdentifierStore, SharedStore};
use crate::types::{Batches, Identifier};

/// Records new identifiers in the store, in bounded batches with a cap on in-flight writes.
pub struct PersistenceWriter {
    store: SharedStore,
    batch_size: usize,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
}

impl PersistenceWriter {
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

    /// Insert every identifier, returning how many were written.
    ///
    /// Each batch is retried on retryable faults up to the policy's attempt limit. The first
    /// batch that still fails stops the call: no further batches are started and in-flight ones
    /// are dropped. Batches committed before that stay committed.
    pub async fn persist(&self, ids: &[Identifier]) -> Result<usize, PipelineError> {
        let batches = Batches::new(ids, self.batch_size);
        let mut writes = stream::iter(0..batches.len())
            .map(move |index| self.write(index, batches.get(index)))
            .buffer_unordered(self.max_concurrency);

        let mut written = 0;
        while let Some(result) = writes.next().await {
            written += result?;
        }

        debug!(written, "persisted new identifiers");
        Ok(written)
    }

    async fn write(&self, index: usize, items: &[Identifier]) -> Result<usize, PipelineError> {
        let start = Instant::now();
        let store: &(dyn IdentifierStore + Send + Sync) = self.store.as_ref();

        let result = retry_store_call(&self.retry_policy, "persisting", index, move || {
            store.batch_insert(items)
        })
        .await;
        metrics::histogram!(WRITE_BATCH_TIME).record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!(WRITE_BATCHES, "result" => "success").increment(1);
                metrics::counter!(IDENTIFIERS_WRITTEN).increment(items.len() as u64);
                Ok(items.len())
            }
            Err(exhausted) => {
                metrics::counter!(WRITE_BATCHES, "result" => "failed").increment(1);
                error!(
                    stage = "persisting",
                    batch = index,
                    attempts = exhausted.attempts,
                    "batch write failed: {}",
                    exhausted.error
                );
                Err(PipelineError::Write {
                    batch: index,
                    attempts: exhausted.attempts,
                    source: exhausted.error,
                })
            }
        }
    }
}
