use std::time::Duration;

use tracing::{error, info};

use dedup_core::OutputWriter;

use crate::metrics::OUTPUT_RUNS_REMOVED;

/// Periodically delete run directories older than `retention`. Never returns.
pub async fn sweep_loop(output: OutputWriter, retention: Duration, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;
        match output.remove_expired_runs(retention).await {
            Ok(0) => {}
            Ok(removed) => {
                metrics::counter!(OUTPUT_RUNS_REMOVED).increment(removed as u64);
                info!(removed, "removed expired output directories");
            }
            Err(e) => error!("output sweep failed: {}", e),
        }
    }
}
