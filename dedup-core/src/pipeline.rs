use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::{extract_candidates, Cell};
use crate::metrics_consts::{
    CANDIDATES_EXTRACTED, DUPLICATES_FOUND, OUTPUT_FILES_WRITTEN, PIPELINE_DURATION,
    PIPELINE_RUNS,
};
use crate::output::{OutputFile, OutputFormat, OutputLabel, OutputWriter};
use crate::partition::partition;
use crate::resolver::ExistenceResolver;
use crate::store::SharedStore;
use crate::types::Identifier;
use crate::writer::PersistenceWriter;

/// Where a pipeline run currently is. `Done` and `Errored` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Resolving,
    Partitioning,
    Persisting,
    BuildingOutput,
    Done,
    Errored,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extracting => "extracting",
            Stage::Resolving => "resolving",
            Stage::Partitioning => "partitioning",
            Stage::Persisting => "persisting",
            Stage::BuildingOutput => "building_output",
            Stage::Done => "done",
            Stage::Errored => "errored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the current stage of one run so a timeout can report where it happened.
struct StageTracker {
    run_id: String,
    current: Mutex<Stage>,
}

impl StageTracker {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            current: Mutex::new(Stage::Extracting),
        }
    }

    fn enter(&self, stage: Stage) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        debug!(run_id = %self.run_id, from = %*current, to = %stage, "pipeline stage");
        *current = stage;
    }

    fn current(&self) -> Stage {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Which output files a run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Both the new and the duplicate file.
    Split,
    /// Only the new file.
    NewOnly,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outputs {
    pub new: Option<OutputFile>,
    pub duplicate: Option<OutputFile>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub run_id: String,
    pub new_count: usize,
    pub duplicate_count: usize,
    pub outputs: Outputs,
}

/// How a successful run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing in the upload parsed as an identifier. The store was never called.
    NoData,
    /// Every identifier was already known. Nothing was persisted.
    AllDuplicates(Report),
    Success(Report),
}

impl Outcome {
    pub fn message(&self) -> &'static str {
        match self {
            Outcome::NoData => "No data found in the file.",
            Outcome::AllDuplicates(_) => "All entries were duplicates.",
            Outcome::Success(report) if report.duplicate_count == 0 => {
                "No duplicate entries found."
            }
            Outcome::Success(_) => "Files processed successfully.",
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            Outcome::NoData => None,
            Outcome::AllDuplicates(report) | Outcome::Success(report) => Some(report),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Outcome::NoData => "no_data",
            Outcome::AllDuplicates(_) => "all_duplicates",
            Outcome::Success(_) => "success",
        }
    }
}

/// Runs uploads through extraction, existence resolution, partitioning, persistence and output.
///
/// Stages run strictly in sequence; only the batches inside the resolving and persisting stages
/// run concurrently. Dropping the future returned by [`Pipeline::run`] cancels whatever store
/// requests are in flight.
pub struct Pipeline {
    resolver: ExistenceResolver,
    writer: PersistenceWriter,
    output: OutputWriter,
    mode: OutputMode,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(
        store: SharedStore,
        config: &PipelineConfig,
        output: OutputWriter,
        mode: OutputMode,
    ) -> Self {
        let retry_policy = config.retry_policy();

        Self {
            resolver: ExistenceResolver::new(
                store.clone(),
                config.lookup_batch_size,
                config.max_concurrent_lookups,
                retry_policy,
            ),
            writer: PersistenceWriter::new(
                store,
                config.write_batch_size,
                config.max_concurrent_writes,
                retry_policy,
            ),
            output,
            mode,
            timeout: config.pipeline_timeout.0,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub async fn run(
        &self,
        rows: &[Vec<Cell>],
        format: OutputFormat,
    ) -> Result<Outcome, PipelineError> {
        let start = Instant::now();
        let tracker = StageTracker::new(Uuid::now_v7().to_string());

        let result = match tokio::time::timeout(self.timeout, self.execute(rows, format, &tracker))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(PipelineError::TimedOut {
                after: self.timeout,
                stage: tracker.current(),
            }),
        };

        metrics::histogram!(PIPELINE_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                tracker.enter(Stage::Done);
                metrics::counter!(PIPELINE_RUNS, "outcome" => outcome.as_str()).increment(1);
                info!(run_id = %tracker.run_id, outcome = outcome.as_str(), "pipeline finished");
            }
            Err(e) => {
                tracker.enter(Stage::Errored);
                metrics::counter!(PIPELINE_RUNS, "outcome" => "failed", "stage" => e.stage().as_str())
                    .increment(1);
                error!(run_id = %tracker.run_id, stage = %e.stage(), "pipeline failed: {}", e);
            }
        }

        result
    }

    async fn execute(
        &self,
        rows: &[Vec<Cell>],
        format: OutputFormat,
        tracker: &StageTracker,
    ) -> Result<Outcome, PipelineError> {
        let candidates = extract_candidates(rows);
        metrics::counter!(CANDIDATES_EXTRACTED).increment(candidates.len() as u64);
        if candidates.is_empty() {
            return Ok(Outcome::NoData);
        }

        tracker.enter(Stage::Resolving);
        let existing = self.resolver.resolve(candidates.as_slice()).await?;

        tracker.enter(Stage::Partitioning);
        let split = partition(&candidates, &existing);
        metrics::counter!(DUPLICATES_FOUND).increment(split.duplicate.len() as u64);
        let new_count = split.new.len();
        let duplicate_count = split.duplicate.len();

        if split.new.is_empty() {
            tracker.enter(Stage::BuildingOutput);
            let duplicate = match self.mode {
                OutputMode::Split => Some(
                    self.write_output(tracker, OutputLabel::Duplicate, format, split.duplicate)
                        .await?,
                ),
                OutputMode::NewOnly => None,
            };

            return Ok(Outcome::AllDuplicates(Report {
                run_id: tracker.run_id.clone(),
                new_count,
                duplicate_count,
                outputs: Outputs {
                    new: None,
                    duplicate,
                },
            }));
        }

        tracker.enter(Stage::Persisting);
        self.writer.persist(&split.new).await?;

        tracker.enter(Stage::BuildingOutput);
        let outputs = match self.mode {
            OutputMode::Split => {
                let (new, duplicate) = tokio::try_join!(
                    self.write_output(tracker, OutputLabel::New, format, split.new),
                    self.write_output(tracker, OutputLabel::Duplicate, format, split.duplicate),
                )?;
                Outputs {
                    new: Some(new),
                    duplicate: Some(duplicate),
                }
            }
            OutputMode::NewOnly => Outputs {
                new: Some(
                    self.write_output(tracker, OutputLabel::New, format, split.new)
                        .await?,
                ),
                duplicate: None,
            },
        };

        Ok(Outcome::Success(Report {
            run_id: tracker.run_id.clone(),
            new_count,
            duplicate_count,
            outputs,
        }))
    }

    async fn write_output(
        &self,
        tracker: &StageTracker,
        label: OutputLabel,
        format: OutputFormat,
        ids: Vec<Identifier>,
    ) -> Result<OutputFile, PipelineError> {
        let file = self
            .output
            .write(&tracker.run_id, label, format, ids)
            .await
            .map_err(|source| PipelineError::Output { label, source })?;
        metrics::counter!(OUTPUT_FILES_WRITTEN, "label" => label.as_str()).increment(1);
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn rows(values: &[&[&str]]) -> Vec<Vec<Cell>> {
        values
            .iter()
            .map(|row| row.iter().map(|v| Cell::from(*v)).collect())
            .collect()
    }

    fn pipeline(store: &MemoryStore, dir: &std::path::Path, mode: OutputMode) -> Pipeline {
        Pipeline::new(
            Arc::new(store.clone()),
            &PipelineConfig::default(),
            OutputWriter::new(dir, "/uploads", 500_000),
            mode,
        )
    }

    #[test]
    fn messages() {
        let report = |duplicate_count| Report {
            run_id: "run".to_owned(),
            new_count: 1,
            duplicate_count,
            outputs: Outputs::default(),
        };

        assert_eq!(Outcome::NoData.message(), "No data found in the file.");
        assert_eq!(
            Outcome::AllDuplicates(report(1)).message(),
            "All entries were duplicates."
        );
        assert_eq!(
            Outcome::Success(report(0)).message(),
            "No duplicate entries found."
        );
        assert_eq!(
            Outcome::Success(report(2)).message(),
            "Files processed successfully."
        );
    }

    #[tokio::test]
    async fn no_data_skips_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let outcome = pipeline(&store, dir.path(), OutputMode::Split)
            .run(&rows(&[&["a", ""], &["b"]]), OutputFormat::Csv)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::NoData);
        assert_eq!(store.lookup_calls(), 0);
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn new_only_mode_writes_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let outcome = pipeline(&store, dir.path(), OutputMode::NewOnly)
            .run(&rows(&[&["1", "2"]]), OutputFormat::Csv)
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert!(report.outputs.duplicate.is_none());
        let new = report.outputs.new.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(&new.path).unwrap(), "1\n2\n");
        assert_eq!(
            new.url,
            format!("/uploads/{}/processed_file_new.csv", report.run_id)
        );
    }

    #[tokio::test]
    async fn all_duplicates_in_new_only_mode_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_identifiers([Identifier::new(1.0).unwrap()]);

        let outcome = pipeline(&store, dir.path(), OutputMode::NewOnly)
            .run(&rows(&[&["1"]]), OutputFormat::Csv)
            .await
            .unwrap();

        let Outcome::AllDuplicates(report) = outcome else {
            panic!("expected all duplicates, got {outcome:?}");
        };
        assert_eq!(report.outputs, Outputs::default());
        assert_eq!(store.insert_calls(), 0);
    }
}
