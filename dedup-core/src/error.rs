use std::time::Duration;

use thiserror::Error;

use crate::output::{OutputError, OutputLabel};
use crate::pipeline::Stage;
use crate::store::StoreError;

/// Why a pipeline run stopped before producing its outputs.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("existence check failed for batch {batch} after {attempts} attempt(s): {source}")]
    ExistenceCheck {
        batch: usize,
        attempts: u32,
        source: StoreError,
    },
    #[error("write failed for batch {batch} after {attempts} attempt(s): {source}")]
    Write {
        batch: usize,
        attempts: u32,
        source: StoreError,
    },
    #[error("failed to build {label} output: {source}")]
    Output {
        label: OutputLabel,
        source: OutputError,
    },
    #[error("pipeline timed out after {after:?} while {stage}")]
    TimedOut { after: Duration, stage: Stage },
}

impl PipelineError {
    /// The stage that was running when the pipeline failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ExistenceCheck { .. } => Stage::Resolving,
            PipelineError::Write { .. } => Stage::Persisting,
            PipelineError::Output { .. } => Stage::BuildingOutput,
            PipelineError::TimedOut { stage, .. } => *stage,
        }
    }
}
