pub mod config;
pub mod error;
pub mod extract;
pub mod metrics_consts;
pub mod output;
pub mod parse;
pub mod partition;
pub mod pipeline;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod types;
pub mod writer;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extract::{extract_candidates, Cell};
pub use output::{OutputFile, OutputFormat, OutputLabel, OutputWriter};
pub use parse::{parse_rows, InputFormat, ParseError};
pub use pipeline::{OutputMode, Outcome, Outputs, Pipeline, Report, Stage};
pub use store::{IdentifierStore, MemoryStore, PgStore, SharedStore, StoreError};
pub use types::Identifier;
