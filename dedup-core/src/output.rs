use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::Identifier;

/// Excel caps a sheet at 1,048,576 rows, so long outputs spill into extra columns well before.
pub const DEFAULT_MAX_ROWS_PER_COLUMN: usize = 500_000;

const SHEET_NAME: &str = "Data";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to encode csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to encode workbook: {0}")]
    Workbook(#[from] XlsxError),
    #[error("output has too many rows for a single sheet")]
    TooManyRows,
    #[error("output file i/o failed at {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("output encoding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

/// Which side of the partition an output file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLabel {
    New,
    Duplicate,
}

impl OutputLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLabel::New => "new",
            OutputLabel::Duplicate => "duplicate",
        }
    }

    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("processed_file_{}.{}", self.as_str(), format.extension())
    }
}

impl fmt::Display for OutputLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lay identifiers out one per row, starting a new column every `max_rows_per_column` rows.
fn layout(ids: &[Identifier], max_rows_per_column: usize) -> Vec<Vec<Option<Identifier>>> {
    let max_rows = max_rows_per_column.max(1);
    let columns: Vec<&[Identifier]> = ids.chunks(max_rows).collect();
    let height = columns.first().map_or(0, |c| c.len());

    (0..height)
        .map(|row| columns.iter().map(|c| c.get(row).copied()).collect())
        .collect()
}

/// Serialize identifiers into a tabular file. An empty input produces a valid, empty file.
pub fn encode(
    ids: &[Identifier],
    format: OutputFormat,
    max_rows_per_column: usize,
) -> Result<Vec<u8>, OutputError> {
    let rows = layout(ids, max_rows_per_column);
    match format {
        OutputFormat::Csv => encode_csv(&rows),
        OutputFormat::Xlsx => encode_xlsx(&rows),
    }
}

fn encode_csv(rows: &[Vec<Option<Identifier>>]) -> Result<Vec<u8>, OutputError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(
            row.iter()
                .map(|cell| cell.map(|id| id.to_string()).unwrap_or_default()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| OutputError::Csv(e.into_error().into()))
}

fn encode_xlsx(rows: &[Vec<Option<Identifier>>]) -> Result<Vec<u8>, OutputError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (row_index, row) in rows.iter().enumerate() {
        let row_index = u32::try_from(row_index).map_err(|_| OutputError::TooManyRows)?;
        for (col_index, cell) in row.iter().enumerate() {
            let col_index = u16::try_from(col_index).map_err(|_| OutputError::TooManyRows)?;
            if let Some(id) = cell {
                worksheet.write_number(row_index, col_index, id.value())?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// A written output file and the URL path it is served under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub url: String,
}

/// Writes output files below a root directory, one sub-directory per pipeline run.
#[derive(Clone, Debug)]
pub struct OutputWriter {
    root: PathBuf,
    url_prefix: String,
    max_rows_per_column: usize,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str, max_rows_per_column: usize) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_owned(),
            max_rows_per_column,
        }
    }

    pub async fn write(
        &self,
        run_id: &str,
        label: OutputLabel,
        format: OutputFormat,
        ids: Vec<Identifier>,
    ) -> Result<OutputFile, OutputError> {
        let count = ids.len();
        let max_rows = self.max_rows_per_column;
        // Workbook encoding is CPU bound and can take a while for large uploads.
        let bytes = tokio::task::spawn_blocking(move || encode(&ids, format, max_rows)).await??;

        let dir = self.root.join(run_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| OutputError::Io {
                path: dir.clone(),
                error,
            })?;

        let file_name = label.file_name(format);
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| OutputError::Io {
                path: path.clone(),
                error,
            })?;

        debug!(label = %label, count, path = %path.display(), "wrote output file");

        Ok(OutputFile {
            url: format!("{}/{}/{}", self.url_prefix, run_id, file_name),
            path,
        })
    }

    /// Delete run directories last modified at least `retention` ago, returning how many went.
    ///
    /// A missing root has nothing to sweep. A directory that cannot be inspected or removed is
    /// logged and skipped so one bad entry does not stall the rest.
    pub async fn remove_expired_runs(&self, retention: Duration) -> Result<usize, OutputError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => {
                return Err(OutputError::Io {
                    path: self.root.clone(),
                    error,
                })
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| OutputError::Io {
                path: self.root.clone(),
                error,
            })?
        {
            let path = entry.path();
            let age = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata
                    .modified()
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .unwrap_or_default(),
                Ok(_) => continue,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        "could not inspect output directory: {}",
                        error
                    );
                    continue;
                }
            };
            if age < retention {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(error) => warn!(
                    path = %path.display(),
                    "could not remove expired output directory: {}",
                    error
                ),
            }
        }

        Ok(removed)
    }
}
