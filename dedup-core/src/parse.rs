use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;

use crate::extract::Cell;
use crate::output::OutputFormat;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheets,
}

/// Upload formats we know how to turn into rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Workbook,
}

impl InputFormat {
    /// Resolve the format from the uploaded file name's extension, ignoring case.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Some(InputFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(InputFormat::Workbook),
            _ => None,
        }
    }

    /// The format results are written in for an upload of this format.
    pub fn output_format(&self) -> OutputFormat {
        match self {
            InputFormat::Csv => OutputFormat::Csv,
            InputFormat::Workbook => OutputFormat::Xlsx,
        }
    }
}

/// Parse raw upload bytes into rows of cells.
pub fn parse_rows(bytes: &[u8], format: InputFormat) -> Result<Vec<Vec<Cell>>, ParseError> {
    match format {
        InputFormat::Csv => parse_csv(bytes),
        InputFormat::Workbook => parse_workbook(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::from).collect());
    }
    Ok(rows)
}

// Only the first sheet is read.
fn parse_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoSheets)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect())
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(text) => Cell::from(text.as_str()),
        Data::Bool(value) => Cell::Bool(*value),
        // Date-formatted cells keep their serial number.
        Data::DateTime(value) => Cell::Number(value.as_f64()),
        // ISO date strings, durations and error cells are not identifiers.
        _ => Cell::Empty,
    }
}
