use tracing::debug;

use crate::types::{CandidateSet, Identifier};

/// A raw cell as produced by the tabular parsers.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// The identifier this cell holds, if any. Text must parse as a decimal number in full;
    /// booleans never count.
    pub fn identifier(&self) -> Option<Identifier> {
        match self {
            Cell::Number(value) => Identifier::new(*value),
            Cell::Text(text) => parse_decimal(text.trim()).and_then(Identifier::new),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_owned())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

// `str::parse::<f64>` also accepts "inf", "infinity" and "nan", which are not identifiers.
fn parse_decimal(text: &str) -> Option<f64> {
    if text.is_empty() || text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Scan every cell of every row and collect the distinct numeric identifiers, row-major, in
/// first-seen order.
pub fn extract_candidates<R>(rows: &[R]) -> CandidateSet
where
    R: AsRef<[Cell]>,
{
    let candidates: CandidateSet = rows
        .iter()
        .flat_map(|row| row.as_ref().iter())
        .filter_map(Cell::identifier)
        .collect();

    debug!(
        rows = rows.len(),
        candidates = candidates.len(),
        "extracted candidate identifiers"
    );
    candidates
}
