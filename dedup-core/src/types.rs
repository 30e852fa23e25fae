use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A numeric value extracted from an upload, used as the deduplication key.
///
/// Always finite. `-0.0` is folded into `0.0` so that equality and hashing agree with
/// numeric equality.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Identifier(f64);

impl Identifier {
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // Adding 0.0 turns -0.0 into 0.0 and leaves everything else untouched.
        Some(Identifier(value + 0.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64's Display already prints integral values without a fractional part.
        write!(f, "{}", self.0)
    }
}

/// The duplicate-free identifiers of one upload, kept in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateSet {
    ids: Vec<Identifier>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.ids.iter()
    }
}

impl FromIterator<Identifier> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let ids = iter.into_iter().filter(|id| seen.insert(*id)).collect();
        CandidateSet { ids }
    }
}

/// A slice of identifiers addressed as fixed-size batches. Batches are handed out by index so
/// work queued over them does not borrow a per-batch value.
#[derive(Clone, Copy, Debug)]
pub struct Batches<'a> {
    ids: &'a [Identifier],
    size: usize,
}

impl<'a> Batches<'a> {
    pub fn new(ids: &'a [Identifier], size: usize) -> Self {
        Self {
            ids,
            size: size.max(1),
        }
    }

    /// Number of batches. An empty slice has none and the last batch is never empty.
    pub fn len(&self) -> usize {
        self.ids.len().div_ceil(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Items of batch `index`; empty when `index` is past the end.
    pub fn get(self, index: usize) -> &'a [Identifier] {
        let start = index.saturating_mul(self.size).min(self.ids.len());
        let end = start.saturating_add(self.size).min(self.ids.len());
        &self.ids[start..end]
    }
}
