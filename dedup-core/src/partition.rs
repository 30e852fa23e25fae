use std::collections::HashSet;

use crate::types::{CandidateSet, Identifier};

/// Candidates split by whether the store already knew them. Both sides keep extraction order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub new: Vec<Identifier>,
    pub duplicate: Vec<Identifier>,
}

pub fn partition(candidates: &CandidateSet, existing: &HashSet<Identifier>) -> Partition {
    let (duplicate, new): (Vec<Identifier>, Vec<Identifier>) = candidates
        .iter()
        .copied()
        .partition(|id| existing.contains(id));

    Partition { new, duplicate }
}
