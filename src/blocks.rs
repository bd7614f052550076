use std::collections::BTreeMap;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// Candidate sets per query record.
///
/// Each candidate list is duplicate-free. Top-k policies store candidates
/// best-first, other producers store them ascending. Serializes as
/// `{"<query_id>": [candidate ids...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blocks(BTreeMap<RecordId, Vec<RecordId>>);

impl Blocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block of `query`, dropping repeated candidates while keeping order.
    pub fn insert(&mut self, query: RecordId, candidates: Vec<RecordId>) {
        let mut seen = AHashSet::with_capacity(candidates.len());
        let unique: Vec<RecordId> = candidates
            .into_iter()
            .filter(|candidate| seen.insert(*candidate))
            .collect();
        self.0.insert(query, unique);
    }

    /// Make sure `query` has an entry, possibly empty.
    pub fn ensure(&mut self, query: RecordId) -> &mut Vec<RecordId> {
        self.0.entry(query).or_default()
    }

    pub fn get(&self, query: RecordId) -> Option<&[RecordId]> {
        self.0.get(&query).map(Vec::as_slice)
    }

    pub fn contains(&self, query: RecordId, candidate: RecordId) -> bool {
        self.get(query).is_some_and(|block| block.contains(&candidate))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &[RecordId])> {
        self.0.iter().map(|(&query, block)| (query, block.as_slice()))
    }

    pub fn queries(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.0.keys().copied()
    }

    /// Number of query records with an entry.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total pairwise comparisons the blocks imply.
    pub fn candidate_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn largest(&self) -> usize {
        self.0.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn smallest(&self) -> usize {
        self.0.values().map(Vec::len).min().unwrap_or(0)
    }

    /// Remove `query` from its own block.
    pub fn drop_self_matches(&mut self) {
        for (query, block) in &mut self.0 {
            block.retain(|candidate| candidate != query);
        }
    }
}

impl FromIterator<(RecordId, Vec<RecordId>)> for Blocks {
    fn from_iter<I: IntoIterator<Item = (RecordId, Vec<RecordId>)>>(iter: I) -> Self {
        let mut blocks = Self::new();
        for (query, candidates) in iter {
            blocks.insert(query, candidates);
        }
        blocks
    }
}
