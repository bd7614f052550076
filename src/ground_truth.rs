use std::collections::{BTreeMap, BTreeSet};

use crate::record::RecordId;

/// Confirmed matches: query record id -> reference record ids.
///
/// Only used to evaluate blocks, never to build them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroundTruth {
    matches: BTreeMap<RecordId, BTreeSet<RecordId>>,
}

impl GroundTruth {
    /// Group `(query, reference)` pairs by query id.
    ///
    /// Ids are not checked against any dataset; repeated pairs collapse.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (RecordId, RecordId)>,
    {
        let mut matches: BTreeMap<RecordId, BTreeSet<RecordId>> = BTreeMap::new();
        for (query, reference) in pairs {
            matches.entry(query).or_default().insert(reference);
        }
        Self { matches }
    }

    pub fn get(&self, query: RecordId) -> Option<&BTreeSet<RecordId>> {
        self.matches.get(&query)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &BTreeSet<RecordId>)> {
        self.matches.iter().map(|(&query, refs)| (query, refs))
    }

    /// Every confirmed `(query, reference)` pair.
    pub fn pairs(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.iter()
            .flat_map(|(query, refs)| refs.iter().map(move |&reference| (query, reference)))
    }

    /// Number of query ids with at least one match.
    pub fn query_count(&self) -> usize {
        self.matches.len()
    }

    /// Number of confirmed pairs.
    pub fn pair_count(&self) -> usize {
        self.matches.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl FromIterator<(RecordId, RecordId)> for GroundTruth {
    fn from_iter<I: IntoIterator<Item = (RecordId, RecordId)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_query() {
        let truth = GroundTruth::from_pairs([(5, 10), (5, 11), (7, 10), (5, 10)]);
        assert_eq!(truth.query_count(), 2);
        assert_eq!(truth.pair_count(), 3);
        assert_eq!(
            truth.get(5).map(|s| s.iter().copied().collect::<Vec<_>>()),
            Some(vec![10, 11])
        );
        assert_eq!(truth.get(6), None);
    }

    #[test]
    fn test_shared_reference_counts_per_pair() {
        let truth: GroundTruth = [(1, 3), (2, 3)].into_iter().collect();
        assert_eq!(truth.pair_count(), 2);
        assert_eq!(truth.pairs().collect::<Vec<_>>(), vec![(1, 3), (2, 3)]);
    }
}
