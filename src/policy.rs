//! Aggregation policies: how one query record's name parts combine into
//! scores for reference records.
//!
//! Every policy first scores each distinct query part against every index
//! key. Only the step that folds those similarities into a per-record
//! [`Scoreboard`] differs between variants; candidate selection is shared.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::assignment::{self, Matrix};
use crate::error::ConfigError;
use crate::index::NamePartIndex;
use crate::record::RecordId;
use crate::similarity::SimilarityScorer;

/// Configuration-level name of a policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    UnionThreshold,
    MaxScore,
    NormalizedSum,
    Assignment,
    ThresholdCount,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnionThreshold => "union_threshold",
            Self::MaxScore => "max_score",
            Self::NormalizedSum => "normalized_sum",
            Self::Assignment => "assignment",
            Self::ThresholdCount => "threshold_count",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "union_threshold" => Ok(Self::UnionThreshold),
            "max_score" => Ok(Self::MaxScore),
            "normalized_sum" => Ok(Self::NormalizedSum),
            "assignment" => Ok(Self::Assignment),
            "threshold_count" => Ok(Self::ThresholdCount),
            other => Err(format!("unknown blocking policy '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlockingPolicy {
    /// Union every bucket whose key is at least `similarity_threshold` similar
    /// to some query part. Block size is unbounded.
    UnionThreshold { similarity_threshold: f64 },
    /// Score = best similarity of any query part to any of the record's parts.
    MaxScoreTopK { block_size: usize },
    /// Score = mean similarity over every (query part, record part) comparison.
    NormalizedSumTopK { block_size: usize },
    /// Score = mean weight of the optimal one-to-one part pairing.
    AssignmentTopK { block_size: usize },
    /// Score = comparisons reaching `similarity_threshold`, divided by the
    /// record's part count. Records without parts are never candidates.
    ThresholdCountTopK {
        block_size: usize,
        similarity_threshold: f64,
    },
}

impl BlockingPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::UnionThreshold { .. } => PolicyKind::UnionThreshold,
            Self::MaxScoreTopK { .. } => PolicyKind::MaxScore,
            Self::NormalizedSumTopK { .. } => PolicyKind::NormalizedSum,
            Self::AssignmentTopK { .. } => PolicyKind::Assignment,
            Self::ThresholdCountTopK { .. } => PolicyKind::ThresholdCount,
        }
    }

    /// `None` for policies with unbounded blocks.
    pub fn block_size(&self) -> Option<usize> {
        match *self {
            Self::UnionThreshold { .. } => None,
            Self::MaxScoreTopK { block_size }
            | Self::NormalizedSumTopK { block_size }
            | Self::AssignmentTopK { block_size }
            | Self::ThresholdCountTopK { block_size, .. } => Some(block_size),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::UnionThreshold {
                similarity_threshold,
            }
            | Self::ThresholdCountTopK {
                similarity_threshold,
                ..
            } if !(0.0..=1.0).contains(&similarity_threshold) => {
                return Err(ConfigError::Threshold(similarity_threshold));
            }
            _ => {}
        }
        if self.block_size() == Some(0) {
            return Err(ConfigError::BlockSize {
                policy: self.kind().name(),
            });
        }
        Ok(())
    }

    /// Fold the similarities of `parts` against every index key into per-record scores.
    pub fn score(
        &self,
        parts: &[&str],
        index: &NamePartIndex,
        scorer: &dyn SimilarityScorer,
        universe: Universe<'_>,
    ) -> Scoreboard {
        let sims = PartScores::compute(parts, index, scorer);
        let mut board = Scoreboard::new(index.reference_len());

        match *self {
            Self::UnionThreshold {
                similarity_threshold,
            } => {
                // No query part, no bucket to union.
                if sims.parts == 0 {
                    return board;
                }
                for key in 0..index.len() {
                    let best = sims.best(key);
                    if best >= similarity_threshold {
                        for &record in index.bucket(key) {
                            board.raise(record, best);
                        }
                    }
                }
            }
            Self::MaxScoreTopK { .. } => {
                // Records sharing no vocabulary still score 0 so blocks fill up.
                board.fill(0.0);
                for key in 0..index.len() {
                    let best = sims.best(key);
                    for &record in index.bucket(key) {
                        board.raise(record, best);
                    }
                }
            }
            Self::NormalizedSumTopK { .. } => {
                let mut sums = vec![0.0_f64; index.reference_len()];
                let mut comparisons = vec![0_usize; index.reference_len()];
                for key in 0..index.len() {
                    let column_sum: f64 = sims.column(key).sum();
                    for &record in index.bucket(key) {
                        sums[record] += column_sum;
                        comparisons[record] += sims.parts;
                    }
                }
                for (record, (sum, count)) in sums.into_iter().zip(comparisons).enumerate() {
                    let mean = if count == 0 { 0.0 } else { sum / count as f64 };
                    board.set(record, mean);
                }
            }
            Self::AssignmentTopK { .. } => {
                for record in universe.iter(index.reference_len()) {
                    let score = match index.record_keys(record) {
                        Some(keys) if sims.parts > 0 && !keys.is_empty() => {
                            let mut matrix = Matrix::new(sims.parts, keys.len());
                            for part in 0..sims.parts {
                                for (col, &key) in keys.iter().enumerate() {
                                    matrix.set(part, col, sims.get(part, key));
                                }
                            }
                            assignment::maximize(&matrix).mean()
                        }
                        _ => 0.0,
                    };
                    board.set(record, score);
                }
            }
            Self::ThresholdCountTopK {
                similarity_threshold,
                ..
            } => {
                let mut points = vec![0_usize; index.reference_len()];
                for key in 0..index.len() {
                    let hits = sims
                        .column(key)
                        .filter(|&s| s >= similarity_threshold)
                        .count();
                    if hits > 0 {
                        for &record in index.bucket(key) {
                            points[record] += hits;
                        }
                    }
                }
                for (record, hits) in points.into_iter().enumerate() {
                    let part_count = index.part_count(record);
                    if part_count > 0 {
                        board.set(record, hits as f64 / part_count as f64);
                    }
                }
            }
        }
        board
    }

    /// Turn a scoreboard into a block: best-first for top-k policies,
    /// ascending ids for threshold unions.
    pub fn select(
        &self,
        board: &Scoreboard,
        universe: Universe<'_>,
        exclude: Option<RecordId>,
    ) -> Vec<ScoredCandidate> {
        let candidates = universe
            .iter(board.len())
            .filter(|&record| Some(record) != exclude)
            .filter_map(|record| {
                board
                    .get(record)
                    .map(|score| ScoredCandidate { record, score })
            });

        match self.block_size() {
            None => {
                let mut all: Vec<ScoredCandidate> = candidates.collect();
                all.sort_unstable_by_key(|c| c.record);
                all.dedup_by_key(|c| c.record);
                all
            }
            Some(block_size) => top_k(candidates, block_size),
        }
    }
}

/// Reference records a query record may be matched against.
#[derive(Clone, Copy, Debug)]
pub enum Universe<'a> {
    All,
    /// Restrict to an earlier block, e.g. from a cheaper policy.
    Only(&'a [RecordId]),
}

impl<'a> Universe<'a> {
    fn iter(self, reference_len: usize) -> Box<dyn Iterator<Item = RecordId> + 'a> {
        match self {
            Self::All => Box::new(0..reference_len),
            Self::Only(records) => Box::new(
                records
                    .iter()
                    .copied()
                    .filter(move |&record| record < reference_len),
            ),
        }
    }
}

/// Per-query scores of reference records. `None` marks a non-candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct Scoreboard {
    scores: Vec<Option<f64>>,
}

impl Scoreboard {
    fn new(reference_len: usize) -> Self {
        Self {
            scores: vec![None; reference_len],
        }
    }

    fn fill(&mut self, score: f64) {
        self.scores.fill(Some(score));
    }

    fn set(&mut self, record: RecordId, score: f64) {
        self.scores[record] = Some(score);
    }

    /// Keep the higher of the current and the new score.
    fn raise(&mut self, record: RecordId, score: f64) {
        let slot = &mut self.scores[record];
        *slot = Some(slot.map_or(score, |current| current.max(score)));
    }

    pub fn get(&self, record: RecordId) -> Option<f64> {
        self.scores.get(record).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scored(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

/// A reference record and its aggregated score.
#[derive(Clone, Copy, Debug)]
pub struct ScoredCandidate {
    pub record: RecordId,
    pub score: f64,
}

impl PartialEq for ScoredCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredCandidate {}

impl PartialOrd for ScoredCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredCandidate {
    /// Higher score first; on ties the lower record id ranks higher.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.record.cmp(&self.record))
    }
}

/// The `k` best candidates, best first.
pub fn top_k(candidates: impl Iterator<Item = ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
    let mut heap: BinaryHeap<ScoredCandidate> = candidates.collect();
    let mut results = Vec::with_capacity(k.min(heap.len()));
    for _ in 0..k {
        if let Some(candidate) = heap.pop() {
            results.push(candidate);
        } else {
            break;
        }
    }
    results
}

/// Similarity of every query part against every index key, row-major by part.
struct PartScores {
    parts: usize,
    keys: usize,
    sims: Vec<f64>,
}

impl PartScores {
    fn compute(parts: &[&str], index: &NamePartIndex, scorer: &dyn SimilarityScorer) -> Self {
        let keys = index.len();
        let mut sims = Vec::with_capacity(parts.len() * keys);
        for part in parts {
            for key in index.keys() {
                sims.push(scorer.similarity(part, key));
            }
        }
        Self {
            parts: parts.len(),
            keys,
            sims,
        }
    }

    fn get(&self, part: usize, key: usize) -> f64 {
        self.sims[part * self.keys + key]
    }

    fn column(&self, key: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.parts).map(move |part| self.get(part, key))
    }

    /// Best similarity of any query part to `key`; 0 without query parts.
    fn best(&self, key: usize) -> f64 {
        self.column(key).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Dataset;
    use crate::similarity::Metric;

    fn exact(a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }

    /// Similarity by shared leading letters, so expected scores are easy to read.
    fn prefix(a: &str, b: &str) -> f64 {
        let shared = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
        let longest = a.chars().count().max(b.chars().count());
        if longest == 0 {
            1.0
        } else {
            shared as f64 / longest as f64
        }
    }

    fn reference() -> Dataset {
        Dataset::from_raw([
            r#"{"given": "Emil", "sur": "Larsen"}"#,
            r#"{"given": "Emilie", "sur": "Larson"}"#,
            r#"{"given": "Anna", "sur": "Levi"}"#,
            "garbage",
            "{}",
        ])
    }

    fn score(policy: BlockingPolicy, parts: &[&str], scorer: &dyn SimilarityScorer) -> Scoreboard {
        let index = NamePartIndex::build(&reference());
        policy.score(parts, &index, scorer, Universe::All)
    }

    #[test]
    fn test_union_threshold_scores_only_qualifying_buckets() {
        let policy = BlockingPolicy::UnionThreshold {
            similarity_threshold: 1.0,
        };
        let board = score(policy, &["Emil", "Levi"], &exact);
        assert_eq!(board.get(0), Some(1.0));
        assert_eq!(board.get(1), None);
        assert_eq!(board.get(2), Some(1.0));
        assert_eq!(board.get(3), None);
        let block = policy.select(&board, Universe::All, None);
        let ids: Vec<_> = block.iter().map(|c| c.record).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_union_threshold_without_query_parts_is_empty() {
        let policy = BlockingPolicy::UnionThreshold {
            similarity_threshold: 0.0,
        };
        let board = score(policy, &[], &exact);
        assert_eq!(board.scored(), 0);
        assert!(policy.select(&board, Universe::All, None).is_empty());

        // A single part at threshold 0 still unions every bucket.
        let board = score(policy, &["Nobody"], &exact);
        assert_eq!(board.scored(), 3);
    }

    #[test]
    fn test_max_score_keeps_peak_and_zero_fills() {
        let policy = BlockingPolicy::MaxScoreTopK { block_size: 10 };
        let board = score(policy, &["Emil", "Nobody"], &prefix);
        assert_eq!(board.get(0), Some(1.0));
        assert!((board.get(1).unwrap() - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(board.get(3), Some(0.0));
        assert_eq!(board.get(4), Some(0.0));
        assert_eq!(board.scored(), 5);
    }

    #[test]
    fn test_normalized_sum_averages_all_comparisons() {
        let policy = BlockingPolicy::NormalizedSumTopK { block_size: 10 };
        let board = score(policy, &["Emil", "Larsen"], &exact);
        // Record 0: four comparisons, two exact hits.
        assert!((board.get(0).unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(board.get(1), Some(0.0));
        assert_eq!(board.get(3), Some(0.0));
    }

    #[test]
    fn test_normalized_sum_prefers_broad_similarity() {
        // One exact hit plus an unrelated part loses to two near hits.
        let reference = Dataset::from_raw([
            r#"{"given": "Emil", "sur": "Zzzzzz"}"#,
            r#"{"given": "Emila", "sur": "Larsan"}"#,
        ]);
        let index = NamePartIndex::build(&reference);
        let parts = ["Emil", "Larsen"];
        let normalized = BlockingPolicy::NormalizedSumTopK { block_size: 1 };
        let board = normalized.score(&parts, &index, &prefix, Universe::All);
        assert_eq!(normalized.select(&board, Universe::All, None)[0].record, 1);
        let max = BlockingPolicy::MaxScoreTopK { block_size: 1 };
        let board = max.score(&parts, &index, &prefix, Universe::All);
        assert_eq!(max.select(&board, Universe::All, None)[0].record, 0);
    }

    #[test]
    fn test_assignment_does_not_double_count() {
        let reference = Dataset::from_raw([
            r#"{"given": "Emil", "alt": "Emile"}"#,
            r#"{"given": "Emil", "sur": "Larsen"}"#,
        ]);
        let index = NamePartIndex::build(&reference);
        let policy = BlockingPolicy::AssignmentTopK { block_size: 2 };
        let board = policy.score(&["Emil", "Larsen"], &index, &prefix, Universe::All);
        // Record 0: "Emil" pairs with "Emil" (1.0), "Larsen" with "Emile" (0.0).
        assert!((board.get(0).unwrap() - 0.5).abs() < 1e-9);
        assert!((board.get(1).unwrap() - 1.0).abs() < 1e-9);
        let ids: Vec<_> = policy
            .select(&board, Universe::All, None)
            .iter()
            .map(|c| c.record)
            .collect();
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn test_assignment_divides_by_matched_pairs() {
        let policy = BlockingPolicy::AssignmentTopK { block_size: 10 };
        // One query part against two-part records: a single matched pair.
        let board = score(policy, &["Anna"], &exact);
        assert_eq!(board.get(2), Some(1.0));
        assert_eq!(board.get(3), Some(0.0));
        assert_eq!(board.get(4), Some(0.0));
    }

    #[test]
    fn test_assignment_respects_universe() {
        let index = NamePartIndex::build(&reference());
        let policy = BlockingPolicy::AssignmentTopK { block_size: 10 };
        let board = policy.score(&["Anna"], &index, &exact, Universe::Only(&[0, 2, 99]));
        assert_eq!(board.scored(), 2);
        let ids: Vec<_> = policy
            .select(&board, Universe::Only(&[0, 2, 99]), None)
            .iter()
            .map(|c| c.record)
            .collect();
        assert_eq!(ids, vec![2, 0]);
    }

    #[test]
    fn test_threshold_count_normalizes_by_part_count() {
        let policy = BlockingPolicy::ThresholdCountTopK {
            block_size: 10,
            similarity_threshold: 1.0,
        };
        let board = score(policy, &["Emil", "Larsen", "Levi"], &exact);
        assert_eq!(board.get(0), Some(1.0));
        assert_eq!(board.get(1), Some(0.0));
        assert_eq!(board.get(2), Some(0.5));
        // Malformed and empty records are never candidates.
        assert_eq!(board.get(3), None);
        assert_eq!(board.get(4), None);
    }

    #[test]
    fn test_select_tie_break_and_exclusion() {
        let policy = BlockingPolicy::MaxScoreTopK { block_size: 3 };
        let board = score(policy, &["Nobody"], &exact);
        let ids: Vec<_> = policy
            .select(&board, Universe::All, Some(1))
            .iter()
            .map(|c| c.record)
            .collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn test_jaro_winkler_transliteration_scenario() {
        let reference = Dataset::from_raw([r#"{"given": "Zigmund", "sur": "Ehrlich"}"#]);
        let index = NamePartIndex::build(&reference);
        let policy = BlockingPolicy::MaxScoreTopK { block_size: 1 };
        let board = policy.score(&["Zygmund", "Ehriykh"], &index, &Metric::JaroWinkler, Universe::All);
        assert!(board.get(0).unwrap() > 0.7);
        let block = policy.select(&board, Universe::All, None);
        assert_eq!(block.len(), 1);
        assert_eq!(block[0].record, 0);
    }

    #[test]
    fn test_validate() {
        assert!(BlockingPolicy::MaxScoreTopK { block_size: 0 }.validate().is_err());
        assert!(BlockingPolicy::UnionThreshold {
            similarity_threshold: 1.5
        }
        .validate()
        .is_err());
        assert!(BlockingPolicy::ThresholdCountTopK {
            block_size: 5,
            similarity_threshold: -0.1
        }
        .validate()
        .is_err());
        assert!(BlockingPolicy::AssignmentTopK { block_size: 1 }.validate().is_ok());
    }

    #[test]
    fn test_policy_kind_names() {
        for kind in [
            PolicyKind::UnionThreshold,
            PolicyKind::MaxScore,
            PolicyKind::NormalizedSum,
            PolicyKind::Assignment,
            PolicyKind::ThresholdCount,
        ] {
            assert_eq!(kind.name().parse::<PolicyKind>(), Ok(kind));
        }
        assert!("hungarian".parse::<PolicyKind>().is_err());
    }
}
