use rayon::prelude::*;
use tracing::{debug, info};

use crate::blocks::Blocks;
use crate::error::ConfigError;
use crate::index::NamePartIndex;
use crate::policy::{BlockingPolicy, ScoredCandidate, Universe};
use crate::progress::{NoProgress, ProgressCounter, ProgressObserver};
use crate::record::{Dataset, Record, RecordId};
use crate::similarity::{Metric, SimilarityScorer};

/// Produces a block for every record of a query dataset.
///
/// Query records are processed in parallel; the index is shared read-only
/// and each record gets its own scoreboard.
pub struct BlockBuilder<'a> {
    policy: BlockingPolicy,
    scorer: Box<dyn SimilarityScorer + 'a>,
    same_dataset: bool,
    prefilter: Option<&'a Blocks>,
    observer: Box<dyn ProgressObserver + 'a>,
}

impl<'a> BlockBuilder<'a> {
    /// Jaro-Winkler scoring, distinct datasets, no prefilter. Fails on an invalid policy.
    pub fn new(policy: BlockingPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            scorer: Box::new(Metric::JaroWinkler),
            same_dataset: false,
            prefilter: None,
            observer: Box::new(NoProgress),
        })
    }

    pub fn with_scorer(mut self, scorer: impl SimilarityScorer + 'a) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Query and reference are the same dataset: never block a record with itself.
    pub fn same_dataset(mut self, same_dataset: bool) -> Self {
        self.same_dataset = same_dataset;
        self
    }

    /// Only consider candidates already present in `blocks`.
    pub fn with_prefilter(mut self, blocks: &'a Blocks) -> Self {
        self.prefilter = Some(blocks);
        self
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn policy(&self) -> &BlockingPolicy {
        &self.policy
    }

    /// Index `reference` and block every record of `query` against it.
    pub fn build(&self, query: &Dataset, reference: &Dataset) -> Blocks {
        let index = NamePartIndex::build(reference);
        self.build_with_index(query, &index)
    }

    /// Block every record of `query` against a prebuilt index.
    pub fn build_with_index(&self, query: &Dataset, index: &NamePartIndex) -> Blocks {
        let counter = ProgressCounter::new(query.len(), self.observer.as_ref());

        let blocks: Blocks = query
            .records()
            .par_iter()
            .map(|record| {
                let block = self
                    .rank(record, index)
                    .into_iter()
                    .map(|candidate| candidate.record)
                    .collect();
                counter.tick();
                (record.id, block)
            })
            .collect::<Vec<(RecordId, Vec<RecordId>)>>()
            .into_iter()
            .collect();

        info!(
            policy = %self.policy.kind(),
            queries = blocks.len(),
            candidates = blocks.candidate_count(),
            largest_block = blocks.largest(),
            smallest_block = blocks.smallest(),
            "built blocks"
        );
        blocks
    }

    /// Scored candidates for one query record, in block order.
    ///
    /// A record with malformed name parts yields an empty list.
    pub fn rank(&self, record: &Record, index: &NamePartIndex) -> Vec<ScoredCandidate> {
        let Some(parts) = &record.name_parts else {
            debug!(record = record.id, "no block for record with malformed name parts");
            return Vec::new();
        };

        let universe = match self.prefilter {
            Some(blocks) => Universe::Only(blocks.get(record.id).unwrap_or(&[])),
            None => Universe::All,
        };
        let exclude = self.same_dataset.then_some(record.id);

        let distinct = parts.distinct_values();
        let board = self
            .policy
            .score(&distinct, index, self.scorer.as_ref(), universe);
        self.policy.select(&board, universe, exclude)
    }
}

/// Build blocks with the default Jaro-Winkler scorer.
pub fn build_blocks(
    query: &Dataset,
    reference: &Dataset,
    policy: BlockingPolicy,
    same_dataset: bool,
) -> Result<Blocks, ConfigError> {
    Ok(BlockBuilder::new(policy)?
        .same_dataset(same_dataset)
        .build(query, reference))
}
