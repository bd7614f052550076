//! Blocking quality against ground truth.
//!
//! All functions are pure: they read blocks and ground truth and never
//! modify either. A ground-truth query id without a block entry is a broken
//! contract between blocking and evaluation and is reported as
//! [`EvalError::MissingBlock`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use crate::blocks::Blocks;
use crate::error::EvalError;
use crate::ground_truth::GroundTruth;
use crate::record::RecordId;

/// Query id -> confirmed matches the blocks failed to include.
pub type MissedMatches = BTreeMap<RecordId, BTreeSet<RecordId>>;

/// Ground-truth pairs whose reference record is inside the query's block.
pub fn found_matches(blocks: &Blocks, truth: &GroundTruth) -> Result<usize, EvalError> {
    let mut found = 0;
    for (query, references) in truth.iter() {
        let block = blocks
            .get(query)
            .ok_or(EvalError::MissingBlock { query_id: query })?;
        found += references.iter().filter(|&r| block.contains(r)).count();
    }
    Ok(found)
}

/// Found pairs over all ground-truth pairs; 0 for an empty ground truth.
pub fn recall(blocks: &Blocks, truth: &GroundTruth) -> Result<f64, EvalError> {
    let found = found_matches(blocks, truth)?;
    Ok(ratio(found, truth.pair_count()))
}

/// Found pairs over all emitted candidates; 0 when no candidates were emitted.
pub fn precision(blocks: &Blocks, truth: &GroundTruth) -> Result<f64, EvalError> {
    let found = found_matches(blocks, truth)?;
    Ok(ratio(found, blocks.candidate_count()))
}

/// `1 - candidates / (query_len * reference_len)`; 0 when either dataset is empty.
pub fn reduction_ratio(blocks: &Blocks, query_len: usize, reference_len: usize) -> f64 {
    let brute_force = query_len.saturating_mul(reference_len);
    if brute_force == 0 {
        return 0.0;
    }
    1.0 - blocks.candidate_count() as f64 / brute_force as f64
}

/// Weighted harmonic mean of precision and recall.
///
/// `None` when either input is 0, where the measure is undefined.
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> Option<f64> {
    if precision <= 0.0 || recall <= 0.0 {
        return None;
    }
    let beta2 = beta * beta;
    Some((1.0 + beta2) / (beta2 / recall + 1.0 / precision))
}

/// Ground-truth pairs absent from the blocks, grouped by query id.
pub fn missed_matches(blocks: &Blocks, truth: &GroundTruth) -> Result<MissedMatches, EvalError> {
    let mut missed = MissedMatches::new();
    for (query, references) in truth.iter() {
        let block = blocks
            .get(query)
            .ok_or(EvalError::MissingBlock { query_id: query })?;
        let absent: BTreeSet<RecordId> = references
            .iter()
            .copied()
            .filter(|r| !block.contains(r))
            .collect();
        if !absent.is_empty() {
            missed.insert(query, absent);
        }
    }
    Ok(missed)
}

/// Every quality figure for one set of blocks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub found: usize,
    pub total_matches: usize,
    pub candidates: usize,
    pub brute_force: usize,
    pub recall: f64,
    pub precision: f64,
    pub reduction_ratio: f64,
    pub beta: f64,
    pub f_beta: Option<f64>,
    pub largest_block: usize,
    pub smallest_block: usize,
}

/// Compute recall, precision, reduction ratio and F-beta in one pass.
pub fn evaluate(
    blocks: &Blocks,
    truth: &GroundTruth,
    query_len: usize,
    reference_len: usize,
    beta: f64,
) -> Result<EvaluationReport, EvalError> {
    let found = found_matches(blocks, truth)?;
    let total_matches = truth.pair_count();
    let candidates = blocks.candidate_count();
    let recall = ratio(found, total_matches);
    let precision = ratio(found, candidates);

    let report = EvaluationReport {
        found,
        total_matches,
        candidates,
        brute_force: query_len.saturating_mul(reference_len),
        recall,
        precision,
        reduction_ratio: reduction_ratio(blocks, query_len, reference_len),
        beta,
        f_beta: f_beta(precision, recall, beta),
        largest_block: blocks.largest(),
        smallest_block: blocks.smallest(),
    };

    info!(
        found,
        total_matches,
        candidates,
        brute_force = report.brute_force,
        recall,
        precision,
        reduction_ratio = report.reduction_ratio,
        "evaluated blocks"
    );
    Ok(report)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
