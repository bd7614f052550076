use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::blocks::Blocks;
use crate::builder::BlockBuilder;
use crate::config::BlockingConfig;
use crate::evaluate;
use crate::ground_truth::GroundTruth;
use crate::policy::PolicyKind;
use crate::record::{Dataset, RecordId};
use crate::similarity::Metric;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Blocking quality figures
#[pyclass]
struct EvaluationSummary {
    #[pyo3(get)]
    found: usize,
    #[pyo3(get)]
    total_matches: usize,
    #[pyo3(get)]
    candidates: usize,
    #[pyo3(get)]
    recall: f64,
    #[pyo3(get)]
    precision: f64,
    #[pyo3(get)]
    reduction_ratio: f64,
    #[pyo3(get)]
    f_beta: Option<f64>,
}

/// Jaro-Winkler similarity of two strings in [0, 1]
#[pyfunction]
fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// Build blocks from raw name-parts JSON strings.
///
/// Without `reference`, the query records are blocked against each other and
/// never against themselves.
#[pyfunction]
#[pyo3(signature = (query, reference=None, policy="max_score", block_size=200, similarity_threshold=0.65, metric="jaro_winkler"))]
fn build_blocks(
    py: Python,
    query: Vec<String>,
    reference: Option<Vec<String>>,
    policy: &str,
    block_size: usize,
    similarity_threshold: f64,
    metric: &str,
) -> PyResult<HashMap<RecordId, Vec<RecordId>>> {
    let metric: Metric = metric.parse().map_err(value_error)?;
    let config = BlockingConfig {
        policy: policy.parse::<PolicyKind>().map_err(value_error)?,
        similarity_threshold,
        block_size,
        metric,
        same_dataset: reference.is_none(),
    };
    let policy = config.policy().map_err(value_error)?;

    let blocks = py.allow_threads(|| -> PyResult<Blocks> {
        let query = Dataset::from_raw(query);
        let builder = BlockBuilder::new(policy)
            .map_err(value_error)?
            .with_scorer(config.metric)
            .same_dataset(config.same_dataset);
        Ok(match reference {
            Some(reference) => builder.build(&query, &Dataset::from_raw(reference)),
            None => builder.build(&query, &query),
        })
    })?;

    Ok(blocks
        .iter()
        .map(|(query, block)| (query, block.to_vec()))
        .collect())
}

fn to_blocks(blocks: HashMap<RecordId, Vec<RecordId>>) -> Blocks {
    blocks.into_iter().collect()
}

/// Recall, precision, reduction ratio and F-beta of `blocks`
#[pyfunction]
#[pyo3(signature = (blocks, ground_truth, query_len, reference_len, beta=1.0))]
fn evaluate_blocks(
    blocks: HashMap<RecordId, Vec<RecordId>>,
    ground_truth: Vec<(RecordId, RecordId)>,
    query_len: usize,
    reference_len: usize,
    beta: f64,
) -> PyResult<EvaluationSummary> {
    let truth = GroundTruth::from_pairs(ground_truth);
    let report = evaluate::evaluate(&to_blocks(blocks), &truth, query_len, reference_len, beta)
        .map_err(value_error)?;
    Ok(EvaluationSummary {
        found: report.found,
        total_matches: report.total_matches,
        candidates: report.candidates,
        recall: report.recall,
        precision: report.precision,
        reduction_ratio: report.reduction_ratio,
        f_beta: report.f_beta,
    })
}

/// Ground-truth matches missing from `blocks`, per query id
#[pyfunction]
fn find_missed_matches(
    blocks: HashMap<RecordId, Vec<RecordId>>,
    ground_truth: Vec<(RecordId, RecordId)>,
) -> PyResult<HashMap<RecordId, Vec<RecordId>>> {
    let truth = GroundTruth::from_pairs(ground_truth);
    let missed = evaluate::missed_matches(&to_blocks(blocks), &truth).map_err(value_error)?;
    Ok(missed
        .into_iter()
        .map(|(query, refs)| (query, refs.into_iter().collect()))
        .collect())
}

/// Name-part blocking implemented in Rust.
#[pymodule]
fn name_blocking(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(jaro_winkler_similarity, m)?)?;
    m.add_function(wrap_pyfunction!(build_blocks, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_blocks, m)?)?;
    m.add_function(wrap_pyfunction!(find_missed_matches, m)?)?;
    m.add_class::<EvaluationSummary>()?;
    Ok(())
}
