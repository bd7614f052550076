use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::RecordId;

/// A record's name-parts field could not be decoded.
///
/// This is an expected, per-record condition: callers log it and skip the
/// record rather than aborting the scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamePartsError {
    #[error("name parts are not valid JSON: {0}")]
    Syntax(String),
    #[error("name parts must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("name part '{category}' is not a string")]
    NonStringValue { category: String },
}

/// Evaluation was asked about a record the blocking phase never produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("ground truth references query record {query_id}, which has no block entry")]
    MissingBlock { query_id: RecordId },
}

/// Invalid blocking or run configuration. Raised before any scan starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("similarity_threshold must lie in [0, 1], got {0}")]
    Threshold(f64),
    #[error("block_size must be positive for policy '{policy}'")]
    BlockSize { policy: &'static str },
    #[error("beta must be positive and finite, got {0}")]
    Beta(f64),
}

/// Failure while reading or writing one of the tabular / JSON inputs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: delimiter '{delimiter}' is not a single ASCII character", path.display())]
    Delimiter { path: PathBuf, delimiter: char },
    #[error("{}: missing column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("{}: row {row}, column '{column}': '{value}' is not a record id", path.display())]
    InvalidId {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
}

/// A judgment or batch line that does not follow the `"<query>#<candidate>"` contract.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("malformed pair key '{0}', expected '<query_id>#<candidate_id>'")]
    PairKey(String),
    #[error("malformed record id '{0}' in custom_id")]
    RecordId(String),
    #[error("batch response line has no message content")]
    MissingContent,
    #[error("batch response line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    NameParts(#[from] NamePartsError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Response(#[from] ResponseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
