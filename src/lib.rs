//! Candidate blocking for person-name record linkage.
//!
//! Records carry labeled name parts (`given-name`, `surname`, ...). Every
//! distinct part value of the reference dataset is indexed; each query record
//! is scored against the index with a string similarity and a
//! [`BlockingPolicy`] decides which reference records land in its block.
//! Blocks are then evaluated against known matches, and can be narrowed
//! further with externally judged pairs.
//!
//! ```no_run
//! use name_blocking::{build_blocks, evaluate, BlockingPolicy, Dataset, GroundTruth};
//!
//! let query = Dataset::from_raw([r#"{"given-name": "Zygmund", "surname": "Ehrlich"}"#]);
//! let reference = Dataset::from_raw([r#"{"given-name": "Zigmund", "surname": "Erlich"}"#]);
//! let blocks = build_blocks(
//!     &query,
//!     &reference,
//!     BlockingPolicy::MaxScoreTopK { block_size: 10 },
//!     false,
//! )?;
//! let truth = GroundTruth::from_pairs([(0, 0)]);
//! let report = evaluate(&blocks, &truth, query.len(), reference.len(), 1.0)?;
//! assert_eq!(report.recall, 1.0);
//! # Ok::<(), name_blocking::Error>(())
//! ```

pub mod assignment;
pub mod blocks;
pub mod builder;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod ground_truth;
pub mod index;
pub mod io;
pub mod labels;
pub mod policy;
pub mod progress;
pub mod record;
pub mod response;
pub mod similarity;

#[cfg(feature = "python")]
mod python;

pub use blocks::Blocks;
pub use builder::{build_blocks, BlockBuilder};
pub use config::{BlockingConfig, RunConfig};
pub use error::{ConfigError, Error, EvalError, LoadError, NamePartsError, ResponseError, Result};
pub use evaluate::{
    evaluate, f_beta, missed_matches, precision, recall, reduction_ratio, EvaluationReport,
    MissedMatches,
};
pub use ground_truth::GroundTruth;
pub use index::NamePartIndex;
pub use policy::{BlockingPolicy, PolicyKind, ScoredCandidate};
pub use progress::{LogProgress, NoProgress, ProgressObserver};
pub use record::{Dataset, NameParts, Record, RecordId};
pub use similarity::{Metric, SimilarityScorer};
