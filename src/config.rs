use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, LoadError};
use crate::policy::{BlockingPolicy, PolicyKind};
use crate::similarity::Metric;

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// Policy selection and its tuning knobs, as written in a `[blocking]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockingConfig {
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,
    /// Used by `union_threshold` and `threshold_count`.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Used by every top-k policy.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub metric: Metric,
    /// Query and reference are one dataset; never block a record with itself.
    #[serde(default)]
    pub same_dataset: bool,
}

fn default_policy() -> PolicyKind {
    PolicyKind::MaxScore
}

fn default_threshold() -> f64 {
    0.65
}

fn default_block_size() -> usize {
    200
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            similarity_threshold: default_threshold(),
            block_size: default_block_size(),
            metric: Metric::default(),
            same_dataset: false,
        }
    }
}

impl BlockingConfig {
    /// The validated policy this config selects.
    pub fn policy(&self) -> Result<BlockingPolicy, ConfigError> {
        let policy = match self.policy {
            PolicyKind::UnionThreshold => BlockingPolicy::UnionThreshold {
                similarity_threshold: self.similarity_threshold,
            },
            PolicyKind::MaxScore => BlockingPolicy::MaxScoreTopK {
                block_size: self.block_size,
            },
            PolicyKind::NormalizedSum => BlockingPolicy::NormalizedSumTopK {
                block_size: self.block_size,
            },
            PolicyKind::Assignment => BlockingPolicy::AssignmentTopK {
                block_size: self.block_size,
            },
            PolicyKind::ThresholdCount => BlockingPolicy::ThresholdCountTopK {
                block_size: self.block_size,
                similarity_threshold: self.similarity_threshold,
            },
        };
        policy.validate()?;
        Ok(policy)
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Column names of a person dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetColumns {
    #[serde(default = "default_name_parts_column")]
    pub name_parts: String,
    /// Shown in missed-match reports.
    #[serde(default = "default_title_column")]
    pub title: Option<String>,
    #[serde(default = "default_id_column")]
    pub id: Option<String>,
}

fn default_name_parts_column() -> String {
    "name_parts".to_string()
}

fn default_title_column() -> Option<String> {
    Some("title".to_string())
}

fn default_id_column() -> Option<String> {
    Some("id".to_string())
}

impl Default for DatasetColumns {
    fn default() -> Self {
        Self {
            name_parts: default_name_parts_column(),
            title: default_title_column(),
            id: default_id_column(),
        }
    }
}

fn default_delimiter() -> char {
    '\t'
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Dataset whose records receive blocks.
    pub query: PathBuf,
    /// Dataset candidates are drawn from; the query dataset when absent.
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub columns: DatasetColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthConfig {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Column holding query record ids.
    pub key_column: String,
    /// Column holding matching reference record ids.
    pub value_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_beta")]
    pub beta: f64,
}

fn default_beta() -> f64 {
    1.0
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            beta: default_beta(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

impl OutputConfig {
    pub fn blocks_path(&self) -> PathBuf {
        self.directory.join("blocks.json")
    }

    pub fn missed_matches_path(&self) -> PathBuf {
        self.directory.join("missed_matches.tsv")
    }
}

// ---------------------------------------------------------------------------
// Top-level run config
// ---------------------------------------------------------------------------

/// Everything needed for a block-then-evaluate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub ground_truth: Option<GroundTruthConfig>,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.blocking.policy()?;
        let beta = self.evaluation.beta;
        if !(beta.is_finite() && beta > 0.0) {
            return Err(ConfigError::Beta(beta));
        }
        Ok(())
    }

    /// True when blocking runs a dataset against itself.
    pub fn same_dataset(&self) -> bool {
        self.blocking.same_dataset
            || self
                .input
                .reference
                .as_ref()
                .map_or(true, |reference| reference == &self.input.query)
    }
}
