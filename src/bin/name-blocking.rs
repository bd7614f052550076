//! Command-line entry point for name-part blocking.
//!
//! # Examples
//!
//! Block one dataset against another:
//! ```bash
//! name-blocking block --query LASKI.tsv --reference Zylbercweig.tsv --policy assignment --block-size 100
//! ```
//!
//! Evaluate the result:
//! ```bash
//! name-blocking evaluate --blocks blocks.json --query LASKI.tsv --reference Zylbercweig.tsv \
//!     --ground-truth em.tsv --key-column index_LASKI --value-column index_roman
//! ```
//!
//! Everything at once from a config file:
//! ```bash
//! name-blocking run --config blocking.toml
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use name_blocking::config::{DatasetColumns, GroundTruthConfig};
use name_blocking::response::{filter_requests, BatchOutput};
use name_blocking::{
    evaluate, io, missed_matches, BlockBuilder, BlockingConfig, Blocks, Dataset, LogProgress,
    Metric, PolicyKind, RunConfig,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "name-blocking",
    version,
    about = "Candidate blocking for person-name record linkage"
)]
struct Cli {
    /// Log level, overridden by RUST_LOG
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log progress at debug level instead of drawing a bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build blocks and write them as JSON
    Block(BlockArgs),
    /// Score blocks against ground truth
    Evaluate(EvaluateArgs),
    /// Narrow blocks with judged pairs from a batch output file
    Refine(RefineArgs),
    /// Block, then evaluate, as described by a TOML config
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct DatasetArgs {
    /// Dataset whose records receive blocks
    #[arg(long, value_name = "FILE")]
    query: PathBuf,

    /// Dataset candidates are drawn from; the query dataset when omitted
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    #[arg(long, default_value = "\t")]
    delimiter: char,

    #[arg(long, default_value = "name_parts")]
    name_parts_column: String,

    #[arg(long, default_value = "title")]
    title_column: String,

    #[arg(long, default_value = "id")]
    id_column: String,
}

impl DatasetArgs {
    fn columns(&self) -> DatasetColumns {
        DatasetColumns {
            name_parts: self.name_parts_column.clone(),
            title: Some(self.title_column.clone()),
            id: Some(self.id_column.clone()),
        }
    }

    /// Load both datasets; the second is `None` when query and reference coincide.
    fn load(&self) -> Result<(Dataset, Option<Dataset>)> {
        load_datasets(
            &self.query,
            self.reference.as_deref(),
            self.delimiter,
            &self.columns(),
        )
    }
}

#[derive(Debug, Args)]
struct PolicyArgs {
    /// union_threshold, max_score, normalized_sum, assignment or threshold_count
    #[arg(long)]
    policy: Option<PolicyKind>,

    #[arg(long, value_name = "N")]
    block_size: Option<usize>,

    #[arg(long, value_name = "T")]
    similarity_threshold: Option<f64>,

    #[arg(long)]
    metric: Option<Metric>,

    /// Never block a record with itself
    #[arg(long)]
    same_dataset: bool,
}

impl PolicyArgs {
    fn apply(&self, config: &mut BlockingConfig) {
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(threshold) = self.similarity_threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(metric) = self.metric {
            config.metric = metric;
        }
        if self.same_dataset {
            config.same_dataset = true;
        }
    }
}

#[derive(Debug, Args)]
struct BlockArgs {
    #[command(flatten)]
    data: DatasetArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    #[arg(short, long, value_name = "FILE", default_value = "blocks.json")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    #[arg(long, value_name = "FILE")]
    blocks: PathBuf,

    #[command(flatten)]
    data: DatasetArgs,

    #[arg(long, value_name = "FILE")]
    ground_truth: PathBuf,

    /// Ground-truth column holding query record ids
    #[arg(long)]
    key_column: String,

    /// Ground-truth column holding reference record ids
    #[arg(long)]
    value_column: String,

    #[arg(long, default_value = "\t")]
    ground_truth_delimiter: char,

    #[arg(long, default_value = "1.0")]
    beta: f64,

    #[arg(long, value_name = "FILE", default_value = "missed_matches.tsv")]
    missed_matches: PathBuf,
}

#[derive(Debug, Args)]
struct RefineArgs {
    #[arg(long, value_name = "FILE")]
    blocks: PathBuf,

    /// Batch output JSONL with one verdict per pair or per query
    #[arg(long, value_name = "FILE")]
    responses: Option<PathBuf>,

    /// Batch request JSONL to restrict to pairs still in the blocks
    #[arg(long, value_name = "FILE", requires = "filtered_requests")]
    requests: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    filtered_requests: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE", default_value = "refined_blocks.json")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    #[command(flatten)]
    policy: PolicyArgs,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} records")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn load_datasets(
    query: &Path,
    reference: Option<&Path>,
    delimiter: char,
    columns: &DatasetColumns,
) -> Result<(Dataset, Option<Dataset>)> {
    let query_data = io::read_dataset(query, delimiter, columns)?;
    let reference_data = match reference {
        Some(path) if path != query => Some(io::read_dataset(path, delimiter, columns)?),
        _ => None,
    };
    Ok((query_data, reference_data))
}

fn build(
    query: &Dataset,
    reference: Option<&Dataset>,
    config: &BlockingConfig,
    no_progress: bool,
) -> Result<Blocks> {
    let policy = config.policy()?;
    let same_dataset = config.same_dataset || reference.is_none();
    let reference = reference.unwrap_or(query);

    info!(
        policy = %policy.kind(),
        metric = %config.metric,
        queries = query.len(),
        references = reference.len(),
        same_dataset,
        "blocking"
    );

    let builder = BlockBuilder::new(policy)?
        .with_scorer(config.metric)
        .same_dataset(same_dataset);
    let started = Instant::now();
    let blocks = if no_progress {
        builder
            .with_observer(LogProgress::default())
            .build(query, reference)
    } else {
        let pb = create_progress_bar(query.len())?;
        let blocks = builder
            .with_observer(|current: usize, _total: usize| pb.set_position(current as u64))
            .build(query, reference);
        pb.finish_and_clear();
        blocks
    };

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "blocking finished");
    Ok(blocks)
}

fn report(
    blocks: &Blocks,
    truth: &name_blocking::GroundTruth,
    query: &Dataset,
    reference: &Dataset,
    beta: f64,
    missed_path: &Path,
) -> Result<()> {
    let report = evaluate(blocks, truth, query.len(), reference.len(), beta)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let missed = missed_matches(blocks, truth)?;
    if !missed.is_empty() {
        warn!(queries = missed.len(), "some ground-truth matches are not in their block");
    }
    io::write_missed_matches_file(missed_path, &missed, query, reference)?;
    Ok(())
}

fn run_block(args: &BlockArgs, no_progress: bool) -> Result<()> {
    let mut config = BlockingConfig::default();
    args.policy.apply(&mut config);

    let (query, reference) = args.data.load()?;
    let blocks = build(&query, reference.as_ref(), &config, no_progress)?;
    io::write_blocks(&args.output, &blocks)?;
    Ok(())
}

fn run_evaluate(args: &EvaluateArgs) -> Result<()> {
    if !(args.beta.is_finite() && args.beta > 0.0) {
        bail!("--beta must be positive, got {}", args.beta);
    }
    let blocks = io::read_blocks(&args.blocks)?;
    let (query, reference) = args.data.load()?;
    let truth = io::read_ground_truth(&GroundTruthConfig {
        path: args.ground_truth.clone(),
        delimiter: args.ground_truth_delimiter,
        key_column: args.key_column.clone(),
        value_column: args.value_column.clone(),
    })?;
    report(
        &blocks,
        &truth,
        &query,
        reference.as_ref().unwrap_or(&query),
        args.beta,
        &args.missed_matches,
    )
}

fn run_refine(args: &RefineArgs) -> Result<()> {
    if args.responses.is_none() && args.requests.is_none() {
        bail!("nothing to do: pass --responses and/or --requests");
    }
    let blocks = io::read_blocks(&args.blocks)?;

    if let (Some(requests), Some(filtered)) = (&args.requests, &args.filtered_requests) {
        let lines = io::read_lines(requests)?;
        let kept = filter_requests(lines.iter().map(String::as_str), &blocks)
            .with_context(|| format!("Failed to filter {}", requests.display()))?;
        info!(total = lines.len(), kept = kept.len(), "filtered batch requests");
        let mut text = kept.join("\n");
        text.push('\n');
        fs::write(filtered, text)
            .with_context(|| format!("Failed to write {}", filtered.display()))?;
    }

    if let Some(responses) = &args.responses {
        let lines = io::read_lines(responses)?;
        let output = BatchOutput::parse(lines.iter().map(String::as_str))
            .with_context(|| format!("Failed to parse {}", responses.display()))?;
        let refined = output.apply(&blocks);
        info!(
            before = blocks.candidate_count(),
            after = refined.candidate_count(),
            "refined blocks"
        );
        io::write_blocks(&args.output, &refined)?;
    }
    Ok(())
}

fn run_config(args: &RunArgs, no_progress: bool) -> Result<()> {
    let mut config = RunConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    args.policy.apply(&mut config.blocking);
    config.validate()?;

    let input = &config.input;
    let (query, reference) = load_datasets(
        &input.query,
        input.reference.as_deref(),
        input.delimiter,
        &input.columns,
    )?;
    let blocks = build(&query, reference.as_ref(), &config.blocking, no_progress)?;
    io::write_blocks(&config.output.blocks_path(), &blocks)?;

    match &config.ground_truth {
        Some(truth_config) => {
            let truth = io::read_ground_truth(truth_config)?;
            report(
                &blocks,
                &truth,
                &query,
                reference.as_ref().unwrap_or(&query),
                config.evaluation.beta,
                &config.output.missed_matches_path(),
            )
        }
        None => {
            info!("no ground truth configured, skipping evaluation");
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match &cli.command {
        Command::Block(args) => run_block(args, cli.no_progress),
        Command::Evaluate(args) => run_evaluate(args),
        Command::Refine(args) => run_refine(args),
        Command::Run(args) => run_config(args, cli.no_progress),
    }
}
