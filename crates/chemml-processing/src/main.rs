//! CLI entry point for the chemistry dataset engine.

use anyhow::{Context, Result, anyhow, bail};
use chemml_processing::{
    ColumnKind, Dataset, DatasetEngine, DescriptorKind, EngineConfig, FilterCondition, FilterSpec,
    FingerprintKind, HistoryItem, ImputeStrategy, Operation, RowPolicy, SessionLog,
};
use clap::{Parser, ValueEnum};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// CLI-compatible row policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRowPolicy {
    /// Fail on the first unparseable SMILES
    Reject,
    /// Replace unparseable SMILES with a missing value
    SetMissing,
    /// Leave unparseable text untouched
    KeepOriginal,
}

impl From<CliRowPolicy> for RowPolicy {
    fn from(cli: CliRowPolicy) -> Self {
        match cli {
            CliRowPolicy::Reject => RowPolicy::Reject,
            CliRowPolicy::SetMissing => RowPolicy::SetMissing,
            CliRowPolicy::KeepOriginal => RowPolicy::KeepOriginal,
        }
    }
}

/// CLI-compatible descriptor enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliDescriptor {
    /// Average molecular weight
    Mw,
    /// Monoisotopic molecular weight
    ExactMw,
    /// Crippen-style octanol/water partition coefficient
    Logp,
    /// Topological polar surface area
    Tpsa,
    /// Hydrogen bond donors
    Hbd,
    /// Hydrogen bond acceptors
    Hba,
    /// Rotatable bonds
    Rotb,
    /// Ring count
    Rings,
    /// Heavy atom count
    HeavyAtoms,
}

impl From<CliDescriptor> for DescriptorKind {
    fn from(cli: CliDescriptor) -> Self {
        match cli {
            CliDescriptor::Mw => DescriptorKind::MolecularWeight,
            CliDescriptor::ExactMw => DescriptorKind::ExactMolecularWeight,
            CliDescriptor::Logp => DescriptorKind::LogP,
            CliDescriptor::Tpsa => DescriptorKind::TopologicalPolarSurfaceArea,
            CliDescriptor::Hbd => DescriptorKind::HBondDonors,
            CliDescriptor::Hba => DescriptorKind::HBondAcceptors,
            CliDescriptor::Rotb => DescriptorKind::RotatableBonds,
            CliDescriptor::Rings => DescriptorKind::RingCount,
            CliDescriptor::HeavyAtoms => DescriptorKind::HeavyAtomCount,
        }
    }
}

/// CLI-compatible fingerprint enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFingerprint {
    /// Circular fingerprint, radius 2
    Ecfp4,
    /// Circular fingerprint, radius 3
    Ecfp6,
    /// 167-bit structural keys
    Maccs,
}

impl CliFingerprint {
    fn kind(self, bits: usize) -> FingerprintKind {
        match self {
            CliFingerprint::Ecfp4 => FingerprintKind::Morgan { radius: 2, n_bits: bits },
            CliFingerprint::Ecfp6 => FingerprintKind::Morgan { radius: 3, n_bits: bits },
            CliFingerprint::Maccs => FingerprintKind::Maccs,
        }
    }
}

/// CLI-compatible imputation strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliImputation {
    /// Mean of observed values (numeric columns)
    Mean,
    /// Median of observed values (numeric columns)
    Median,
    /// Zero (numeric columns)
    Zero,
    /// Most frequent value (every column)
    Mode,
}

impl From<CliImputation> for ImputeStrategy {
    fn from(cli: CliImputation) -> Self {
        match cli {
            CliImputation::Mean => ImputeStrategy::Mean,
            CliImputation::Median => ImputeStrategy::Median,
            CliImputation::Zero => ImputeStrategy::Zero,
            CliImputation::Mode => ImputeStrategy::Mode,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Chemistry dataset transformation engine",
    long_about = "Apply replayable transformations and SMILES-derived features to a CSV dataset.\n\n\
                  EXAMPLES:\n  \
                  # Inspect columns and detected SMILES columns\n  \
                  chemml -i molecules.csv --dry-run\n\n  \
                  # Canonicalize and add descriptors and fingerprints\n  \
                  chemml -i molecules.csv --canonicalize --descriptor mw --descriptor logp --fingerprint ecfp4\n\n  \
                  # Filter rows and replay a saved session on new data\n  \
                  chemml -i molecules.csv --filter 'mw:less_than:500'\n  \
                  chemml -i other.csv --replay outputs/molecules_session.json"
)]
struct Args {
    /// Path to the CSV file to process
    #[arg(short, long)]
    input: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// SMILES column to operate on (default: every detected SMILES column)
    #[arg(short, long)]
    smiles_column: Option<String>,

    /// Print column kinds and detected SMILES columns without processing
    #[arg(long)]
    dry_run: bool,

    /// Canonicalize SMILES columns
    #[arg(long)]
    canonicalize: bool,

    /// What to do with unparseable SMILES during canonicalization
    #[arg(long, value_enum, default_value = "set-missing")]
    row_policy: CliRowPolicy,

    /// Descriptor columns to add (repeatable)
    #[arg(short, long, value_enum)]
    descriptor: Vec<CliDescriptor>,

    /// Add every descriptor
    #[arg(long)]
    all_descriptors: bool,

    /// Fingerprint columns to add
    #[arg(short, long, value_enum)]
    fingerprint: Option<CliFingerprint>,

    /// Folded length of circular fingerprints
    #[arg(long, default_value = "1024")]
    fp_bits: usize,

    /// Fill missing values in every column that has them
    #[arg(long, value_enum)]
    impute: Option<CliImputation>,

    /// Keep rows matching COLUMN:CONDITION[:VALUE] (repeatable), e.g.
    /// `mw:less_than:500` or `name:is_present`
    #[arg(long)]
    filter: Vec<String>,

    /// Columns to drop (repeatable)
    #[arg(long)]
    drop: Vec<String>,

    /// Replay a saved session log instead of the operation flags
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Minimum fraction of sampled values that must parse for SMILES detection
    #[arg(long, default_value = "0.8")]
    smiles_threshold: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and the final result)
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON to stdout
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// Logging is disabled entirely with `--json` so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[derive(Debug, Serialize)]
struct RunSummary {
    input_file: String,
    output_file: String,
    session_log: String,
    rows_before: usize,
    columns_before: usize,
    rows_after: usize,
    columns_after: usize,
    smiles_columns: Vec<String>,
    operations: Vec<String>,
    history: Vec<HistoryItem>,
    cache_hits: u64,
    cache_misses: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    info!("Loading dataset from: {}", args.input);
    let frame = load_csv(&args.input)?;
    info!("Dataset loaded successfully: {:?}", frame.shape());

    let dataset = Dataset::new(frame);
    let engine = match &args.replay {
        Some(path) if !args.dry_run => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read session log {}", path.display()))?;
            let log = SessionLog::from_json(&text)?;
            info!(
                "Replaying {} operations under the logged configuration",
                log.operations.len()
            );
            DatasetEngine::builder().replay(dataset, &log)?
        }
        _ => {
            let config = EngineConfig::builder()
                .smiles_detection_threshold(args.smiles_threshold)
                .build()?;
            let engine = DatasetEngine::builder().config(config).build(dataset)?;
            if args.dry_run {
                print_dry_run(&args, &engine.initial_dataset())?;
                return Ok(());
            }
            for operation in plan_operations(&args, &engine)? {
                engine.apply_operation(operation)?;
            }
            engine
        }
    };

    write_outputs(&args, &engine)
}

/// Translate the operation flags into operations, in a fixed order:
/// filters, canonicalization, descriptors, fingerprints, imputation, drops.
fn plan_operations(args: &Args, engine: &DatasetEngine) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();

    for expression in &args.filter {
        operations.push(Operation::filter(parse_filter(expression)?));
    }

    let smiles_columns: Vec<String> = match &args.smiles_column {
        Some(column) => vec![column.clone()],
        None => engine.initial_dataset().smiles_columns().iter().cloned().collect(),
    };
    let wants_features =
        args.canonicalize || args.all_descriptors || !args.descriptor.is_empty() || args.fingerprint.is_some();
    if smiles_columns.is_empty() && wants_features {
        warn!("No SMILES columns detected; skipping chemistry operations");
    }

    let descriptors: Vec<DescriptorKind> = if args.all_descriptors {
        DescriptorKind::ALL.to_vec()
    } else {
        args.descriptor.iter().map(|&d| d.into()).collect()
    };

    for column in &smiles_columns {
        if args.canonicalize {
            operations.push(Operation::canonicalize(column, args.row_policy.into()));
        }
        for &kind in &descriptors {
            operations.push(Operation::add_descriptor(column, kind));
        }
        if let Some(fingerprint) = args.fingerprint {
            operations.push(Operation::add_fingerprint(column, fingerprint.kind(args.fp_bits)));
        }
    }

    if let Some(strategy) = args.impute {
        operations.push(Operation::ImputeAll {
            strategy: strategy.into(),
        });
    }

    for column in &args.drop {
        operations.push(Operation::drop_column(column));
    }

    Ok(operations)
}

/// Parse `COLUMN:CONDITION[:VALUE]`. The value may itself contain colons.
fn parse_filter(expression: &str) -> Result<FilterSpec> {
    let mut parts = expression.splitn(3, ':');
    let column = parts.next().filter(|c| !c.is_empty());
    let condition = parts.next();
    let (Some(column), Some(condition)) = (column, condition) else {
        bail!("Filter '{expression}' must look like COLUMN:CONDITION[:VALUE]");
    };
    let condition: FilterCondition =
        serde_json::from_value(serde_json::Value::String(condition.replace('-', "_")))
            .map_err(|_| anyhow!("Unknown filter condition '{condition}'"))?;
    Ok(FilterSpec::new(column, condition, parts.next().unwrap_or_default()))
}

fn print_dry_run(args: &Args, dataset: &Dataset) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Column overview");
    println!("{}\n", "=".repeat(80));
    println!("  File: {}", args.input);
    println!("  Rows: {}", dataset.height());
    println!("  Columns: {}", dataset.width());
    println!();

    println!("{:<30} {:<12} {:<10}", "Column", "Kind", "Missing");
    println!("{}", "-".repeat(55));
    for name in dataset.column_names() {
        let kind = dataset.column_kind(&name)?;
        let missing = dataset.column(&name)?.null_count();
        println!("{:<30} {:<12} {:<10}", truncate_str(&name, 29), kind, missing);
    }
    println!();

    let smiles: Vec<&String> = dataset.smiles_columns().iter().collect();
    if smiles.is_empty() {
        println!("  No SMILES columns detected");
    } else {
        println!("  SMILES columns: {smiles:?}");
    }
    let numeric = dataset
        .column_names()
        .into_iter()
        .filter(|name| matches!(dataset.column_kind(name), Ok(ColumnKind::Numeric)))
        .count();
    println!("  Numeric columns: {numeric}");
    println!("{}", "=".repeat(80));
    Ok(())
}

fn write_outputs(args: &Args, engine: &DatasetEngine) -> Result<()> {
    let output_dir = Path::new(&args.output);
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir)?;
        info!("Created output directory: {}", args.output);
    }

    let stem = extract_file_stem(&args.input);
    let csv_path = output_dir.join(format!("{stem}_processed.csv"));
    let log_path = output_dir.join(format!("{stem}_session.json"));

    let initial = engine.initial_dataset();
    let current = engine.current_dataset();
    let mut frame = current.frame().clone();
    let mut file = std::fs::File::create(&csv_path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut frame)?;
    info!("Dataset written to: {}", csv_path.display());

    std::fs::write(&log_path, engine.session_log().to_json()?)?;
    info!("Session log written to: {}", log_path.display());

    let stats = engine.extractor().cache_stats();
    let summary = RunSummary {
        input_file: args.input.clone(),
        output_file: csv_path.display().to_string(),
        session_log: log_path.display().to_string(),
        rows_before: initial.height(),
        columns_before: initial.width(),
        rows_after: current.height(),
        columns_after: current.width(),
        smiles_columns: current.smiles_columns().iter().cloned().collect(),
        operations: engine.operations().iter().map(Operation::describe).collect(),
        history: engine.history_items(),
        cache_hits: stats.hits,
        cache_misses: stats.misses,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_human_readable_summary(&summary);
    }
    Ok(())
}

fn print_human_readable_summary(summary: &RunSummary) {
    println!();
    println!("{}", "=".repeat(80));
    println!("PROCESSING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!(
        "Input:  {} ({} rows x {} columns)",
        summary.input_file, summary.rows_before, summary.columns_before
    );
    println!(
        "Output: {} ({} rows x {} columns)",
        summary.output_file, summary.rows_after, summary.columns_after
    );
    println!("Session log: {}", summary.session_log);
    println!();

    if summary.operations.is_empty() {
        println!("No operations applied");
    } else {
        println!("Operations:");
        for operation in summary.operations.iter().take(15) {
            println!("  - {operation}");
        }
        if summary.operations.len() > 15 {
            println!("  ... and {} more", summary.operations.len() - 15);
        }
        let undone = summary.history.iter().filter(|item| item.undone).count();
        if undone > 0 {
            println!("  ({undone} undone steps not applied)");
        }
    }
    println!();
    println!(
        "Feature cache: {} hits, {} misses",
        summary.cache_hits, summary.cache_misses
    );
    println!("{}", "=".repeat(80));
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

fn load_csv(path: &str) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .map_err(|e| anyhow!("Failed to read {path}: {e}"))
}
