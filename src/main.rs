use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use estate_normalizer::{
    CanonicalRecord, FieldResolver, FinalizeOutcome, MatchMode, RawValue, RecordConfig,
};

/// Normalizes raw per-unit listing data into canonical records.
///
/// The input file is a JSON array of label -> value objects as produced by a
/// source adapter; accepted records are printed as a JSON array on stdout.
#[derive(Parser)]
#[command(name = "estate-normalizer", version)]
struct Cli {
    /// JSON file with one label/value object per unit
    #[arg(long)]
    input: PathBuf,

    /// Optional TOML file with per-source normalization settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Require labels to match synonyms exactly instead of by substring
    #[arg(long)]
    exact: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    estate_normalizer::logging::init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RecordConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RecordConfig::default(),
    };

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let units: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&raw).context("input must be a JSON array of objects")?;

    let mode = if cli.exact {
        MatchMode::Exact
    } else {
        MatchMode::Substring
    };
    let resolver = FieldResolver::new(mode);

    let mut accepted = Vec::new();
    let mut rejected = 0usize;
    for (index, unit) in units.iter().enumerate() {
        match normalize_unit(&resolver, config.clone(), unit) {
            Ok(Some(exported)) => accepted.push(exported),
            Ok(None) => rejected += 1,
            Err(error) => {
                warn!(index, %error, "unit failed normalization");
                rejected += 1;
            }
        }
    }
    info!(
        accepted = accepted.len(),
        rejected,
        total = units.len(),
        "normalization finished"
    );

    let output = if cli.pretty {
        serde_json::to_string_pretty(&accepted)?
    } else {
        serde_json::to_string(&accepted)?
    };
    println!("{output}");
    Ok(())
}

fn normalize_unit(
    resolver: &FieldResolver,
    config: RecordConfig,
    unit: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<Option<serde_json::Value>> {
    let mut record = CanonicalRecord::new(config);
    let pairs: Vec<(&str, RawValue)> = unit
        .iter()
        .map(|(label, value)| (label.as_str(), RawValue::from_json(value)))
        .collect();
    resolver.apply_mapping(&mut record, pairs.iter().map(|(l, v)| (*l, v)))?;

    match record.finalize()? {
        FinalizeOutcome::Accepted => Ok(Some(record.export())),
        FinalizeOutcome::Rejected(reason) => {
            warn!(?reason, "record rejected");
            Ok(None)
        }
    }
}
