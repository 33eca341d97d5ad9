use std::{collections::BTreeMap, path::PathBuf, time::Instant};

use ahp::{
    config::AnalysisConfig,
    hierarchy::{Hierarchy, JudgeResult},
    sensitivity::{Baseline, PrrTable},
};
use anyhow::Context as _;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Simulate a panel of AHP judges and estimate how likely the final ranking is to reverse
/// under random perturbation.
#[derive(Parser, Debug)]
#[clap(name = "simulator")]
struct Args {
    /// TOML analysis config. Defaults are used for anything it leaves out.
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of simulated judges
    #[clap(long)]
    judges: Option<usize>,

    /// Base seed for all random streams
    #[clap(long)]
    seed: Option<u64>,

    /// Monte Carlo trials per perturbation strength
    #[clap(long)]
    trials: Option<usize>,

    /// Perturbation strength, may be repeated
    #[clap(long = "strength")]
    strengths: Vec<f64>,

    /// Analyze the built-in reference judgments instead of a simulated panel
    #[clap(long)]
    reference: bool,
}

#[derive(Serialize)]
struct Report {
    seed: u64,
    judges: Vec<JudgeResult>,
    alternatives: Vec<String>,
    criteria: Vec<String>,
    criteria_weights: Vec<f64>,
    scores: BTreeMap<String, f64>,
    ranking: Vec<String>,
    sensitivity: Vec<SensitivityRow>,
}

#[derive(Serialize)]
struct SensitivityRow {
    strength: f64,
    trials: usize,
    prr: BTreeMap<String, f64>,
}

fn sensitivity_rows(table: &PrrTable, alternatives: &[String]) -> Vec<SensitivityRow> {
    table
        .iter()
        .map(|(strength, row)| SensitivityRow {
            strength,
            trials: table.trials,
            prr: alternatives
                .iter()
                .cloned()
                .zip(row.iter().map(|p| p.as_f64()))
                .collect(),
        })
        .collect()
}

fn load_config(args: &Args) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(judges) = args.judges {
        config.judges = judges;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(trials) = args.trials {
        config.sensitivity.trials = trials;
    }
    if !args.strengths.is_empty() {
        config.sensitivity.strengths = args.strengths.clone();
    }
    config.validate().context("invalid analysis config")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ahp=info,simulator=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let seed = config.seed.unwrap_or_else(rand::random);
    let hierarchy = config.hierarchy()?;
    tracing::info!(seed, judges = config.judges, reference = args.reference, "starting analysis");

    let t0 = Instant::now();
    let (judges, baseline) = if args.reference {
        let judgments = Hierarchy::reference_judgments()?;
        let result = hierarchy
            .evaluate(&judgments)
            .context("reference judgments require the default hierarchy")?;
        if !result.is_consistent() {
            tracing::warn!(consistency = ?result.consistency, "reference judgments are inconsistent");
        }
        let baseline = Baseline::from_judge(&result)?;
        (vec![result], baseline)
    } else {
        let result = config.panel()?.run(seed)?;
        let baseline = Baseline::from_panel(&result)?;
        (result.judges, baseline)
    };
    tracing::info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        scores = ?baseline.scores(),
        "synthesis complete"
    );

    let t0 = Instant::now();
    let table = config.sensitivity_engine()?.run(&baseline, seed)?;
    tracing::info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        strengths = table.strengths.len(),
        trials = table.trials,
        "sensitivity analysis complete"
    );

    let alternatives = hierarchy.alternatives().to_vec();
    let report = Report {
        seed,
        judges,
        criteria: hierarchy.criteria().map(String::from).collect(),
        criteria_weights: baseline.criteria_weights().to_vec(),
        scores: alternatives
            .iter()
            .cloned()
            .zip(baseline.scores().iter().copied())
            .collect(),
        ranking: baseline
            .ranking()
            .iter()
            .map(|&i| alternatives[i].clone())
            .collect(),
        sensitivity: sensitivity_rows(&table, &alternatives),
        alternatives,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
