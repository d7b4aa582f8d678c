use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use citysense_common::{AnalysisPayload, AnalysisRequest, AnalysisResult, Config};
use citysense_pipeline::{Analyzer, Capabilities, PipelineOptions};

#[derive(Parser)]
#[command(name = "citysense", about = "Classify citizen feedback and write the daily newsfeed")]
struct Cli {
    /// JSON payload file; reads stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Newsfeed lines to emit
    #[arg(long)]
    top_n: Option<usize>,

    /// Clusters for Misc topic discovery
    #[arg(long)]
    clusters: Option<usize>,

    /// Seed for clustering and the representative tie-break
    #[arg(long)]
    seed: Option<u64>,

    /// Analyze each district separately and merge the results
    #[arg(long)]
    per_district: bool,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the result, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("citysense=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Input and setup failures still answer with a structured result.
    let raw = match read_input(cli.input.as_ref()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Input unavailable");
            return emit(&AnalysisResult::failed(format!("{e:#}")), cli.pretty);
        }
    };
    let payload: AnalysisPayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Malformed payload");
            return emit(&AnalysisResult::failed(format!("malformed payload: {e}")), cli.pretty);
        }
    };

    let mut config = Config::from_env();
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    config.log_redacted();

    let mut options = PipelineOptions::from_config(&config);
    if let Some(top_n) = cli.top_n {
        options.top_n = top_n;
    }
    if let Some(clusters) = cli.clusters {
        options.num_clusters = clusters;
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let capabilities = match Capabilities::hosted(&config) {
        Ok(capabilities) => capabilities,
        Err(e) => {
            warn!(error = %e, "Capability setup failed");
            return emit(&AnalysisResult::failed(format!("{e:#}")), cli.pretty);
        }
    };
    let analyzer = Analyzer::new(capabilities, options);
    let request = AnalysisRequest::from(payload);

    info!(rows = request.rows.len(), per_district = cli.per_district, "CitySense analysis starting");

    if cli.per_district {
        let summary = analyzer.analyze_by_district(request, &mut rng).await;
        emit(&summary, cli.pretty)
    } else {
        let result = analyzer.analyze(request, &mut rng).await;
        emit(&result, cli.pretty)
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read stdin")?;
            Ok(raw)
        }
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
