use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use index_loader::config::Config;
use index_loader::dataset;
use index_loader::results::{LatencyStats, QueryRound, RunConfig, RunResult, UploadSummary};
use index_loader::{DatasetVector, IndexLoader, LoaderError};

/// Load a vector dataset into a remote index, sweep `ef`, and report
/// upload outcome plus query latency as JSON.
#[derive(Parser, Debug)]
#[command(name = "index-loader", version)]
struct Args {
    /// TOML config file (defaults to $INDEX_LOADER_CONFIG).
    #[arg(long)]
    config: Option<String>,

    /// Benchmark metric: `euclidean` or `angular`.
    #[arg(long, default_value = "euclidean")]
    metric: String,

    /// Database endpoint, overrides the config.
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    class_name: Option<String>,

    /// JSON file of vectors; random vectors are generated when absent.
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long, default_value_t = 10_000)]
    vectors: usize,

    #[arg(long, default_value_t = 128)]
    dimensions: usize,

    #[arg(long, default_value_t = 1_000)]
    queries: usize,

    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Comma separated `ef` values to sweep.
    #[arg(long, value_delimiter = ',', default_values_t = vec![16u64, 64, 256])]
    ef: Vec<u64>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Delete every class on the server before provisioning.
    #[arg(long)]
    purge_all: bool,

    /// Write the JSON result here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the run.
    #[arg(long)]
    metrics: bool,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run_queries(
    loader: &mut IndexLoader,
    queries: &[Vec<f32>],
    top_k: usize,
    ef_values: &[u64],
) -> index_loader::Result<Vec<QueryRound>> {
    let mut rounds = Vec::with_capacity(ef_values.len());

    for &ef in ef_values {
        loader.set_query_parameter("ef", ef).await?;

        let mut hist = hdrhistogram::Histogram::<u64>::new(3)
            .map_err(|e| LoaderError::Config(format!("histogram: {e}")))?;
        let mut errors = 0;

        for q in queries {
            let start = Instant::now();
            match loader.query(q, top_k).await {
                Ok(_) => {
                    let micros = start.elapsed().as_micros() as u64;
                    if let Err(e) = hist.record(micros) {
                        errors += 1;
                        tracing::debug!(error = %e, micros, "latency sample not recorded");
                    }
                }
                Err(e) => {
                    errors += 1;
                    tracing::debug!(error = %e, "query failed");
                }
            }
        }

        tracing::info!(ef, errors, p50_us = hist.value_at_quantile(0.5), "query round done");
        rounds.push(QueryRound {
            ef,
            queries: queries.len(),
            errors,
            latency: LatencyStats::from_histogram(&hist, Duration::from_micros(1)),
        });
    }
    Ok(rounds)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(url) = &args.url {
        config.database.url = url.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.upload.batch_size = batch_size;
    }
    if let Some(class_name) = &args.class_name {
        config.index.class_name = class_name.clone();
    }
    config.validate()?;

    init_logging(&config);
    index_loader::metrics::init();

    let vectors: Vec<DatasetVector> = match &args.dataset {
        Some(path) => dataset::load_json(path)
            .with_context(|| format!("failed to load dataset {}", path.display()))?,
        None => dataset::random_vectors(args.vectors, args.dimensions, args.seed),
    };
    let dimensions = vectors.first().map(|v| v.values.len()).unwrap_or(0);
    let queries = dataset::sample_queries(&vectors, args.queries, 0.01, args.seed.wrapping_add(1));
    tracing::info!(vectors = vectors.len(), dimensions, queries = queries.len(), "dataset ready");

    let mut loader = IndexLoader::from_config(&args.metric, &config).await?;
    let target = loader.to_string();
    tracing::info!(target = %target, "connected");

    if args.purge_all {
        loader.purge_all().await?;
    }

    let class_name = config.index.class_name.clone();
    let top_k = args.top_k;
    let ef_values = args.ef.clone();
    let vector_count = vectors.len();

    let (upload, rounds) = loader
        .session(move |loader| {
            Box::pin(async move {
                loader.provision(&class_name).await?;

                let start = Instant::now();
                let report = loader.upload_all(&vectors).await?;
                let upload = UploadSummary::new(&report, start.elapsed().as_secs_f64());
                if !report.is_complete() {
                    tracing::warn!(failed = report.failed.len(), "upload incomplete");
                }

                let rounds = run_queries(loader, &queries, top_k, &ef_values).await?;
                Ok((upload, rounds))
            })
        })
        .await?;

    let result = RunResult::new(
        &target,
        RunConfig {
            metric: args.metric.clone(),
            class_name: config.index.class_name.clone(),
            vectors: vector_count,
            dimensions,
            batch_size: config.upload.batch_size,
            ef_construction: config.index.ef_construction,
            max_connections: config.index.max_connections,
            top_k: args.top_k,
        },
        upload,
        rounds,
    );

    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    if args.metrics {
        eprintln!("{}", index_loader::metrics::render());
    }
    Ok(())
}
