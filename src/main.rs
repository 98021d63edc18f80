use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use enricher::environment::Config;
use enricher::ingest::read_records_from_path;
use enricher::logging;
use enricher::matching::IdentityMatcher;
use enricher::report::{write_rows_to_path, BatchSummary, OutputRow};
use enricher::services::{
    create_http_client, PlacesClient, SearchNameResolver, ServiceGateway, SonarClient,
    WhitepagesClient,
};
use enricher::{process_batch, BatchProgress, ProgressSink, RecordPipeline, ResultCache, RetryPolicy};

#[derive(Parser)]
#[clap(
    name = "enricher",
    about = "Resolve restaurant trade names and owner contacts for a CSV of businesses"
)]
struct Cli {
    /// Input CSV file
    input: PathBuf,

    /// Output CSV file
    #[clap(short, long, default_value = "output.csv")]
    output: PathBuf,

    /// Records processed at once (overrides ENRICH_CONCURRENCY)
    #[clap(long)]
    concurrency: Option<usize>,

    /// Cache directory (overrides ENRICH_CACHE_DIR)
    #[clap(long)]
    cache_dir: Option<PathBuf>,

    /// Only process the first N records
    #[clap(long)]
    limit: Option<usize>,

    /// Minimum name similarity (0-100) for a local contact match
    #[clap(long)]
    threshold: Option<f64>,
}

struct BarProgress(ProgressBar);

impl ProgressSink for BarProgress {
    fn report(&self, progress: &BatchProgress) {
        self.0.set_position(progress.processed as u64);
        self.0.set_message(progress.message.clone());
    }
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓▒░ "),
    );
    Ok(bar)
}

fn build_pipeline(config: &Config, threshold: f64) -> Result<(RecordPipeline, Arc<ResultCache>)> {
    let cache = Arc::new(
        ResultCache::persistent(&config.cache_dir)
            .with_context(|| format!("Failed to open cache at {}", config.cache_dir.display()))?,
    );
    let policy = RetryPolicy::default().with_call_timeout(config.request_timeout);
    let gateway = ServiceGateway::new(cache.clone(), policy);
    let http = create_http_client(config.request_timeout)?;

    let places = PlacesClient::with_base_url(
        http.clone(),
        gateway.clone(),
        config.google_places_api_key.clone(),
        &config.places_base_url,
    )?;
    let sonar = Arc::new(SonarClient::with_base_url(
        gateway.clone(),
        config.openrouter_api_key.clone(),
        &config.sonar_model,
        &config.openrouter_base_url,
    ));
    let whitepages = WhitepagesClient::with_base_url(
        http,
        gateway,
        config.whitepages_api_key.clone(),
        &config.whitepages_base_url,
    )?;

    let pipeline = RecordPipeline::new(
        Arc::new(SearchNameResolver::new(places, sonar.clone())),
        sonar,
        Arc::new(whitepages),
    )
    .with_matcher(IdentityMatcher::new(threshold));

    Ok((pipeline, cache))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    let threshold = cli.threshold.unwrap_or(config.match_threshold);
    config.validate();

    println!("Reading {}", cli.input.display().to_string().bright_yellow());
    let mut records = read_records_from_path(&cli.input)?;
    if let Some(limit) = cli.limit {
        records.truncate(limit);
        println!("Limited to {} records", records.len());
    }

    let (pipeline, cache) = build_pipeline(&config, threshold)?;

    let bar = create_progress_bar(records.len())?;
    let sink = Arc::new(BarProgress(bar.clone()));
    let report = process_batch(Arc::new(pipeline), records, config.concurrency, sink).await;
    bar.finish_with_message("done");

    let rows: Vec<OutputRow> = report.records.iter().map(OutputRow::from_record).collect();
    write_rows_to_path(&cli.output, &rows)?;

    let stats = cache.stats();
    info!("Cache: {} hits, {} misses, {} writes", stats.hits, stats.misses, stats.writes);

    let summary = BatchSummary::from_report(&report);
    println!("\nOutput written to: {}", cli.output.display().to_string().bright_green());
    println!("\n{}", "Summary".bright_blue());
    println!("  Records processed:        {}", summary.processed);
    println!("  Records with owner found: {}", summary.with_owner);
    println!("  Owners with phone number: {}", summary.with_phone);
    if summary.failed > 0 {
        println!("  {}", format!("Records failed:           {}", summary.failed).bright_red());
        for failure in &report.failures {
            println!(
                "    {} #{} '{}': {}",
                "-".dimmed(),
                failure.index + 1,
                failure.legal_name,
                failure.error
            );
        }
    }

    Ok(())
}
