//! CLI entry point for the city_pulse ingestion worker.
//!
//! Provides subcommands for running the directory-watching worker, draining
//! the inbox once, and dry-running the validator over a single work file.

use anyhow::{Context, Result};
use city_pulse::aggregate::{AggregationStore, Level};
use city_pulse::classify::{
    BasicClient, Bearer, LexiconClassifier, NeutralPolicy, NlpServiceClient, SentimentClassifier,
    TopicClassifier,
};
use city_pulse::config::{Config, ConfigArgs};
use city_pulse::enrich::BatchEnricher;
use city_pulse::output::print_json;
use city_pulse::pipeline::{Pipeline, check_file};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "city_pulse")]
#[command(about = "Enrich city report batches and aggregate them by topic", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the inbox and process work files until stopped
    Run {
        /// Log a snapshot of both aggregation levels every N seconds
        #[arg(long, env = "CITY_PULSE_REPORT_EVERY")]
        report_every: Option<u64>,

        /// Stop after this many inbox scans (0 = run until Ctrl+C)
        #[arg(long, default_value_t = 0)]
        max_polls: usize,
    },
    /// Process everything currently in the inbox, print snapshots, and exit
    ProcessOnce {
        /// Print only this aggregation level (city or district)
        #[arg(long)]
        level: Option<Level>,
    },
    /// Validate a work file without moving or enriching it
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/city_pulse.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("city_pulse.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = cli.config.into_config()?;

    match cli.command {
        Commands::Run {
            report_every,
            max_polls,
        } => {
            let store = Arc::new(AggregationStore::new(config.default_window_secs()));
            let pipeline = build_pipeline(&config, store.clone())?;

            let recovered = pipeline.recover_stranded()?;
            if recovered > 0 {
                warn!(recovered, "Moved stranded work files to failed/");
            }

            let reporter = report_every.filter(|secs| *secs > 0).map(|secs| {
                tokio::spawn(report_loop(
                    store.clone(),
                    config.default_window.clone(),
                    Duration::from_secs(secs),
                ))
            });

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Could not listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };
            pipeline.run(max_polls, shutdown).await;

            if let Some(handle) = reporter {
                handle.abort();
            }
        }
        Commands::ProcessOnce { level } => {
            let store = Arc::new(AggregationStore::new(config.default_window_secs()));
            let pipeline = build_pipeline(&config, store.clone())?;

            let summaries = pipeline.scan_once().await;
            info!(files = summaries.len(), "Inbox drained");

            let window = Some(config.default_window.as_str());
            let levels = match level {
                Some(level) => vec![level],
                None => vec![Level::City, Level::District],
            };
            for level in levels {
                print_json(&store.snapshot(level, window))?;
            }
        }
        Commands::Check { file } => {
            let summary = check_file(&file, config.pipeline.max_line_chars)
                .with_context(|| format!("checking {}", file.display()))?;
            info!(
                file = %summary.file,
                ok = summary.ok,
                skipped_400 = summary.skipped_400,
                skipped_413 = summary.skipped_413,
                other_err = summary.other_err,
                "Dry run complete"
            );
            print_json(&summary)?;
        }
    }

    Ok(())
}

/// Wires classifiers, enricher, and store into a pipeline. Uses the HTTP
/// inference service when a URL is configured, the offline lexicon otherwise.
fn build_pipeline(config: &Config, store: Arc<AggregationStore>) -> Result<Pipeline> {
    let (sentiment, topics): (Arc<dyn SentimentClassifier>, Arc<dyn TopicClassifier>) =
        match (&config.nlp_url, &config.nlp_api_key) {
            (Some(url), Some(key)) => {
                info!(url = %url, "Using NLP service with API key");
                let http = Bearer::new(BasicClient::new()?, key)?;
                let client = Arc::new(NlpServiceClient::new(url, http));
                (client.clone() as Arc<dyn SentimentClassifier>, client as Arc<dyn TopicClassifier>)
            }
            (Some(url), None) => {
                info!(url = %url, "Using NLP service");
                let client = Arc::new(NlpServiceClient::new(url, BasicClient::new()?));
                (client.clone() as Arc<dyn SentimentClassifier>, client as Arc<dyn TopicClassifier>)
            }
            (None, _) => {
                info!("No NLP service configured, using offline lexicon");
                let lexicon = Arc::new(LexiconClassifier::new(NeutralPolicy::default()));
                (lexicon.clone() as Arc<dyn SentimentClassifier>, lexicon as Arc<dyn TopicClassifier>)
            }
        };

    let enricher = BatchEnricher::new(
        sentiment,
        topics,
        config.label_policy.clone(),
        config.groups.clone(),
        store.clone(),
    );
    Ok(Pipeline::new(config.pipeline.clone(), enricher, store)?)
}

/// Periodically logs both aggregation levels while the worker runs.
async fn report_loop(store: Arc<AggregationStore>, window: String, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for level in [Level::City, Level::District] {
            let snapshot = store.snapshot(level, Some(&window));
            match serde_json::to_string(&snapshot) {
                Ok(json) => info!(
                    level = ?level,
                    items = snapshot.items.len(),
                    total = snapshot.total_count(),
                    snapshot = %json,
                    "Aggregation report"
                ),
                Err(e) => warn!(error = %e, "Could not encode snapshot"),
            }
        }
    }
}
