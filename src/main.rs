use chrono::{Duration, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tripbook::application::engine::{EngineConfig, TripEngine};
use tripbook::application::ledger::RetryPolicy;
use tripbook::infrastructure::clock::ManualClock;
use tripbook::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryDisputeStore, InMemoryOfferStore, InMemoryPaymentStore,
    InMemoryRequireStore,
};
use tripbook::infrastructure::notifier::LogNotifier;
use tripbook::infrastructure::processor::SimulatedProcessor;
use tripbook::interfaces::jsonl::EventReplayer;
use tripbook::interfaces::report;

/// Replays a JSONL stream of booking operations against the trip engine and
/// prints the final settlement report as CSV.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Event stream, one JSON operation per line.
    input: PathBuf,

    /// Write the settlement report to this file instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,

    /// How long a traveler may contest a no-show report, in hours.
    #[arg(long, default_value_t = 48)]
    dispute_window_hours: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // The replay clock starts at wall time and is driven forward only by
    // advance_time events.
    let clock = Arc::new(ManualClock::at(Utc::now()));
    let engine = Arc::new(TripEngine::new(
        Arc::new(InMemoryRequireStore::new()),
        Arc::new(InMemoryOfferStore::new()),
        Arc::new(InMemoryBookingStore::new()),
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(InMemoryDisputeStore::new()),
        Arc::new(SimulatedProcessor::new()),
        Arc::new(LogNotifier::new()),
        Arc::clone(&clock) as _,
        EngineConfig {
            retry: RetryPolicy::default(),
            dispute_window: Duration::hours(cli.dispute_window_hours),
        },
    ));

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut replayer = EventReplayer::new(Arc::clone(&engine), clock);
    let summary = replayer
        .replay(BufReader::new(file))
        .await
        .into_diagnostic()?;
    info!(
        applied = summary.applied,
        failed = summary.failed,
        "replay finished"
    );

    // One final pass so anything the stream left pending gets settled.
    engine.run_sweep().await.into_diagnostic()?;

    let rows = report::settlement_rows(&engine, &replayer)
        .await
        .into_diagnostic()?;
    match cli.report {
        Some(path) => {
            let out = File::create(path).into_diagnostic()?;
            report::write_settlement(&rows, out).into_diagnostic()?;
        }
        None => report::write_settlement(&rows, std::io::stdout().lock()).into_diagnostic()?,
    }
    Ok(())
}
