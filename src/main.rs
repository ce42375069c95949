//! NSE Capital Market snapshot feed ingestion service.
//!
//! Loads configuration, opens the embedded SQLite store, and spawns
//! the snapshot watcher plus the two daily jobs, then waits for
//! Ctrl-C to drive a graceful shutdown. Mirrors this codebase's
//! spawn-many-loops-then-select-on-shutdown entry point shape.

use anyhow::{Context, Result};
use clap::Parser;
use nse_cm_ingest::bus::Bus;
use nse_cm_ingest::clock::SystemClock;
use nse_cm_ingest::config::Config;
use nse_cm_ingest::jobs::{DailyJobs, WeekendsOnly};
use nse_cm_ingest::ledger::Ledger;
use nse_cm_ingest::store::BlobStore;
use nse_cm_ingest::transport::{RemoteTransport, SftpTransport};
use nse_cm_ingest::watcher::Watcher;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Operational overrides; each falls back to the environment when
/// absent, matching `clap`'s `env` feature already enabled here.
#[derive(Parser, Debug)]
#[command(name = "nse-cm-ingest", about = "NSE Capital Market snapshot feed ingestion service")]
struct Cli {
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<String>,

    #[arg(long, env = "POLL_INTERVAL_SECONDS")]
    poll_interval_seconds: Option<u64>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nse_cm_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(path) = cli.sqlite_path {
        config.sqlite_path = path;
    }
    if let Some(secs) = cli.poll_interval_seconds {
        config.poll_interval = std::time::Duration::from_secs(secs);
    }

    info!(
        sftp_hosts = ?config.sftp_hosts,
        sqlite_path = %config.sqlite_path,
        poll_interval_secs = config.poll_interval.as_secs(),
        "starting_nse_cm_ingest"
    );

    let store = Arc::new(BlobStore::open(&config.sqlite_path).context("opening blob store")?);
    let ledger = Arc::new(Ledger::new(store.conn_handle()));
    let transport: Arc<Mutex<dyn RemoteTransport>> =
        Arc::new(Mutex::new(SftpTransport::new(config.clone())));
    let bus = Bus::new();
    let clock = Arc::new(SystemClock);

    let watcher = Watcher::new(
        config.clone(),
        Arc::clone(&transport),
        Arc::clone(&store),
        Arc::clone(&ledger),
        bus.clone(),
        clock.clone(),
    );
    let jobs = Arc::new(DailyJobs::new(
        config.clone(),
        Arc::clone(&transport),
        Arc::clone(&store),
        Arc::clone(&ledger),
        clock.clone(),
        Arc::new(WeekendsOnly),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let watcher_task = tokio::spawn({
        let rx = shutdown_rx.clone();
        async move { watcher.run(rx).await }
    });
    let bhavcopy_task = tokio::spawn({
        let jobs = Arc::clone(&jobs);
        let rx = shutdown_rx.clone();
        async move { jobs.run_bhavcopy(rx).await }
    });
    let securities_task = tokio::spawn({
        let jobs = Arc::clone(&jobs);
        let rx = shutdown_rx.clone();
        async move { jobs.run_securities_master(rx).await }
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown_signal_received");
    shutdown_tx.send(true).ok();

    let _ = tokio::join!(watcher_task, bhavcopy_task, securities_task);
    info!("shutdown_complete");
    Ok(())
}
