//! Snapshot watcher (C6): the periodic discovery loop driving
//! C1→C2→C3→C5. Grounded on `services/sftp_watcher.py`'s
//! `start_sftp_watcher()` main loop and on `main.rs`'s
//! `storage_pruning_polling`/`search_index_backfill_polling`
//! periodic-task shape (read env config once, tick an interval, match
//! on the per-cycle `Result`, log and continue).

use crate::bus::Bus;
use crate::clock::Clock;
use crate::config::Config;
use crate::decode;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::store::BlobStore;
use crate::transport::RemoteTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Watcher {
    config: Config,
    transport: Arc<Mutex<dyn RemoteTransport>>,
    store: Arc<BlobStore>,
    ledger: Arc<Ledger>,
    bus: Bus,
    clock: Arc<dyn Clock>,
}

impl Watcher {
    pub fn new(
        config: Config,
        transport: Arc<Mutex<dyn RemoteTransport>>,
        store: Arc<BlobStore>,
        ledger: Arc<Ledger>,
        bus: Bus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            ledger,
            bus,
            clock,
        }
    }

    /// Runs until `shutdown` resolves. In-flight cycles finish their
    /// current file before exiting (SPEC_FULL.md §5 Cancellation).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = std::time::Instant::now();
                    match self.run_cycle().await {
                        Ok(stats) => info!(
                            files_seen = stats.files_seen,
                            files_processed = stats.files_processed,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "watcher_cycle_completed"
                        ),
                        Err(e) => warn!(error = %e, "watcher_cycle_failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("watcher_shutting_down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleStats> {
        let today = self.clock.now_local().date_naive();
        let today_dir = remote_dir(&self.config.sftp_remote_path, today);

        let listing = match self.list_with_fallback(&today_dir, today).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "watcher_listing_failed_skipping_cycle");
                return Ok(CycleStats::default());
            }
        };

        let mut stats = CycleStats {
            files_seen: listing.len(),
            files_processed: 0,
        };

        for filename in listing {
            let remote_path = format!("{today_dir}/{filename}");
            if self.ledger.seen(&remote_path)? {
                continue;
            }
            match self.process_one(&remote_path, &filename).await {
                Ok(()) => stats.files_processed += 1,
                Err(e) if e.is_retryable() => {
                    warn!(remote_path = %remote_path, error = %e, "file_processing_failed_skipping");
                }
                Err(e) => {
                    warn!(remote_path = %remote_path, error = %e, "file_processing_failed_fatally");
                    return Err(e);
                }
            }
        }

        Ok(stats)
    }

    async fn list_with_fallback(
        &self,
        today_dir: &str,
        today: chrono::NaiveDate,
    ) -> Result<Vec<String>> {
        let transport = Arc::clone(&self.transport);
        let dir = today_dir.to_string();
        let primary = tokio::task::spawn_blocking(move || transport.lock().list(&dir))
            .await
            .map_err(|e| crate::error::IngestError::transient(anyhow::anyhow!(e)))?;

        match primary {
            Ok(names) => Ok(names),
            Err(e) => {
                debug!(error = %e, "listing_today_failed_trying_yesterday");
                let yesterday = today - chrono::Duration::days(1);
                let yesterday_dir = remote_dir(&self.config.sftp_remote_path, yesterday);
                let transport = Arc::clone(&self.transport);
                tokio::task::spawn_blocking(move || transport.lock().list(&yesterday_dir))
                    .await
                    .map_err(|e| crate::error::IngestError::transient(anyhow::anyhow!(e)))?
            }
        }
    }

    async fn process_one(&self, remote_path: &str, filename: &str) -> Result<()> {
        if !decode::is_interesting_suffix(filename) {
            self.ledger.mark(remote_path)?;
            return Ok(());
        }

        let transport = Arc::clone(&self.transport);
        let path = remote_path.to_string();
        let bytes = tokio::task::spawn_blocking(move || transport.lock().fetch(&path))
            .await
            .map_err(|e| crate::error::IngestError::transient(anyhow::anyhow!(e)))??;

        let batch = match decode::decode_snapshot(filename, &bytes)? {
            Some(batch) => batch,
            None => {
                self.ledger.mark(remote_path)?;
                return Ok(());
            }
        };

        if batch.is_empty() {
            self.ledger.mark(remote_path)?;
            return Ok(());
        }

        let record_count = batch.len();
        let kind = batch.kind();
        self.store.insert_batch(&batch)?;
        self.bus.publish(batch);
        self.ledger.mark(remote_path)?;

        debug!(remote_path, kind = ?kind, record_count, "file_ingested");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CycleStats {
    files_seen: usize,
    files_processed: usize,
}

/// `<root>/DATA/<MonthDDYYYY>`, e.g. `/CM30/DATA/July082025`.
fn remote_dir(root: &str, date: chrono::NaiveDate) -> String {
    format!("{}/DATA/{}", root.trim_end_matches('/'), date.format("%B%d%Y"))
}
