//! Daily jobs (C7): bhavcopy and securities-master refresh on a fixed
//! Asia/Kolkata wall-clock schedule. Grounded on
//! `services/BHAVCOPY/bhavcopy.py`'s `start_sftp_bhavcopy()` and
//! `services/token_master.py`'s `SFTPTokenMasterWatcher`; scheduling
//! itself follows `main.rs`'s periodic-task shape since no cron
//! expression crate is in this codebase's dependency stack.

use crate::clock::Clock;
use crate::config::Config;
use crate::decode;
use crate::error::{IngestError, Result};
use crate::ledger::Ledger;
use crate::store::BlobStore;
use crate::transport::RemoteTransport;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Asia::Kolkata;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

const DAILY_FIRE_HOUR: u32 = 6;
const DAILY_FIRE_MINUTE: u32 = 0;

/// Roll `ref_date` back over Saturday/Sunday only; NSE holidays are
/// not tracked by default (SPEC_FULL.md §9 — the original's latent
/// gap, kept explicit and injectable rather than silently patched).
pub trait HolidayCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;
}

pub struct WeekendsOnly;

impl HolidayCalendar for WeekendsOnly {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
    }
}

pub fn previous_business_day(ref_date: NaiveDate, calendar: &dyn HolidayCalendar) -> NaiveDate {
    let mut prev = ref_date - ChronoDuration::days(1);
    while !calendar.is_trading_day(prev) {
        prev -= ChronoDuration::days(1);
    }
    prev
}

pub struct DailyJobs {
    config: Config,
    transport: Arc<Mutex<dyn RemoteTransport>>,
    store: Arc<BlobStore>,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    calendar: Arc<dyn HolidayCalendar>,
}

impl DailyJobs {
    pub fn new(
        config: Config,
        transport: Arc<Mutex<dyn RemoteTransport>>,
        store: Arc<BlobStore>,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            ledger,
            clock,
            calendar,
        }
    }

    /// Sleeps until the next 06:00 IST, then runs `body` forever, once
    /// per day, until `shutdown` resolves.
    async fn run_daily<F, Fut>(&self, name: &str, mut shutdown: tokio::sync::watch::Receiver<bool>, body: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        loop {
            let sleep_for = self.duration_until_next_fire();
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    match body().await {
                        Ok(()) => info!(job = name, "daily_job_completed"),
                        Err(e) => warn!(job = name, error = %e, "daily_job_failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(job = name, "daily_job_shutting_down");
                        return;
                    }
                }
            }
        }
    }

    fn duration_until_next_fire(&self) -> std::time::Duration {
        let now = self.clock.now_utc().with_timezone(&Kolkata);
        let fire_time = NaiveTime::from_hms_opt(DAILY_FIRE_HOUR, DAILY_FIRE_MINUTE, 0).unwrap();
        let mut next = now.date_naive().and_time(fire_time);
        if next <= now.naive_local() {
            next += ChronoDuration::days(1);
        }
        let next_local = Kolkata
            .from_local_datetime(&next)
            .single()
            .unwrap_or_else(|| now + ChronoDuration::hours(24));
        (next_local - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60))
    }

    pub async fn run_bhavcopy(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        self.run_daily("bhavcopy", shutdown, || self.bhavcopy_once()).await;
    }

    pub async fn run_securities_master(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        self.run_daily("securities_master", shutdown, || self.securities_master_once())
            .await;
    }

    async fn bhavcopy_once(&self) -> Result<()> {
        let today = self.clock.now_local().date_naive();
        let business_date = previous_business_day(today, self.calendar.as_ref());
        let folder = business_date.format("%B%d%Y").to_string();
        let filename = format!("CMBhavcopy_{}.txt", business_date.format("%d%m%Y"));
        let remote_path = format!(
            "{}/BHAVCOPY/{}/{}",
            self.config.sftp_remote_path.trim_end_matches('/'),
            folder,
            filename
        );

        let transport = Arc::clone(&self.transport);
        let path = remote_path.clone();
        let bytes = tokio::task::spawn_blocking(move || transport.lock().fetch(&path))
            .await
            .map_err(|e| IngestError::transient(anyhow::anyhow!(e)))??;

        let text = String::from_utf8(bytes)
            .map_err(|e| IngestError::decode(anyhow::anyhow!("bhavcopy is not valid utf-8: {e}")))?;
        let rows = decode::bhavcopy::decode(&text, &filename)?;

        info!(remote_path = %remote_path, rows = rows.len(), "bhavcopy_downloaded");
        self.store
            .insert_batch(&crate::models::RecordBatch::Bhavcopy(rows))?;
        self.ledger.mark(&remote_path)?;
        Ok(())
    }

    async fn securities_master_once(&self) -> Result<()> {
        let today = self.clock.now_local().date_naive();
        let today_dir = format!(
            "{}/SECURITY/{}",
            self.config.sftp_remote_path.trim_end_matches('/'),
            today.format("%B%d%Y")
        );
        let remote_path = format!("{today_dir}/Securities.dat");

        let transport = Arc::clone(&self.transport);
        let path = remote_path.clone();
        let primary = tokio::task::spawn_blocking(move || transport.lock().fetch(&path))
            .await
            .map_err(|e| IngestError::transient(anyhow::anyhow!(e)))?;

        let (bytes, used_path) = match primary {
            Ok(bytes) => (bytes, remote_path.clone()),
            Err(e) => {
                warn!(error = %e, "securities_today_failed_trying_yesterday");
                let yesterday = today - ChronoDuration::days(1);
                let fallback_path = format!(
                    "{}/SECURITY/{}/Securities.dat",
                    self.config.sftp_remote_path.trim_end_matches('/'),
                    yesterday.format("%B%d%Y")
                );
                let transport = Arc::clone(&self.transport);
                let path = fallback_path.clone();
                let bytes = tokio::task::spawn_blocking(move || transport.lock().fetch(&path))
                    .await
                    .map_err(|e| IngestError::transient(anyhow::anyhow!(e)))??;
                (bytes, fallback_path)
            }
        };

        let rows = decode::securities::decode(&bytes, today)?;
        info!(remote_path = %used_path, rows = rows.len(), "securities_master_downloaded");
        self.store
            .insert_batch(&crate::models::RecordBatch::Securities(rows))?;
        self.ledger.mark(&used_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_business_day_rolls_back_over_weekend() {
        let monday = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
        let prev = previous_business_day(monday, &WeekendsOnly);
        assert_eq!(prev, NaiveDate::from_ymd_opt(2025, 7, 11).unwrap());
    }

    #[test]
    fn previous_business_day_on_tuesday_is_monday() {
        let tuesday = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let prev = previous_business_day(tuesday, &WeekendsOnly);
        assert_eq!(prev, NaiveDate::from_ymd_opt(2025, 7, 14).unwrap());
    }

    struct NoFridaysEither;
    impl HolidayCalendar for NoFridaysEither {
        fn is_trading_day(&self, date: NaiveDate) -> bool {
            WeekendsOnly.is_trading_day(date) && date.weekday() != chrono::Weekday::Fri
        }
    }

    #[test]
    fn injectable_calendar_can_exclude_additional_days() {
        let saturday = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        let prev = previous_business_day(saturday, &NoFridaysEither);
        assert_eq!(prev, NaiveDate::from_ymd_opt(2025, 7, 17).unwrap());
    }
}
