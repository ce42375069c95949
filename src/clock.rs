//! Injectable wall-clock. Production code reads the system clock through
//! [`SystemClock`]; tests swap in [`FixedClock`] so date-derived remote
//! paths and `last_updated` stamps are deterministic.

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;

/// A source of the current instant, abstracted so the watcher and the
/// daily jobs can be driven by a fixed time in tests.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_local(&self) -> DateTime<Tz> {
        self.now_utc().with_timezone(&Kolkata)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
