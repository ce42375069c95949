//! NSE Capital Market snapshot ingestion library.
//!
//! Exposes every component as a standalone module so the binary entry
//! point and the integration tests can wire them together directly.

pub mod bus;
pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod store;
pub mod transport;
pub mod watcher;
