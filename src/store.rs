//! Blob store (C3): idempotent persistence of decoded records to an
//! embedded SQLite database. Grounded on `signals/db_storage.rs`'s
//! `DbSignalStorage` — same WAL pragma set, same
//! `Arc<Mutex<Connection>>` ownership, same prepare-then-batch-commit
//! shape for bulk inserts.

use crate::error::{IngestError, Result};
use crate::models::{
    BhavcopyField, BhavcopyRow, CallAuctionSnapshot, IndexSnapshot, MarketSnapshot,
    PermittedToTrade, RecordBatch, SecurityMaster, SettlementCycle,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS mkt_snapshots (
    security_token INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    last_traded_price INTEGER NOT NULL,
    best_buy_quantity INTEGER NOT NULL,
    best_buy_price INTEGER NOT NULL,
    best_sell_quantity INTEGER NOT NULL,
    best_sell_price INTEGER NOT NULL,
    total_traded_quantity INTEGER NOT NULL,
    average_traded_price INTEGER NOT NULL,
    open_price INTEGER NOT NULL,
    high_price INTEGER NOT NULL,
    low_price INTEGER NOT NULL,
    close_price INTEGER NOT NULL,
    interval_open_price INTEGER NOT NULL,
    interval_high_price INTEGER NOT NULL,
    interval_low_price INTEGER NOT NULL,
    interval_close_price INTEGER NOT NULL,
    interval_total_traded_quantity INTEGER NOT NULL,
    indicative_close_price INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mkt_token_timestamp ON mkt_snapshots(security_token, timestamp);

CREATE TABLE IF NOT EXISTS ind_snapshots (
    index_token INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    open_index_value INTEGER NOT NULL,
    current_index_value INTEGER NOT NULL,
    high_index_value INTEGER NOT NULL,
    low_index_value INTEGER NOT NULL,
    percentage_change INTEGER NOT NULL,
    interval_open_index_value INTEGER NOT NULL,
    interval_high_index_value INTEGER NOT NULL,
    interval_low_index_value INTEGER NOT NULL,
    interval_close_index_value INTEGER NOT NULL,
    indicative_close_index_value INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ind_token_timestamp ON ind_snapshots(index_token, timestamp);

CREATE TABLE IF NOT EXISTS ca2_snapshots (
    security_token INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    last_traded_price INTEGER NOT NULL,
    best_buy_quantity INTEGER NOT NULL,
    best_buy_price INTEGER NOT NULL,
    buy_bbmm_flag TEXT NOT NULL,
    best_sell_quantity INTEGER NOT NULL,
    best_sell_price INTEGER NOT NULL,
    sell_bbmm_flag TEXT NOT NULL,
    total_traded_quantity INTEGER NOT NULL,
    indicative_traded_quantity INTEGER NOT NULL,
    average_traded_price INTEGER NOT NULL,
    first_open_price INTEGER NOT NULL,
    open_price INTEGER NOT NULL,
    high_price INTEGER NOT NULL,
    low_price INTEGER NOT NULL,
    close_price INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ca2_token_timestamp ON ca2_snapshots(security_token, timestamp);

CREATE TABLE IF NOT EXISTS securities (
    token_number INTEGER PRIMARY KEY,
    symbol TEXT NOT NULL,
    series TEXT NOT NULL,
    issued_capital REAL NOT NULL,
    settlement_cycle INTEGER NOT NULL,
    company_name TEXT NOT NULL,
    permitted_to_trade INTEGER NOT NULL,
    last_updated TEXT NOT NULL
) WITHOUT ROWID;

-- Numeric columns are TEXT: a parse failure in the source file keeps
-- the raw token (see BhavcopyField), so the column can't be typed as
-- a pure REAL/INTEGER without losing that token.
CREATE TABLE IF NOT EXISTS bhavcopy_rows (
    symbol TEXT NOT NULL,
    business_timestamp INTEGER NOT NULL,
    series TEXT NOT NULL,
    trade_high_price TEXT NOT NULL,
    trade_low_price TEXT NOT NULL,
    opening_price TEXT NOT NULL,
    closing_price TEXT NOT NULL,
    previous_close_price TEXT NOT NULL,
    total_traded_quantity TEXT NOT NULL,
    total_traded_value TEXT NOT NULL,
    UNIQUE(symbol, business_timestamp)
);

CREATE TABLE IF NOT EXISTS processed_paths (
    path TEXT PRIMARY KEY
) WITHOUT ROWID;
";

const BATCH_SIZE: usize = 1000;

pub struct BlobStore {
    conn: Arc<Mutex<Connection>>,
}

impl BlobStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(IngestError::from)?;

        conn.execute_batch(SCHEMA_SQL).map_err(IngestError::from)?;
        info!(path = %path, "blob_store_opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The shared connection handle backing this store, so a
    /// [`crate::ledger::Ledger`] can mutate the same database (and, in
    /// the watcher, the same transaction boundary) without opening a
    /// second file handle.
    pub fn conn_handle(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Persist a decoded batch. Semantics vary by kind (SPEC_FULL.md §4.3):
    /// snapshot kinds append, SECURITIES upserts by token, BHAVCOPY
    /// inserts-or-ignores by (symbol, business_timestamp).
    pub fn insert_batch(&self, batch: &RecordBatch) -> Result<()> {
        match batch {
            RecordBatch::Mkt(rows) => self.insert_mkt(rows),
            RecordBatch::Ind(rows) => self.insert_ind(rows),
            RecordBatch::Ca2(rows) => self.insert_ca2(rows),
            RecordBatch::Securities(rows) => self.upsert_securities(rows),
            RecordBatch::Bhavcopy(rows) => self.insert_bhavcopy(rows),
        }
    }

    fn insert_mkt(&self, rows: &[MarketSnapshot]) -> Result<()> {
        const SQL: &str = "INSERT INTO mkt_snapshots (security_token, timestamp, last_traded_price, \
             best_buy_quantity, best_buy_price, best_sell_quantity, best_sell_price, \
             total_traded_quantity, average_traded_price, open_price, high_price, \
             low_price, close_price, interval_open_price, interval_high_price, \
             interval_low_price, interval_close_price, interval_total_traded_quantity, \
             indicative_close_price) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)";
        self.in_batches(rows, SQL, |stmt, r: &MarketSnapshot| {
            stmt.execute(params![
                r.security_token,
                r.timestamp,
                r.last_traded_price,
                r.best_buy_quantity as i64,
                r.best_buy_price,
                r.best_sell_quantity as i64,
                r.best_sell_price,
                r.total_traded_quantity as i64,
                r.average_traded_price,
                r.open_price,
                r.high_price,
                r.low_price,
                r.close_price,
                r.interval_open_price,
                r.interval_high_price,
                r.interval_low_price,
                r.interval_close_price,
                r.interval_total_traded_quantity as i64,
                r.indicative_close_price,
            ])
            .map(|_| ())
        })
    }

    fn insert_ind(&self, rows: &[IndexSnapshot]) -> Result<()> {
        const SQL: &str = "INSERT INTO ind_snapshots (index_token, timestamp, open_index_value, \
             current_index_value, high_index_value, low_index_value, percentage_change, \
             interval_open_index_value, interval_high_index_value, interval_low_index_value, \
             interval_close_index_value, indicative_close_index_value) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)";
        self.in_batches(rows, SQL, |stmt, r: &IndexSnapshot| {
            stmt.execute(params![
                r.index_token,
                r.timestamp,
                r.open_index_value,
                r.current_index_value,
                r.high_index_value,
                r.low_index_value,
                r.percentage_change,
                r.interval_open_index_value,
                r.interval_high_index_value,
                r.interval_low_index_value,
                r.interval_close_index_value,
                r.indicative_close_index_value,
            ])
            .map(|_| ())
        })
    }

    fn insert_ca2(&self, rows: &[CallAuctionSnapshot]) -> Result<()> {
        const SQL: &str = "INSERT INTO ca2_snapshots (security_token, timestamp, last_traded_price, \
             best_buy_quantity, best_buy_price, buy_bbmm_flag, best_sell_quantity, \
             best_sell_price, sell_bbmm_flag, total_traded_quantity, \
             indicative_traded_quantity, average_traded_price, first_open_price, \
             open_price, high_price, low_price, close_price) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)";
        self.in_batches(rows, SQL, |stmt, r: &CallAuctionSnapshot| {
            stmt.execute(params![
                r.security_token,
                r.timestamp,
                r.last_traded_price,
                r.best_buy_quantity as i64,
                r.best_buy_price,
                r.buy_bbmm_flag.to_string(),
                r.best_sell_quantity as i64,
                r.best_sell_price,
                r.sell_bbmm_flag.to_string(),
                r.total_traded_quantity as i64,
                r.indicative_traded_quantity as i64,
                r.average_traded_price,
                r.first_open_price,
                r.open_price,
                r.high_price,
                r.low_price,
                r.close_price,
            ])
            .map(|_| ())
        })
    }

    fn upsert_securities(&self, rows: &[SecurityMaster]) -> Result<()> {
        const SQL: &str = "INSERT INTO securities (token_number, symbol, series, issued_capital, \
             settlement_cycle, company_name, permitted_to_trade, last_updated) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8) \
             ON CONFLICT(token_number) DO UPDATE SET \
             symbol = excluded.symbol, series = excluded.series, \
             issued_capital = excluded.issued_capital, \
             settlement_cycle = excluded.settlement_cycle, \
             company_name = excluded.company_name, \
             permitted_to_trade = excluded.permitted_to_trade, \
             last_updated = excluded.last_updated";
        self.in_batches(rows, SQL, |stmt, r: &SecurityMaster| {
            let settlement_cycle = match r.settlement_cycle {
                SettlementCycle::TPlus0 => 0i64,
                SettlementCycle::TPlus1 => 1i64,
            };
            let permitted = match r.permitted_to_trade {
                PermittedToTrade::NotPermitted => 0i64,
                PermittedToTrade::Permitted => 1i64,
                PermittedToTrade::BseExclusive => 2i64,
            };
            stmt.execute(params![
                r.token_number,
                r.symbol,
                r.series,
                r.issued_capital,
                settlement_cycle,
                r.company_name,
                permitted,
                r.last_updated.to_string(),
            ])
            .map(|_| ())
        })
    }

    fn insert_bhavcopy(&self, rows: &[BhavcopyRow]) -> Result<()> {
        const SQL: &str = "INSERT OR IGNORE INTO bhavcopy_rows (symbol, business_timestamp, series, \
             trade_high_price, trade_low_price, opening_price, closing_price, \
             previous_close_price, total_traded_quantity, total_traded_value) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)";
        self.in_batches(rows, SQL, |stmt, r: &BhavcopyRow| {
            let business_timestamp = r
                .business_date
                .and_hms_opt(0, 0, 0)
                .expect("midnight always exists")
                .and_utc()
                .timestamp();
            stmt.execute(params![
                r.symbol,
                business_timestamp,
                r.series,
                r.trade_high_price.to_storage_string(),
                r.trade_low_price.to_storage_string(),
                r.opening_price.to_storage_string(),
                r.closing_price.to_storage_string(),
                r.previous_close_price.to_storage_string(),
                r.total_traded_quantity.to_storage_string(),
                r.total_traded_value.to_storage_string(),
            ])
            .map(|_| ())
        })
    }

    /// Runs `rows` through `exec_one` in batches of [`BATCH_SIZE`], each
    /// batch in its own transaction. A batch failure drops the
    /// transaction without committing, rolling the whole batch back
    /// (SPEC_FULL.md §4.3).
    fn in_batches<T>(
        &self,
        rows: &[T],
        sql: &str,
        mut exec_one: impl FnMut(&mut rusqlite::Statement<'_>, &T) -> rusqlite::Result<()>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        for chunk in rows.chunks(BATCH_SIZE) {
            let tx = conn.transaction().map_err(IngestError::from)?;
            let outcome = (|| -> rusqlite::Result<()> {
                let mut stmt = tx.prepare(sql)?;
                for row in chunk {
                    exec_one(&mut stmt, row)?;
                }
                Ok(())
            })();
            match outcome {
                Ok(()) => tx.commit().map_err(IngestError::from)?,
                Err(e) => {
                    warn!(error = %e, "batch_insert_failed_rolling_back");
                    // Dropping `tx` without committing rolls the batch back.
                    return Err(IngestError::persistence(anyhow::anyhow!(e)));
                }
            }
        }
        Ok(())
    }
}
