//! Daily bhavcopy text-file decoder. Whitespace-separated columns;
//! rows with a missing series column have 8 tokens instead of 9.

use crate::error::{IngestError, Result};
use crate::models::{BhavcopyField, BhavcopyRow};
use chrono::NaiveDate;

const COLUMN_COUNT_NO_SERIES: usize = 8;
const COLUMN_COUNT_WITH_SERIES: usize = 9;

/// Extract the business date from a filename shaped
/// `CMBhavcopy_DDMMYYYY.txt`. The format is fixed and narrow enough
/// that a hand-rolled scan reads more plainly than a regex crate here.
pub fn extract_business_date(filename: &str) -> Result<NaiveDate> {
    let malformed = || {
        IngestError::decode(anyhow::anyhow!(
            "filename {filename:?} not in expected CMBhavcopy_DDMMYYYY.txt format"
        ))
    };

    let digits = filename
        .strip_prefix("CMBhavcopy_")
        .and_then(|rest| rest.strip_suffix(".txt"))
        .ok_or_else(malformed)?;

    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let dd: u32 = digits[0..2].parse().map_err(|_| malformed())?;
    let mm: u32 = digits[2..4].parse().map_err(|_| malformed())?;
    let yyyy: i32 = digits[4..8].parse().map_err(|_| malformed())?;

    NaiveDate::from_ymd_opt(yyyy, mm, dd).ok_or_else(|| {
        IngestError::decode(anyhow::anyhow!("filename {filename:?} names an invalid date"))
    })
}

pub fn decode(text: &str, filename: &str) -> Result<Vec<BhavcopyRow>> {
    let business_date = extract_business_date(filename)?;
    let mut rows = Vec::new();

    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (symbol, series, values): (&str, &str, &[&str]) = match parts.len() {
            COLUMN_COUNT_NO_SERIES => (parts[0], "", &parts[1..]),
            COLUMN_COUNT_WITH_SERIES => (parts[0], parts[1], &parts[2..]),
            0 => continue,
            _ => continue, // malformed arity; skip per SPEC_FULL.md §4.2
        };

        // A missing column (short `values`) has no raw token to keep;
        // an empty string still parses as `Raw("")` rather than `0`.
        let field = |i: usize| BhavcopyField::parse(values.get(i).copied().unwrap_or(""));

        rows.push(BhavcopyRow {
            business_date,
            symbol: symbol.to_string(),
            series: series.to_string(),
            trade_high_price: field(0),
            trade_low_price: field(1),
            opening_price: field(2),
            closing_price: field(3),
            previous_close_price: field(4),
            total_traded_quantity: field(5),
            total_traded_value: field(6),
        });
    }

    Ok(rows)
}
