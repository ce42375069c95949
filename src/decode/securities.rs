//! Securities-master decoder (`Securities.dat`, uncompressed). Unlike
//! the snapshot formats this one is walked by the header-declared
//! `message_length`, never a compile-time payload constant, because
//! the payload width has drifted across NSE format revisions (see
//! SPEC_FULL.md §9).

use super::read_header;
use crate::error::Result;
use crate::models::{PermittedToTrade, SecurityMaster, SettlementCycle};
use chrono::NaiveDate;

const SECURITY_TRANSCODE: u16 = 7;

pub fn decode(data: &[u8], observed_on: NaiveDate) -> Result<Vec<SecurityMaster>> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset + 8 <= data.len() {
        let header = match read_header(data, offset) {
            Some(h) => h,
            None => break,
        };
        let payload_len = header.message_length as usize;
        if payload_len < 8 {
            // Malformed header; nothing sane to skip to, stop cleanly.
            break;
        }
        let payload_start = offset + 8;
        let payload_end = payload_start + (payload_len - 8);
        if payload_end > data.len() {
            // Declared length runs past what we have; stop parsing
            // cleanly rather than reading out of bounds.
            break;
        }
        let payload = &data[payload_start..payload_end];

        if header.transcode == SECURITY_TRANSCODE {
            if let Some(security) = parse_payload(payload, observed_on) {
                if !security.symbol.starts_with("NSETEST") {
                    out.push(security);
                }
            }
        }

        offset = payload_end;
    }

    Ok(out)
}

fn parse_payload(data: &[u8], observed_on: NaiveDate) -> Option<SecurityMaster> {
    if data.len() < 16 {
        return None;
    }
    let token_number = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let symbol = ascii_field(&data[4..14.min(data.len())]);
    let series = ascii_field(&data[14..16.min(data.len())]);

    let issued_capital = if data.len() >= 24 {
        f64::from_le_bytes(data[16..24].try_into().unwrap())
    } else {
        0.0
    };
    let settlement_cycle = if data.len() >= 26 {
        u16::from_le_bytes([data[24], data[25]])
    } else {
        0
    };

    let company_name = longest_printable_run(data, 40, (data.len().saturating_sub(25)).min(80));

    let permitted_to_trade = if data.len() >= 2 {
        let tail = data.len() - 2;
        u16::from_le_bytes([data[tail], data[tail + 1]])
    } else {
        1
    };

    Some(SecurityMaster {
        token_number,
        symbol,
        series,
        issued_capital,
        settlement_cycle: if settlement_cycle == 1 {
            SettlementCycle::TPlus1
        } else {
            SettlementCycle::TPlus0
        },
        company_name,
        permitted_to_trade: PermittedToTrade::from_code(permitted_to_trade),
        last_updated: observed_on,
    })
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Scan the window `[start, end)` for the longest printable 25-byte
/// run; company names aren't at a fixed offset across format
/// revisions, so this mirrors the original extractor's sliding search.
fn longest_printable_run(data: &[u8], start: usize, end: usize) -> String {
    let mut best = String::new();
    for start_pos in start..end {
        let slice_end = (start_pos + 25).min(data.len());
        if start_pos >= slice_end {
            continue;
        }
        let candidate = ascii_field(&data[start_pos..slice_end]);
        if candidate.len() > best.len() && candidate.chars().all(|c| !c.is_control()) {
            best = candidate;
        }
    }
    best
}

/// Offline-analysis-only auto-sizing heuristic. The exchange format is
/// pinned in production; this is kept for investigating unknown dumps,
/// never called from [`decode`].
#[cfg(any(test, feature = "diagnostics"))]
pub mod diagnostics {
    pub fn guess_record_boundaries(data: &[u8]) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut offset = 0usize;
        while offset + 8 <= data.len() && positions.len() <= 10 {
            let header = match super::read_header(data, offset) {
                Some(h) => h,
                None => break,
            };
            if header.transcode == super::SECURITY_TRANSCODE
                && header.message_length > 100
                && header.message_length < 200
            {
                positions.push(offset);
                offset += header.message_length as usize;
            } else {
                offset += 1;
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn build_v124_record(token: u32, symbol: &str, permitted: u16) -> Vec<u8> {
        let mut payload = vec![0u8; 113];
        payload[0..4].copy_from_slice(&token.to_le_bytes());
        let sym_bytes = symbol.as_bytes();
        payload[4..4 + sym_bytes.len()].copy_from_slice(sym_bytes);
        payload[14..16].copy_from_slice(b"EQ");
        payload[16..24].copy_from_slice(&123_456_789.0f64.to_le_bytes());
        payload[24..26].copy_from_slice(&1u16.to_le_bytes());
        let name = b"EXAMPLE COMPANY LIMITED ";
        payload[50..50 + name.len()].copy_from_slice(name);
        payload[111..113].copy_from_slice(&permitted.to_le_bytes());

        let mut rec = Vec::new();
        rec.extend_from_slice(&7u16.to_le_bytes());
        rec.extend_from_slice(&1_720_000_000u32.to_le_bytes());
        rec.extend_from_slice(&(8 + payload.len() as u16).to_le_bytes());
        rec.extend_from_slice(&payload);
        rec
    }

    #[test]
    fn decodes_v124_record() {
        let data = build_v124_record(13, "ABB", 1);
        let today = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        let rows = decode(&data, today).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_number, 13);
        assert_eq!(rows[0].symbol, "ABB");
        assert_eq!(rows[0].series, "EQ");
        assert_eq!(rows[0].settlement_cycle, SettlementCycle::TPlus1);
        assert_eq!(rows[0].permitted_to_trade, PermittedToTrade::Permitted);
        assert!(rows[0].company_name.contains("EXAMPLE COMPANY"));
        assert_eq!(rows[0].last_updated, today);
    }

    #[test]
    fn skips_nsetest_symbols() {
        let data = build_v124_record(99, "NSETEST1", 1);
        let today = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        assert!(decode(&data, today).unwrap().is_empty());
    }

    #[test]
    fn skips_non_security_transcodes() {
        let mut rec = Vec::new();
        rec.extend_from_slice(&1u16.to_le_bytes()); // not transcode 7
        rec.extend_from_slice(&0u32.to_le_bytes());
        rec.extend_from_slice(&16u16.to_le_bytes());
        rec.extend_from_slice(&[0u8; 8]);
        let today = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        assert!(decode(&rec, today).unwrap().is_empty());
    }

    #[test]
    fn stops_cleanly_when_declared_length_overruns_buffer() {
        let mut rec = Vec::new();
        rec.extend_from_slice(&7u16.to_le_bytes());
        rec.extend_from_slice(&0u32.to_le_bytes());
        rec.extend_from_slice(&200u16.to_le_bytes()); // declares far more than present
        rec.extend_from_slice(&[0u8; 20]);
        let today = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        assert!(decode(&rec, today).unwrap().is_empty());
    }
}
