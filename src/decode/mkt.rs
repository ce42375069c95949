//! Market-depth snapshot decoder (`*.mkt.gz`). Header (8 bytes) +
//! INFO_DATA (88 bytes) = 96 bytes per record.

use super::{gunzip, read_header};
use crate::error::Result;
use crate::models::MarketSnapshot;

const RECORD_SIZE: usize = 8 + 88;

pub fn decode(blob: &[u8]) -> Result<Vec<MarketSnapshot>> {
    let data = gunzip(blob)?;
    if data.len() < RECORD_SIZE {
        return Ok(Vec::new());
    }
    if data.len() % RECORD_SIZE != 0 {
        tracing::warn!(
            decompressed_len = data.len(),
            record_size = RECORD_SIZE,
            "mkt blob length is not a multiple of the record size, truncating"
        );
    }
    let usable = (data.len() / RECORD_SIZE) * RECORD_SIZE;

    let mut out = Vec::with_capacity(usable / RECORD_SIZE);
    for chunk in data[..usable].chunks_exact(RECORD_SIZE) {
        let header = read_header(chunk, 0).expect("chunk is exactly RECORD_SIZE long");
        let p = &chunk[8..];
        let u32_at = |o: usize| u32::from_le_bytes([p[o], p[o + 1], p[o + 2], p[o + 3]]);
        let u64_at = |o: usize| {
            u64::from_le_bytes([
                p[o],
                p[o + 1],
                p[o + 2],
                p[o + 3],
                p[o + 4],
                p[o + 5],
                p[o + 6],
                p[o + 7],
            ])
        };

        out.push(MarketSnapshot {
            timestamp: header.timestamp,
            security_token: u32_at(0),
            last_traded_price: u32_at(4),
            best_buy_quantity: u64_at(8),
            best_buy_price: u32_at(16),
            best_sell_quantity: u64_at(20),
            best_sell_price: u32_at(28),
            total_traded_quantity: u64_at(32),
            average_traded_price: u32_at(40),
            open_price: u32_at(44),
            high_price: u32_at(48),
            low_price: u32_at(52),
            close_price: u32_at(56),
            interval_open_price: u32_at(60),
            interval_high_price: u32_at(64),
            interval_low_price: u32_at(68),
            interval_close_price: u32_at(72),
            interval_total_traded_quantity: u64_at(76),
            indicative_close_price: u32_at(84),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_record(security_token: u32, timestamp: u32) -> Vec<u8> {
        let mut rec = Vec::with_capacity(RECORD_SIZE);
        rec.extend_from_slice(&1u16.to_le_bytes()); // transcode
        rec.extend_from_slice(&timestamp.to_le_bytes());
        rec.extend_from_slice(&96u16.to_le_bytes()); // message_length
        rec.extend_from_slice(&security_token.to_le_bytes());
        rec.extend_from_slice(&1234u32.to_le_bytes()); // last_traded_price
        rec.extend_from_slice(&100u64.to_le_bytes()); // best_buy_quantity
        rec.extend_from_slice(&1230u32.to_le_bytes()); // best_buy_price
        rec.extend_from_slice(&200u64.to_le_bytes()); // best_sell_quantity
        rec.extend_from_slice(&1240u32.to_le_bytes()); // best_sell_price
        rec.extend_from_slice(&5000u64.to_le_bytes()); // total_traded_quantity
        rec.extend_from_slice(&1235u32.to_le_bytes()); // average_traded_price
        rec.extend_from_slice(&1200u32.to_le_bytes()); // open
        rec.extend_from_slice(&1250u32.to_le_bytes()); // high
        rec.extend_from_slice(&1190u32.to_le_bytes()); // low
        rec.extend_from_slice(&1234u32.to_le_bytes()); // close
        rec.extend_from_slice(&1201u32.to_le_bytes()); // interval_open
        rec.extend_from_slice(&1245u32.to_le_bytes()); // interval_high
        rec.extend_from_slice(&1195u32.to_le_bytes()); // interval_low
        rec.extend_from_slice(&1230u32.to_le_bytes()); // interval_close
        rec.extend_from_slice(&900u64.to_le_bytes()); // interval_total_traded_quantity
        rec.extend_from_slice(&1233u32.to_le_bytes()); // indicative_close_price
        assert_eq!(rec.len(), RECORD_SIZE);
        rec
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_two_records() {
        let mut raw = build_record(11536, 1_720_000_000);
        raw.extend(build_record(11537, 1_720_000_060));
        let blob = gzip(&raw);

        let rows = decode(&blob).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].security_token, 11536);
        assert_eq!(rows[0].timestamp, 1_720_000_000);
        assert_eq!(rows[0].best_buy_quantity, 100);
        assert_eq!(rows[1].security_token, 11537);
        assert_eq!(rows[1].interval_total_traded_quantity, 900);
    }

    #[test]
    fn empty_blob_yields_empty_batch() {
        let blob = gzip(&[]);
        assert!(decode(&blob).unwrap().is_empty());
    }

    #[test]
    fn truncated_tail_is_dropped_not_errored() {
        let mut raw = build_record(1, 1);
        raw.extend_from_slice(&[0u8; 10]); // partial trailing record
        let blob = gzip(&raw);
        let rows = decode(&blob).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
