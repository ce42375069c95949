//! Index snapshot decoder (`*.ind.gz`). Header (8 bytes) + INFO_DATA
//! (44 bytes) = 52 bytes per record.

use super::{gunzip, read_header};
use crate::error::Result;
use crate::models::IndexSnapshot;

const RECORD_SIZE: usize = 8 + 44;

pub fn decode(blob: &[u8]) -> Result<Vec<IndexSnapshot>> {
    let data = gunzip(blob)?;
    if data.len() < RECORD_SIZE {
        return Ok(Vec::new());
    }
    if data.len() % RECORD_SIZE != 0 {
        tracing::warn!(
            decompressed_len = data.len(),
            record_size = RECORD_SIZE,
            "ind blob length is not a multiple of the record size, truncating"
        );
    }
    let usable = (data.len() / RECORD_SIZE) * RECORD_SIZE;

    let mut out = Vec::with_capacity(usable / RECORD_SIZE);
    for chunk in data[..usable].chunks_exact(RECORD_SIZE) {
        let header = read_header(chunk, 0).expect("chunk is exactly RECORD_SIZE long");
        let p = &chunk[8..];
        let u32_at = |o: usize| u32::from_le_bytes([p[o], p[o + 1], p[o + 2], p[o + 3]]);

        out.push(IndexSnapshot {
            timestamp: header.timestamp,
            index_token: u32_at(0),
            open_index_value: u32_at(4),
            current_index_value: u32_at(8),
            high_index_value: u32_at(12),
            low_index_value: u32_at(16),
            percentage_change: u32_at(20),
            interval_open_index_value: u32_at(24),
            interval_high_index_value: u32_at(28),
            interval_low_index_value: u32_at(32),
            interval_close_index_value: u32_at(36),
            indicative_close_index_value: u32_at(40),
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

    fn build_record(index_token: u32, timestamp: u32) -> Vec<u8> {
        let mut rec = Vec::with_capacity(RECORD_SIZE);
        rec.extend_from_slice(&2u16.to_le_bytes());
        rec.extend_from_slice(&timestamp.to_le_bytes());
        rec.extend_from_slice(&52u16.to_le_bytes());
        rec.extend_from_slice(&index_token.to_le_bytes());
        for v in [2200000u32, 2210000, 2220000, 2195000, 50, 2201000, 2215000, 2197000, 2205000, 2206000] {
            rec.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(rec.len(), RECORD_SIZE);
        rec
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_single_record() {
        let raw = build_record(26000, 1_720_000_000);
        let blob = gzip(&raw);
        let rows = decode(&blob).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index_token, 26000);
        assert_eq!(rows[0].current_index_value, 2210000);
        assert_eq!(rows[0].indicative_close_index_value, 2206000);
    }
}
