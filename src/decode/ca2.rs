//! Call-auction snapshot decoder (`*.ca2.gz`). Header (8 bytes) +
//! INFO_DATA (78 bytes, with 4 bytes of trailing padding) = 86 bytes
//! per record.

use super::{gunzip, read_header};
use crate::error::Result;
use crate::models::CallAuctionSnapshot;

const RECORD_SIZE: usize = 8 + 78;

pub fn decode(blob: &[u8]) -> Result<Vec<CallAuctionSnapshot>> {
    let data = gunzip(blob)?;
    if data.len() < RECORD_SIZE {
        return Ok(Vec::new());
    }
    if data.len() % RECORD_SIZE != 0 {
        tracing::warn!(
            decompressed_len = data.len(),
            record_size = RECORD_SIZE,
            "ca2 blob length is not a multiple of the record size, truncating"
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
        let char_at = |o: usize| p[o] as char;

        out.push(CallAuctionSnapshot {
            timestamp: header.timestamp,
            security_token: u32_at(0),
            last_traded_price: u32_at(4),
            best_buy_quantity: u64_at(8),
            best_buy_price: u32_at(16),
            buy_bbmm_flag: char_at(20),
            best_sell_quantity: u64_at(21),
            best_sell_price: u32_at(29),
            sell_bbmm_flag: char_at(33),
            total_traded_quantity: u64_at(34),
            indicative_traded_quantity: u64_at(42),
            average_traded_price: u32_at(50),
            first_open_price: u32_at(54),
            open_price: u32_at(58),
            high_price: u32_at(62),
            low_price: u32_at(66),
            close_price: u32_at(70),
            // bytes 74..78 are trailing padding, unused.
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
        rec.extend_from_slice(&3u16.to_le_bytes());
        rec.extend_from_slice(&timestamp.to_le_bytes());
        rec.extend_from_slice(&86u16.to_le_bytes());
        rec.extend_from_slice(&security_token.to_le_bytes());
        rec.extend_from_slice(&500u32.to_le_bytes()); // last_traded_price
        rec.extend_from_slice(&10u64.to_le_bytes()); // best_buy_quantity
        rec.extend_from_slice(&499u32.to_le_bytes()); // best_buy_price
        rec.push(b'Y'); // buy_bbmm_flag
        rec.extend_from_slice(&20u64.to_le_bytes()); // best_sell_quantity
        rec.extend_from_slice(&501u32.to_le_bytes()); // best_sell_price
        rec.push(b'N'); // sell_bbmm_flag
        rec.extend_from_slice(&1000u64.to_le_bytes()); // total_traded_quantity
        rec.extend_from_slice(&1500u64.to_le_bytes()); // indicative_traded_quantity
        rec.extend_from_slice(&500u32.to_le_bytes()); // average_traded_price
        rec.extend_from_slice(&498u32.to_le_bytes()); // first_open_price
        rec.extend_from_slice(&499u32.to_le_bytes()); // open
        rec.extend_from_slice(&505u32.to_le_bytes()); // high
        rec.extend_from_slice(&495u32.to_le_bytes()); // low
        rec.extend_from_slice(&500u32.to_le_bytes()); // close
        rec.extend_from_slice(&[0u8; 4]); // trailing padding
        assert_eq!(rec.len(), RECORD_SIZE);
        rec
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_flags_and_quantities() {
        let raw = build_record(2885, 1_720_000_500);
        let blob = gzip(&raw);
        let rows = decode(&blob).unwrap();
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.security_token, 2885);
        assert_eq!(r.buy_bbmm_flag, 'Y');
        assert_eq!(r.sell_bbmm_flag, 'N');
        assert_eq!(r.indicative_traded_quantity, 1500);
        assert_eq!(r.first_open_price, 498);
        assert_eq!(r.close_price, 500);
    }
}
