//! Binary decoders (C2). One module per file family, dispatched by
//! filename suffix. All multi-byte integers in the NSE snapshot and
//! securities-master formats are little-endian.

pub mod bhavcopy;
pub mod ca2;
pub mod ind;
pub mod mkt;
pub mod securities;

use crate::error::{IngestError, Result};
use crate::models::RecordBatch;

/// Read an 8-byte little-endian record header `<H I H>` (transcode,
/// timestamp, message_length) at `offset`.
pub(crate) fn read_header(data: &[u8], offset: usize) -> Option<crate::models::RecordHeader> {
    if data.len() < offset + 8 {
        return None;
    }
    let transcode = u16::from_le_bytes([data[offset], data[offset + 1]]);
    let timestamp = u32::from_le_bytes([
        data[offset + 2],
        data[offset + 3],
        data[offset + 4],
        data[offset + 5],
    ]);
    let message_length = u16::from_le_bytes([data[offset + 6], data[offset + 7]]);
    Some(crate::models::RecordHeader {
        transcode,
        timestamp,
        message_length,
    })
}

fn gunzip(blob: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(blob);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| IngestError::decode(anyhow::anyhow!("gzip decompression failed: {e}")))?;
    Ok(out)
}

/// Decode a snapshot blob by its remote filename's suffix. Returns
/// `None` for a suffix this crate does not treat as a snapshot file
/// (SPEC_FULL.md §4.6 step 3a: "uninteresting" paths are skipped, not
/// errored).
pub fn decode_snapshot(filename: &str, blob: &[u8]) -> Result<Option<RecordBatch>> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".mkt.gz") {
        Ok(Some(RecordBatch::Mkt(mkt::decode(blob)?)))
    } else if lower.ends_with(".ind.gz") {
        Ok(Some(RecordBatch::Ind(ind::decode(blob)?)))
    } else if lower.ends_with(".ca2.gz") {
        Ok(Some(RecordBatch::Ca2(ca2::decode(blob)?)))
    } else {
        Ok(None)
    }
}

pub(crate) fn is_interesting_suffix(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".mkt.gz") || lower.ends_with(".ind.gz") || lower.ends_with(".ca2.gz")
}
