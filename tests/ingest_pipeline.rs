//! End-to-end exercise of the decode -> store -> bus -> ledger pipeline
//! that `Watcher::process_one` drives per file, without a live SFTP
//! session (SPEC_FULL.md §8, scenarios S1/S2/S4).

use flate2::write::GzEncoder;
use flate2::Compression;
use nse_cm_ingest::bus::Bus;
use nse_cm_ingest::decode;
use nse_cm_ingest::ledger::Ledger;
use nse_cm_ingest::models::RecordKind;
use nse_cm_ingest::store::BlobStore;
use std::io::Write;
use std::sync::Arc;

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

/// A single well-formed MKT record (header + 88-byte payload). Only
/// `security_token` is asserted on by the caller, so the remaining
/// payload bytes are left zeroed.
fn mkt_record(security_token: u32, timestamp: u32) -> Vec<u8> {
    let mut rec = Vec::new();
    rec.extend_from_slice(&1u16.to_le_bytes());
    rec.extend_from_slice(&timestamp.to_le_bytes());
    rec.extend_from_slice(&96u16.to_le_bytes());
    rec.extend_from_slice(&security_token.to_le_bytes());
    rec.resize(8 + 88, 0);
    rec
}

/// Simulates one `Watcher::process_one` pass for a single remote file:
/// decode, persist, publish, mark-processed — and confirms the same
/// remote path is a no-op to ingest a second time.
#[test]
fn a_fresh_mkt_file_is_decoded_persisted_published_and_marked_exactly_once() {
    let store = Arc::new(BlobStore::open(":memory:").unwrap());
    let ledger = Arc::new(Ledger::new(store.conn_handle()));
    let bus = Bus::new();
    let mut sub = bus.subscribe();

    let remote_path = "/CM30/DATA/July082025/CM0000000001.mkt.gz";
    let filename = "CM0000000001.mkt.gz";
    let blob = gzip(&mkt_record(11536, 1_720_000_000));

    assert!(!ledger.seen(remote_path).unwrap());

    let batch = decode::decode_snapshot(filename, &blob).unwrap().unwrap();
    assert_eq!(batch.kind(), RecordKind::Mkt);
    assert_eq!(batch.len(), 1);

    store.insert_batch(&batch).unwrap();
    bus.publish(batch);
    ledger.mark(remote_path).unwrap();

    let published = block_on_recv(&mut sub);
    assert_eq!(published.kind(), RecordKind::Mkt);

    // The watcher cycle checks this before decoding; a second cycle
    // over the same listing would skip the file entirely.
    assert!(ledger.seen(remote_path).unwrap());
}

#[test]
fn an_uninteresting_suffix_is_marked_without_decoding() {
    let store = Arc::new(BlobStore::open(":memory:").unwrap());
    let ledger = Arc::new(Ledger::new(store.conn_handle()));

    let remote_path = "/CM30/DATA/July082025/README.txt";
    assert!(!decode::is_interesting_suffix("README.txt"));
    ledger.mark(remote_path).unwrap();
    assert!(ledger.seen(remote_path).unwrap());
}

/// Minimal single-threaded block-on for the one-shot broadcast receive
/// in this test, avoiding a `#[tokio::test]` runtime for a pipeline
/// that is otherwise fully synchronous.
fn block_on_recv(
    sub: &mut nse_cm_ingest::bus::BusReceiver,
) -> Arc<nse_cm_ingest::models::RecordBatch> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    rt.block_on(sub.recv()).expect("publisher sent a batch")
}
