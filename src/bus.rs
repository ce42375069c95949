//! Subscriber bus (C5): in-process fan-out of decoded record batches
//! to live subscribers. Grounded on `main.rs`'s
//! `broadcast::channel::<WsServerEvent>(1000)` initialization and on
//! `services/broadcaster.py`'s per-connection failure isolation.
//!
//! Backpressure policy (SPEC_FULL.md §9, the resolved Open Question):
//! drop-oldest, not disconnect. `tokio::sync::broadcast`'s ring buffer
//! gives every subscriber this for free — a lagged subscriber observes
//! a gap (logged) rather than being torn down, and a slow subscriber
//! never blocks `publish`.

use crate::models::RecordBatch;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<Arc<RecordBatch>>,
}

impl Bus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish never blocks on a single slow or gone subscriber: each
    /// receiver owns an independent cursor into the ring buffer.
    pub fn publish(&self, batch: RecordBatch) {
        let kind = batch.kind();
        let count = batch.len();
        let shared = Arc::new(batch);
        match self.sender.send(shared) {
            Ok(subscriber_count) => {
                tracing::debug!(kind = ?kind, records = count, subscribers = subscriber_count, "batch_published");
            }
            Err(_) => {
                // No subscribers currently attached; not an error.
            }
        }
    }

    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            inner: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BusReceiver {
    inner: broadcast::Receiver<Arc<RecordBatch>>,
}

impl BusReceiver {
    /// Await the next batch. A `Lagged` gap is logged and transparently
    /// skipped past rather than treated as a subscriber error; only a
    /// closed sender ends the stream.
    pub async fn recv(&mut self) -> Option<Arc<RecordBatch>> {
        loop {
            match self.inner.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber_lagged_dropping_oldest");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexSnapshot;

    fn sample_batch() -> RecordBatch {
        RecordBatch::Ind(vec![IndexSnapshot {
            timestamp: 1,
            index_token: 26000,
            open_index_value: 1,
            current_index_value: 1,
            high_index_value: 1,
            low_index_value: 1,
            percentage_change: 0,
            interval_open_index_value: 1,
            interval_high_index_value: 1,
            interval_low_index_value: 1,
            interval_close_index_value: 1,
            indicative_close_index_value: 1,
        }])
    }

    #[tokio::test]
    async fn subscriber_receives_published_batch() {
        let bus = Bus::new();
        let mut sub = bus.subscribe();
        bus.publish(sample_batch());
        let got = sub.recv().await.unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = Bus::new();
        bus.publish(sample_batch());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn fan_out_isolation_other_subscriber_unaffected_by_a_gone_one() {
        let bus = Bus::new();
        let mut alive = bus.subscribe();
        {
            let _dropped = bus.subscribe();
        }
        bus.publish(sample_batch());
        let got = alive.recv().await.unwrap();
        assert_eq!(got.kind(), crate::models::RecordKind::Ind);
    }
}
