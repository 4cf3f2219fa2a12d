use crate::parser::Batch;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("batch queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued_batches: u64,
    pub enqueued_records: u64,
    pub dequeued_batches: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued_batches: AtomicU64,
    enqueued_records: AtomicU64,
    dequeued_batches: AtomicU64,
}

/// Creates the single-producer/single-consumer batch queue decoupling the
/// push handler from conversion work. Unbounded on purpose: the host applies
/// its own flow control and must never be back-pressured.
pub fn batch_queue() -> (BatchQueue, BatchConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counters = Arc::new(QueueCounters::default());
    (
        BatchQueue {
            tx,
            counters: counters.clone(),
        },
        BatchConsumer { rx, counters },
    )
}

/// Producer half, held by the push listener. Enqueue appends a whole batch
/// atomically and returns immediately.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    tx: mpsc::UnboundedSender<Batch>,
    counters: Arc<QueueCounters>,
}

impl BatchQueue {
    pub fn push(&self, batch: Batch) -> Result<(), BufferError> {
        let records = batch.len() as u64;
        self.tx.send(batch).map_err(|_| BufferError::Closed)?;
        self.counters.enqueued_batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .enqueued_records
            .fetch_add(records, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

/// Consumer half, owned exclusively by the delivery coordinator.
#[derive(Debug)]
pub struct BatchConsumer {
    rx: mpsc::UnboundedReceiver<Batch>,
    counters: Arc<QueueCounters>,
}

impl BatchConsumer {
    /// Waits for the next batch in arrival order. Returns `None` once the
    /// producer is gone and the queue is empty.
    pub async fn pop(&mut self) -> Option<Batch> {
        let batch = self.rx.recv().await?;
        self.counters.dequeued_batches.fetch_add(1, Ordering::Relaxed);
        Some(batch)
    }

    /// Non-blocking variant used for the final drain sweep.
    pub fn try_pop(&mut self) -> Option<Batch> {
        let batch = self.rx.try_recv().ok()?;
        self.counters.dequeued_batches.fetch_add(1, Ordering::Relaxed);
        Some(batch)
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

impl QueueCounters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued_batches: self.enqueued_batches.load(Ordering::Relaxed),
            enqueued_records: self.enqueued_records.load(Ordering::Relaxed),
            dequeued_batches: self.dequeued_batches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{RawRecord, RecordBody};

    fn batch_of(messages: &[&str]) -> Batch {
        messages
            .iter()
            .map(|m| RawRecord {
                time: "2024-01-01T00:00:00Z".to_string(),
                record_type: "function".to_string(),
                record: RecordBody::Text(m.to_string()),
            })
            .collect()
    }

    #[tokio::test]
    async fn preserves_arrival_order() {
        let (queue, mut consumer) = batch_queue();
        queue.push(batch_of(&["a1", "a2"])).unwrap();
        queue.push(batch_of(&["b1"])).unwrap();

        let first = consumer.pop().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].record.as_text(), Some("a1"));

        let second = consumer.pop().await.unwrap();
        assert_eq!(second[0].record.as_text(), Some("b1"));
    }

    #[tokio::test]
    async fn pop_returns_none_after_producer_drop() {
        let (queue, mut consumer) = batch_queue();
        queue.push(batch_of(&["only"])).unwrap();
        drop(queue);

        assert!(consumer.pop().await.is_some());
        assert!(consumer.pop().await.is_none());
    }

    #[tokio::test]
    async fn counts_batches_and_records() {
        let (queue, mut consumer) = batch_queue();
        queue.push(batch_of(&["a", "b", "c"])).unwrap();
        queue.push(batch_of(&["d"])).unwrap();
        consumer.pop().await.unwrap();

        let stats = consumer.stats();
        assert_eq!(stats.enqueued_batches, 2);
        assert_eq!(stats.enqueued_records, 4);
        assert_eq!(stats.dequeued_batches, 1);
    }

    #[tokio::test]
    async fn try_pop_is_non_blocking() {
        let (queue, mut consumer) = batch_queue();
        assert!(consumer.try_pop().is_none());
        queue.push(batch_of(&["x"])).unwrap();
        assert!(consumer.try_pop().is_some());
        assert!(consumer.try_pop().is_none());
    }
}
