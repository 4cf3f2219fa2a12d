use super::shipper::Shipper;
use crate::buffer::BatchConsumer;
use crate::parser::{Batch, RecordConverter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sole consumer of the batch queue: pops batches, runs every record through
/// the converter, ships the NDJSON payload, and owns flush-on-shutdown.
pub struct DeliveryCoordinator {
    consumer: BatchConsumer,
    converter: Arc<RecordConverter>,
    shipper: Arc<Shipper>,
    cancel: CancellationToken,
}

impl DeliveryCoordinator {
    pub fn new(
        consumer: BatchConsumer,
        converter: Arc<RecordConverter>,
        shipper: Arc<Shipper>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            converter,
            shipper,
            cancel,
        }
    }

    /// Drain loop. Cancellation is observed only between batches: an
    /// in-flight batch always completes, then the remaining queue is swept
    /// and one final flush is forced before returning.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                popped = self.consumer.pop() => match popped {
                    Some(batch) => self.deliver(batch).await,
                    // Producer is gone; nothing more will ever arrive.
                    None => break,
                },
            }
        }
        self.final_drain().await;
    }

    async fn deliver(&self, batch: Batch) {
        let records = batch.len();
        let payload = self.converter.convert_batch(&batch);
        if payload.is_empty() {
            return;
        }
        debug!(records, bytes = payload.len(), "delivering batch");
        // Transport faults are retried inside the shipper and dropped after
        // exhaustion; the drain loop itself never stops on them.
        if let Err(err) = self.shipper.write(payload.as_bytes()).await {
            warn!(%err, records, "batch write did not fully succeed");
        }
        if let Err(err) = self.shipper.flush().await {
            warn!(%err, records, "batch flush did not fully succeed");
        }
    }

    async fn final_drain(&mut self) {
        let mut swept = 0usize;
        while let Some(batch) = self.consumer.try_pop() {
            self.deliver(batch).await;
            swept += 1;
        }
        // Idempotent when everything is already flushed.
        if let Err(err) = self.shipper.flush().await {
            warn!(%err, "final flush did not fully succeed");
        }
        info!(
            swept_batches = swept,
            stats = ?self.consumer.stats(),
            "delivery coordinator terminated"
        );
    }
}
