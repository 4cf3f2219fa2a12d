pub mod queue;

pub use queue::{BatchConsumer, BatchQueue, BufferError, QueueStats, batch_queue};
