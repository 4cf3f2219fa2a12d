// Ordering guarantees of the reception queue under concurrent producers and
// an active consumer.
use lambda_log_shipper::buffer::batch_queue;
use lambda_log_shipper::parser::{Batch, RawRecord, RecordBody};
use std::time::Duration;

fn batch(prefix: &str, count: usize) -> Batch {
    (0..count)
        .map(|i| RawRecord {
            time: "2024-01-01T00:00:00Z".to_string(),
            record_type: "function".to_string(),
            record: RecordBody::Text(format!("{prefix}-{i}")),
        })
        .collect()
}

#[tokio::test]
async fn batches_arrive_whole_and_in_order_while_draining() {
    let (queue, mut consumer) = batch_queue();

    // Producer pushes two batches while the consumer is already draining.
    let producer = tokio::spawn(async move {
        queue.push(batch("b1", 3)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(batch("b2", 2)).unwrap();
    });

    let mut seen = Vec::new();
    for _ in 0..2 {
        let popped = consumer.pop().await.expect("queue closed early");
        for record in &popped {
            seen.push(record.record.as_text().unwrap().to_string());
        }
    }
    producer.await.unwrap();

    // B1's records fully precede B2's, intra-batch order intact, nothing
    // interleaved.
    assert_eq!(seen, vec!["b1-0", "b1-1", "b1-2", "b2-0", "b2-1"]);
}

#[tokio::test]
async fn pop_blocks_until_a_batch_exists() {
    let (queue, mut consumer) = batch_queue();

    let waiter = tokio::spawn(async move { consumer.pop().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    queue.push(batch("late", 1)).unwrap();
    let popped = waiter.await.unwrap().unwrap();
    assert_eq!(popped[0].record.as_text(), Some("late-0"));
}

#[tokio::test]
async fn batches_are_never_split_under_load() {
    let (queue, mut consumer) = batch_queue();
    let total_batches = 50usize;

    let producer = tokio::spawn(async move {
        for n in 0..total_batches {
            queue.push(batch(&format!("batch{n}"), 4)).unwrap();
        }
    });

    for n in 0..total_batches {
        let popped = consumer.pop().await.unwrap();
        assert_eq!(popped.len(), 4);
        let expected_prefix = format!("batch{n}-");
        for (i, record) in popped.iter().enumerate() {
            assert_eq!(
                record.record.as_text().unwrap(),
                format!("{expected_prefix}{i}")
            );
        }
    }
    producer.await.unwrap();
}
