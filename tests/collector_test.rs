// The local push endpoint: parses deliveries, enqueues them whole, and
// never back-pressures the pusher.
use lambda_log_shipper::buffer::batch_queue;
use lambda_log_shipper::collector::LogListener;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn delivery_is_parsed_and_enqueued_whole() {
    let (queue, mut consumer) = batch_queue();
    let listener = LogListener::bind(0, queue).await.unwrap();
    let port = listener.local_addr().port();
    let cancel = CancellationToken::new();
    let task = listener.spawn(cancel.clone());

    let body = json!([
        {"time": "T1", "type": "function", "record": "hello\n"},
        {"time": "T2", "type": "platform.start", "record": {"requestId": "r-1"}}
    ]);
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let batch = tokio::time::timeout(Duration::from_secs(2), consumer.pop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].record.as_text(), Some("hello\n"));
    assert_eq!(batch[1].time, "T2");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn malformed_delivery_is_acknowledged_and_discarded() {
    let (queue, mut consumer) = batch_queue();
    let listener = LogListener::bind(0, queue).await.unwrap();
    let port = listener.local_addr().port();
    let cancel = CancellationToken::new();
    let task = listener.spawn(cancel.clone());

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/"))
        .body("this is not json")
        .send()
        .await
        .unwrap();
    // Still 200: the host must never see an error for a bad body.
    assert_eq!(response.status(), 200);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(consumer.try_pop().is_none());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn deliveries_keep_arrival_order() {
    let (queue, mut consumer) = batch_queue();
    let listener = LogListener::bind(0, queue).await.unwrap();
    let port = listener.local_addr().port();
    let cancel = CancellationToken::new();
    let task = listener.spawn(cancel.clone());

    let client = reqwest::Client::new();
    for n in 0..5 {
        let body = json!([{"time": format!("T{n}"), "type": "function", "record": format!("m{n}")}]);
        client
            .post(format!("http://127.0.0.1:{port}/"))
            .json(&body)
            .send()
            .await
            .unwrap();
    }

    for n in 0..5 {
        let batch = tokio::time::timeout(Duration::from_secs(2), consumer.pop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].time, format!("T{n}"));
    }

    cancel.cancel();
    task.await.unwrap();
}
