use async_trait::async_trait;
use firehose_log_sink::client::{BatchOutput, DeliveryClient};
use firehose_log_sink::error::{DeliveryError, FlushError, HookError};
use firehose_log_sink::layer::FirehoseLayer;
use firehose_log_sink::{Entry, FieldValue, FirehoseHook, HookConfig, Level};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};
use tracing_subscriber::layer::SubscriberExt;

const STREAM: &str = "test_stream";

#[derive(Default)]
struct MockClient {
    batches: Mutex<Vec<(String, Vec<Vec<u8>>)>>,
    fail: bool,
}

impl MockClient {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(|(_, r)| r.len()).collect()
    }

    fn records(&self) -> Vec<Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, records)| records.iter())
            .map(|r| serde_json::from_slice(r).unwrap())
            .collect()
    }
}

#[async_trait]
impl DeliveryClient for MockClient {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        let delivered = records.len();
        self.batches
            .lock()
            .unwrap()
            .push((stream_name.to_string(), records));
        if self.fail {
            return Err(DeliveryError::Other("service unavailable".into()));
        }
        Ok(BatchOutput { delivered })
    }
}

fn hook_with<C: DeliveryClient + 'static>(client: Arc<C>, config: HookConfig) -> FirehoseHook {
    FirehoseHook::with_config(
        STREAM,
        move || -> Arc<dyn DeliveryClient> { client.clone() },
        config,
    )
}

fn hook(client: Arc<MockClient>) -> FirehoseHook {
    hook_with(client, HookConfig::default())
}

async fn flush_sync(hook: &FirehoseHook) -> Result<firehose_log_sink::flush::FlushSummary, HookError> {
    timeout(Duration::from_secs(5), hook.flush_sync())
        .await
        .expect("flush_sync did not complete")
}

#[tokio::test]
async fn six_hundred_entries_make_two_ordered_batches() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());

    for i in 0..600 {
        hook.fire(Entry::new(Level::Info, format!("entry {i}")).with_field("seq", i as u64));
    }
    let summary = flush_sync(&hook).await.unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.delivered, 600);

    assert_eq!(client.batch_sizes(), vec![500, 100]);
    assert!(client.batches.lock().unwrap().iter().all(|(s, _)| s == STREAM));

    let seqs: Vec<u64> = client
        .records()
        .iter()
        .map(|r| r["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, (0..600).collect::<Vec<u64>>());
    assert_eq!(seqs.iter().collect::<HashSet<_>>().len(), 600);

    let stats = hook.stats();
    assert_eq!(stats.enqueued, 600);
    assert_eq!(stats.delivered, 600);
    assert_eq!(stats.batches, 2);
}

#[tokio::test]
async fn sync_flush_of_empty_buffer_completes() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());

    let summary = flush_sync(&hook).await.unwrap();
    assert_eq!(summary.batches, 0);
    assert!(client.batch_sizes().is_empty());
}

#[tokio::test]
async fn buffer_is_cleared_between_flushes() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());

    hook.fire(Entry::new(Level::Error, "first"));
    flush_sync(&hook).await.unwrap();
    hook.fire(Entry::new(Level::Error, "second"));
    flush_sync(&hook).await.unwrap();

    assert_eq!(client.batch_sizes(), vec![1, 1]);
    let messages: Vec<Value> = client.records().into_iter().map(|r| r["message"].clone()).collect();
    assert_eq!(messages, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn async_flush_is_delivered_before_later_sync_flush_returns() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());

    hook.fire(Entry::new(Level::Warn, "async"));
    hook.flush().await.unwrap();
    flush_sync(&hook).await.unwrap();

    assert_eq!(client.batch_sizes(), vec![1]);
}

#[tokio::test]
async fn wire_records_follow_encoder_settings() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());
    hook.add_ignore("password");
    hook.add_filter("card", |_| FieldValue::from("****"));
    hook.add_newline(true);

    hook.fire(
        Entry::new(Level::Error, "payment failed")
            .with_field("password", "hunter2")
            .with_field("card", "4111111111111111")
            .with_field("cause", FieldValue::error(std::io::Error::other("card declined"))),
    );
    flush_sync(&hook).await.unwrap();

    let batches = client.batches.lock().unwrap();
    let raw = String::from_utf8(batches[0].1[0].clone()).unwrap();
    assert_eq!(
        raw,
        "{\"card\":\"****\",\"cause\":\"card declined\",\"level\":\"error\",\"message\":\"payment failed\"}\n"
    );
}

#[tokio::test]
async fn failures_are_reported_and_every_chunk_is_attempted() {
    let client = Arc::new(MockClient::failing());
    let hook = hook_with(
        client.clone(),
        HookConfig {
            max_batch_records: 2,
            ..Default::default()
        },
    );
    let mut errors = hook.errors();

    for i in 0..5 {
        hook.fire(Entry::new(Level::Error, format!("entry {i}")));
    }
    let summary = flush_sync(&hook).await.unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.failed, 5);
    assert_eq!(client.batch_sizes(), vec![2, 2, 1]);

    let mut reported = Vec::new();
    for _ in 0..3 {
        match &*errors.recv().await.unwrap() {
            FlushError::Delivery { stream_name, records, .. } => {
                assert_eq!(stream_name, STREAM);
                reported.push(*records);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(reported, vec![2, 2, 1]);

    // Failed records are not re-queued.
    flush_sync(&hook).await.unwrap();
    assert_eq!(client.batch_sizes().len(), 3);
    assert_eq!(hook.stats().failed, 5);
}

struct RejectsOneClient;

#[async_trait]
impl DeliveryClient for RejectsOneClient {
    async fn put_record_batch(
        &self,
        _stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        Err(DeliveryError::PartiallyFailed {
            failed: 1,
            total: records.len(),
        })
    }
}

#[tokio::test]
async fn partially_failed_batch_counts_accepted_records() {
    let hook = hook_with(Arc::new(RejectsOneClient), HookConfig::default());
    let mut errors = hook.errors();

    for i in 0..10 {
        hook.fire(Entry::new(Level::Info, format!("entry {i}")));
    }
    let summary = flush_sync(&hook).await.unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.delivered, 9);
    assert_eq!(summary.failed, 1);

    let stats = hook.stats();
    assert_eq!(stats.delivered, 9);
    assert_eq!(stats.failed, 1);

    match &*errors.recv().await.unwrap() {
        FlushError::Delivery { records, source, .. } => {
            assert_eq!(*records, 10);
            assert!(matches!(
                source,
                DeliveryError::PartiallyFailed { failed: 1, total: 10 }
            ));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn slow_error_consumer_loses_oldest_errors() {
    let client = Arc::new(MockClient::failing());
    let hook = hook_with(
        client.clone(),
        HookConfig {
            max_batch_records: 1,
            error_capacity: 2,
            ..Default::default()
        },
    );
    let mut errors = hook.errors();

    for i in 0..4 {
        hook.fire(Entry::new(Level::Error, format!("entry {i}")));
    }
    flush_sync(&hook).await.unwrap();

    assert!(matches!(
        errors.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(2))
    ));
    assert!(errors.recv().await.is_ok());
    assert!(errors.recv().await.is_ok());
}

#[tokio::test]
async fn close_flushes_pending_entries_and_stops_the_loop() {
    let client = Arc::new(MockClient::default());
    let hook = hook(client.clone());

    for i in 0..3 {
        hook.fire(Entry::new(Level::Info, format!("entry {i}")));
    }
    let summary = timeout(Duration::from_secs(5), hook.close())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.delivered, 3);
    assert!(hook.is_closed());

    hook.fire(Entry::new(Level::Info, "late"));
    assert_eq!(hook.stats().dropped, 1);
    assert_eq!(hook.flush().await, Err(HookError::Closed));
    assert_eq!(hook.flush_sync().await, Err(HookError::Closed));
    assert_eq!(client.batch_sizes(), vec![3]);
}

#[tokio::test]
async fn refresh_client_rebuilds_from_factory() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let hook = FirehoseHook::new(STREAM, move || -> Arc<dyn DeliveryClient> {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockClient::default())
    });
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    hook.refresh_client().await.unwrap();
    flush_sync(&hook).await.unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    // A successful flush keeps the current client.
    hook.fire(Entry::new(Level::Info, "hello"));
    flush_sync(&hook).await.unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

struct BlockingClient {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl DeliveryClient for BlockingClient {
    async fn put_record_batch(
        &self,
        _stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(BatchOutput {
            delivered: records.len(),
        })
    }
}

#[tokio::test]
async fn fire_drops_new_entries_when_queue_is_full() {
    let client = Arc::new(BlockingClient {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let hook = hook_with(
        client.clone(),
        HookConfig {
            channel_capacity: 16,
            ..Default::default()
        },
    );

    hook.fire(Entry::new(Level::Info, "in flight"));
    hook.flush().await.unwrap();
    client.entered.notified().await;

    // The loop is busy sending; only the queue capacity is accepted.
    for i in 0..20 {
        hook.fire(Entry::new(Level::Info, format!("queued {i}")));
    }
    let stats = hook.stats();
    assert_eq!(stats.fired, 21);
    assert_eq!(stats.enqueued, 17);
    assert_eq!(stats.dropped, 4);

    client.release.notify_one();
    let flushed = tokio::spawn(async move {
        let summary = hook.flush_sync().await;
        (hook, summary)
    });
    client.entered.notified().await;
    client.release.notify_one();
    let (hook, summary) = timeout(Duration::from_secs(5), flushed).await.unwrap().unwrap();
    assert_eq!(summary.unwrap().delivered, 16);
    assert_eq!(hook.stats().delivered, 17);
}

struct PanickingClient;

#[async_trait]
impl DeliveryClient for PanickingClient {
    async fn put_record_batch(
        &self,
        _stream_name: &str,
        _records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        panic!("client exploded");
    }
}

#[tokio::test]
async fn loop_panic_closes_the_hook() {
    let hook = hook_with(Arc::new(PanickingClient), HookConfig::default());
    let mut errors = hook.errors();

    hook.fire(Entry::new(Level::Error, "boom"));
    assert_eq!(flush_sync(&hook).await, Err(HookError::Closed));

    let err = timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(&*err, FlushError::LoopPanicked(msg) if msg.contains("client exploded")));
    assert!(hook.is_closed());

    hook.fire(Entry::new(Level::Error, "after panic"));
    assert_eq!(hook.stats().dropped, 1);
    assert_eq!(hook.flush().await, Err(HookError::Closed));
}

#[tokio::test]
async fn tracing_events_are_forwarded() {
    let client = Arc::new(MockClient::default());
    let hook = Arc::new(hook(client.clone()));
    let subscriber = tracing_subscriber::registry().with(FirehoseLayer::new(hook.clone()));

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(user_id = 42, reason = "invalid password", "authentication failed");
        tracing::info!(message = "structured message wins");
        tracing::debug!("not in the level set");
    });
    flush_sync(&hook).await.unwrap();

    let records = client.records();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0],
        json!({
            "level": "error",
            "message": "authentication failed",
            "reason": "invalid password",
            "user_id": 42,
        })
    );
    assert_eq!(records[1], json!({"level": "info", "message": "structured message wins"}));
}
