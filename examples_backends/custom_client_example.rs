use std::sync::Arc;

use async_trait::async_trait;
use firehose_log_sink::{
    client::{BatchOutput, DeliveryClient},
    error::DeliveryError,
    Entry, FieldValue, FirehoseHook, Level,
};

/// Example of plugging in a completely custom transport by implementing
/// the `DeliveryClient` trait directly. Imagine this talks to some
/// Firehose-compatible ingest endpoint for which this crate does not
/// provide a built-in client.
struct StdoutClient;

#[async_trait]
impl DeliveryClient for StdoutClient {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        for record in &records {
            print!("[{}] {}", stream_name, String::from_utf8_lossy(record));
        }
        Ok(BatchOutput { delivered: records.len() })
    }
}

#[tokio::main]
async fn main() {
    let hook = FirehoseHook::new("custom-stream", || -> Arc<dyn DeliveryClient> {
        Arc::new(StdoutClient)
    });
    hook.add_newline(true);
    hook.add_filter("card", |_| FieldValue::from("****"));

    hook.fire(Entry::new(Level::Info, "custom client example started"));
    hook.fire(
        Entry::new(Level::Error, "payment declined")
            .with_field("card", "4111111111111111")
            .with_field("amount", 105),
    );

    hook.close().await.expect("hook closed");
}
