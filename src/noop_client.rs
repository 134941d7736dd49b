use crate::client::{BatchOutput, ClientFactory, DeliveryClient};
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::Arc;

/// A client that accepts and discards every batch.
///
/// Useful for measuring the overhead of the hook itself without any
/// network I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopClient;

#[async_trait]
impl DeliveryClient for NoopClient {
    async fn put_record_batch(
        &self,
        _stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        Ok(BatchOutput {
            delivered: records.len(),
        })
    }
}

impl ClientFactory for NoopClient {
    fn build(&self) -> Arc<dyn DeliveryClient> {
        Arc::new(NoopClient)
    }
}
