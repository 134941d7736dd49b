use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of one accepted `PutRecordBatch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutput {
    /// Number of records the stream accepted.
    pub delivered: usize,
}

/// Transport to a Firehose-style delivery stream.
///
/// Implementations send one batch of opaque records (at most 500) to the
/// named stream. The hook calls this from its buffer loop only, one batch
/// at a time, and never from the application's logging call-site.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Submit one batch of records to `stream_name`.
    ///
    /// **Returns**
    /// - `Ok(..)` if the batch was accepted.
    /// - `Err(DeliveryError::Unauthorized)` when credentials were rejected;
    ///   the hook will rebuild its client from the factory.
    /// - `Err(..)` for any other failure. The batch is reported on the
    ///   hook's error stream and not retried.
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError>;
}

/// Builds [`DeliveryClient`] handles for the hook.
///
/// Called once on construction and again whenever the client has to be
/// recreated (explicit refresh or rejected credentials).
pub trait ClientFactory: Send + Sync {
    fn build(&self) -> Arc<dyn DeliveryClient>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Arc<dyn DeliveryClient> + Send + Sync,
{
    fn build(&self) -> Arc<dyn DeliveryClient> {
        self()
    }
}
