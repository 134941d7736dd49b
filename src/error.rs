use std::error::Error;
use std::time::Duration;

/// Boxed error type used at the transport boundary.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Error reported by a [`DeliveryClient`](crate::client::DeliveryClient).
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// Credentials were rejected. The hook rebuilds its client after a
    /// flush that produced this error.
    #[error("delivery stream rejected credentials: {0}")]
    Unauthorized(#[source] BoxError),

    /// The call succeeded but some records were not ingested.
    #[error("{failed} of {total} records were rejected by the delivery stream")]
    PartiallyFailed { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] BoxError),
}

impl DeliveryError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DeliveryError::Unauthorized(_))
    }
}

/// A record could not be turned into JSON.
#[derive(thiserror::Error, Debug)]
#[error("failed to encode log record: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Asynchronous failure published on the hook's error stream.
#[derive(thiserror::Error, Debug)]
pub enum FlushError {
    #[error("PutRecordBatch of {records} records to {stream_name:?} failed: {source}")]
    Delivery {
        stream_name: String,
        records: usize,
        #[source]
        source: DeliveryError,
    },

    #[error("PutRecordBatch of {records} records to {stream_name:?} timed out after {timeout:?}")]
    Timeout {
        stream_name: String,
        records: usize,
        timeout: Duration,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("buffer loop panicked: {0}")]
    LoopPanicked(String),
}

/// Error returned by the hook's control operations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    #[error("firehose hook is closed")]
    Closed,
}
