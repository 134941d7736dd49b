//! Flush path: chunk the buffered entries, encode them and submit one
//! `PutRecordBatch` per chunk.

use crate::client::{ClientFactory, DeliveryClient};
use crate::encoder::Encoder;
use crate::error::{DeliveryError, FlushError};
use crate::record::Entry;
use crate::stats::HookStats;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Hard per-call record limit of `PutRecordBatch`.
pub const MAX_BATCH_RECORDS: usize = 500;

/// Split `buf` into contiguous slices of at most `size` items.
///
/// An empty input yields no slices; only the last slice may be shorter
/// than `size`. A `size` of zero is treated as one.
pub fn split_batches<T>(buf: &[T], size: usize) -> Vec<&[T]> {
    buf.chunks(size.max(1)).collect()
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub batches: usize,
    pub delivered: usize,
    pub failed: usize,
    pub unauthorized: bool,
}

/// Owns the delivery client and sends buffered entries to the stream.
///
/// Lives inside the buffer loop; nothing else touches the client.
pub(crate) struct Flusher {
    stream_name: String,
    client: Arc<dyn DeliveryClient>,
    factory: Arc<dyn ClientFactory>,
    encoder: Arc<RwLock<Encoder>>,
    errors: broadcast::Sender<Arc<FlushError>>,
    stats: Arc<HookStats>,
    max_batch_records: usize,
    request_timeout: Duration,
}

impl Flusher {
    pub(crate) fn new(
        stream_name: String,
        factory: Arc<dyn ClientFactory>,
        encoder: Arc<RwLock<Encoder>>,
        errors: broadcast::Sender<Arc<FlushError>>,
        stats: Arc<HookStats>,
        max_batch_records: usize,
        request_timeout: Duration,
    ) -> Self {
        let client = factory.build();
        Self {
            stream_name,
            client,
            factory,
            encoder,
            errors,
            stats,
            max_batch_records: max_batch_records.clamp(1, MAX_BATCH_RECORDS),
            request_timeout,
        }
    }

    /// Send every entry in `buf`, in order, one batch per chunk.
    ///
    /// A failed chunk is reported on the error stream and the next chunk
    /// is still attempted. Nothing is retried.
    pub(crate) async fn flush(&mut self, buf: &[Entry]) -> FlushSummary {
        let mut summary = FlushSummary::default();

        for chunk in split_batches(buf, self.max_batch_records) {
            let records = self.encode_chunk(chunk, &mut summary);
            if records.is_empty() {
                continue;
            }
            let count = records.len();

            debug!(stream = %self.stream_name, records = count, "sending record batch");
            summary.batches += 1;
            HookStats::add(&self.stats.batches, 1);

            let result = timeout(
                self.request_timeout,
                self.client.put_record_batch(&self.stream_name, records),
            )
            .await;

            match result {
                Ok(Ok(output)) => {
                    summary.delivered += output.delivered;
                    HookStats::add(&self.stats.delivered, output.delivered);
                }
                Ok(Err(source)) => {
                    let lost = match &source {
                        DeliveryError::PartiallyFailed { failed, total } => {
                            let failed = (*failed).min(*total);
                            let accepted = total - failed;
                            summary.delivered += accepted;
                            HookStats::add(&self.stats.delivered, accepted);
                            failed
                        }
                        _ => count,
                    };
                    summary.failed += lost;
                    summary.unauthorized |= source.is_unauthorized();
                    self.report(
                        FlushError::Delivery {
                            stream_name: self.stream_name.clone(),
                            records: count,
                            source,
                        },
                        lost,
                    );
                }
                Err(_) => {
                    summary.failed += count;
                    self.report(
                        FlushError::Timeout {
                            stream_name: self.stream_name.clone(),
                            records: count,
                            timeout: self.request_timeout,
                        },
                        count,
                    );
                }
            }
        }

        if summary.unauthorized {
            self.refresh_client();
        }
        summary
    }

    /// Replace the client with a fresh one from the factory.
    pub(crate) fn refresh_client(&mut self) {
        debug!(stream = %self.stream_name, "rebuilding delivery client");
        self.client = self.factory.build();
    }

    // Filters run on a snapshot, so they may reconfigure the hook.
    fn encode_chunk(&self, chunk: &[Entry], summary: &mut FlushSummary) -> Vec<Vec<u8>> {
        let encoder = self
            .encoder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut records = Vec::with_capacity(chunk.len());
        let mut failures = Vec::new();
        for entry in chunk {
            match encoder.encode(entry) {
                Ok(bytes) => records.push(bytes),
                Err(e) => failures.push(e),
            }
        }

        for e in failures {
            summary.failed += 1;
            self.report(FlushError::Encode(e), 1);
        }
        records
    }

    fn report(&self, err: FlushError, lost: usize) {
        warn!(stream = %self.stream_name, error = %err, "log records lost");
        HookStats::add(&self.stats.failed, lost);
        // No subscriber is fine; the error has been logged.
        let _ = self.errors.send(Arc::new(err));
    }
}
