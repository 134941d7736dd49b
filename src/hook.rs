use crate::buffer::{BufferLoop, Command, FlushRequest};
use crate::client::ClientFactory;
use crate::encoder::Encoder;
use crate::error::{FlushError, HookError};
use crate::flush::{FlushSummary, Flusher, MAX_BATCH_RECORDS};
use crate::level::{Level, DEFAULT_LEVELS};
use crate::record::{Entry, FieldValue};
use crate::stats::{HookStats, StatsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Configuration of a [`FirehoseHook`].
///
/// **Fields**
/// - `channel_capacity`: number of entries the queue holds before `fire`
///   starts dropping new ones.
/// - `error_capacity`: number of undelivered errors kept for slow
///   subscribers of [`FirehoseHook::errors`]; the oldest are dropped first.
/// - `request_timeout`: upper bound for a single `PutRecordBatch` call.
/// - `max_batch_records`: records per call, at most 500.
/// - `levels`: initial level set, see [`FirehoseHook::set_levels`].
/// - `add_newline`: append `\n` to every record.
#[derive(Clone, Debug)]
pub struct HookConfig {
    pub channel_capacity: usize,
    pub error_capacity: usize,
    pub request_timeout: Duration,
    pub max_batch_records: usize,
    pub levels: Option<Vec<Level>>,
    pub add_newline: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            error_capacity: 64,
            request_timeout: Duration::from_secs(30),
            max_batch_records: MAX_BATCH_RECORDS,
            levels: Some(DEFAULT_LEVELS.to_vec()),
            add_newline: false,
        }
    }
}

/// Log hook that batches entries into a Firehose delivery stream.
///
/// Entries handed to [`fire`](Self::fire) are queued for a background
/// buffer loop and only sent when a flush is requested. Delivery failures
/// never surface from `fire`; subscribe to [`errors`](Self::errors) to
/// observe them.
///
/// Must be created from within a Tokio runtime.
pub struct FirehoseHook {
    stream_name: String,
    entries: mpsc::Sender<Entry>,
    commands: mpsc::Sender<Command>,
    errors: broadcast::Sender<Arc<FlushError>>,
    encoder: Arc<RwLock<Encoder>>,
    levels: RwLock<Option<Vec<Level>>>,
    stats: Arc<HookStats>,
    closed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FirehoseHook {
    /// Create a hook for `stream_name` with [`HookConfig::default`].
    pub fn new(stream_name: impl Into<String>, factory: impl ClientFactory + 'static) -> Self {
        Self::with_config(stream_name, factory, HookConfig::default())
    }

    /// Create a hook and spawn its buffer loop.
    ///
    /// Minimal thresholds are enforced for the capacities and the timeout
    /// to avoid degenerate configurations.
    pub fn with_config(
        stream_name: impl Into<String>,
        factory: impl ClientFactory + 'static,
        config: HookConfig,
    ) -> Self {
        let stream_name = stream_name.into();
        let channel_capacity = config.channel_capacity.max(16);
        let error_capacity = config.error_capacity.max(1);
        let request_timeout = config.request_timeout.max(Duration::from_millis(10));

        let (entries_tx, entries_rx) = mpsc::channel(channel_capacity);
        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (errors_tx, _) = broadcast::channel(error_capacity);

        let mut encoder = Encoder::new();
        encoder.set_newline(config.add_newline);
        let encoder = Arc::new(RwLock::new(encoder));
        let stats = Arc::new(HookStats::default());
        let closed = Arc::new(AtomicBool::new(false));

        let flusher = Flusher::new(
            stream_name.clone(),
            Arc::new(factory),
            Arc::clone(&encoder),
            errors_tx.clone(),
            Arc::clone(&stats),
            config.max_batch_records,
            request_timeout,
        );
        let handle = BufferLoop::new(entries_rx, commands_rx, channel_capacity, flusher)
            .spawn(Arc::clone(&closed), errors_tx.clone());

        Self {
            stream_name,
            entries: entries_tx,
            commands: commands_tx,
            errors: errors_tx,
            encoder,
            levels: RwLock::new(config.levels),
            stats,
            closed,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Queue one entry for delivery.
    ///
    /// Never blocks and never fails. When the queue is full, or the hook
    /// is closed, the entry is dropped and counted in [`stats`](Self::stats).
    pub fn fire(&self, entry: Entry) {
        self.stats.fired.fetch_add(1, Ordering::Relaxed);
        match self.entries.try_send(entry) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                if should_report_drop(dropped) {
                    eprintln!(
                        "firehose hook queue full or closed, dropping log entry ({} dropped so far)",
                        dropped + 1
                    );
                }
            }
        }
    }

    /// Request an asynchronous flush. Returns once the buffer loop has
    /// accepted the request.
    pub async fn flush(&self) -> Result<(), HookError> {
        self.send(Command::Flush(FlushRequest::default())).await
    }

    /// Flush and wait until every batch has been attempted.
    ///
    /// Completes even when there is nothing to send. Delivery failures are
    /// reported on the error stream and counted in the returned summary.
    pub async fn flush_sync(&self) -> Result<FlushSummary, HookError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(FlushRequest { done: Some(tx) })).await?;
        rx.await.map_err(|_| HookError::Closed)
    }

    /// Ask the buffer loop to rebuild its delivery client from the factory,
    /// e.g. after rotating credentials.
    pub async fn refresh_client(&self) -> Result<(), HookError> {
        self.send(Command::RefreshClient).await
    }

    /// Flush everything still queued, stop the buffer loop and wait for it.
    ///
    /// Entries fired afterwards are dropped.
    pub async fn close(&self) -> Result<FlushSummary, HookError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        let summary = rx.await.map_err(|_| HookError::Closed)?;

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(summary)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.commands.is_closed()
    }

    /// Subscribe to asynchronous delivery errors.
    ///
    /// Only errors raised after subscribing are received. The stream is
    /// bounded by [`HookConfig::error_capacity`]; a subscriber that falls
    /// behind loses the oldest errors. Without subscribers errors are only
    /// logged.
    pub fn errors(&self) -> broadcast::Receiver<Arc<FlushError>> {
        self.errors.subscribe()
    }

    /// Levels the host logger should fire this hook for. `None` when unset.
    pub fn levels(&self) -> Option<Vec<Level>> {
        self.levels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_levels(&self, levels: Option<Vec<Level>>) {
        *self.levels.write().unwrap_or_else(PoisonError::into_inner) = levels;
    }

    /// Whether entries of `level` should be fired.
    pub fn is_enabled(&self, level: Level) -> bool {
        self.levels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|levels| levels.contains(&level))
    }

    /// Omit the field `name` from every record.
    pub fn add_ignore(&self, name: impl Into<String>) {
        self.encoder_mut().add_ignore(name);
    }

    /// Transform the field `name` with `filter` before encoding.
    pub fn add_filter<F>(&self, name: impl Into<String>, filter: F)
    where
        F: Fn(FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.encoder_mut().add_filter(name, filter);
    }

    /// Toggle the trailing newline after each record.
    pub fn add_newline(&self, add_newline: bool) {
        self.encoder_mut().set_newline(add_newline);
    }

    /// Copy of the current serialization settings.
    pub fn encoder(&self) -> Encoder {
        self.encoder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn encoder_mut(&self) -> std::sync::RwLockWriteGuard<'_, Encoder> {
        self.encoder.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, command: Command) -> Result<(), HookError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HookError::Closed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| HookError::Closed)
    }
}

// Report the first drop and then every 1000th, to keep stderr readable.
fn should_report_drop(dropped_before: u64) -> bool {
    dropped_before % 1000 == 0
}

#[cfg(feature = "firehose")]
impl FirehoseHook {
    /// Create a hook that sends to an Amazon Data Firehose delivery stream
    /// using clients built from `sdk_config`.
    pub fn from_sdk_config(
        stream_name: impl Into<String>,
        sdk_config: aws_config::SdkConfig,
    ) -> Self {
        Self::new(
            stream_name,
            crate::firehose::FirehoseClientFactory::new(sdk_config),
        )
    }
}
