//! The buffer loop: a single task that owns the pending entries.
//!
//! Producers only ever talk to it through channels, so the buffer itself
//! needs no lock. Flushing is driven entirely by callers; there is no timer.

use crate::error::FlushError;
use crate::flush::{FlushSummary, Flusher};
use crate::record::Entry;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A request to drain the buffer.
///
/// With `done` set the request is synchronous: the sender is completed
/// once every batch of the flush has been attempted.
#[derive(Debug, Default)]
pub struct FlushRequest {
    pub(crate) done: Option<oneshot::Sender<FlushSummary>>,
}

impl FlushRequest {
    pub fn is_sync(&self) -> bool {
        self.done.is_some()
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Flush(FlushRequest),
    RefreshClient,
    Shutdown(oneshot::Sender<FlushSummary>),
}

pub(crate) struct BufferLoop {
    buf: Vec<Entry>,
    entries: mpsc::Receiver<Entry>,
    commands: mpsc::Receiver<Command>,
    queue_capacity: usize,
    flusher: Flusher,
}

impl BufferLoop {
    pub(crate) fn new(
        entries: mpsc::Receiver<Entry>,
        commands: mpsc::Receiver<Command>,
        queue_capacity: usize,
        flusher: Flusher,
    ) -> Self {
        Self {
            buf: Vec::new(),
            entries,
            commands,
            queue_capacity,
            flusher,
        }
    }

    /// Spawn the loop together with a supervisor that marks the hook as
    /// closed once the loop is gone. A panic is written to stderr and
    /// published on the error stream; the loop is not restarted.
    pub(crate) fn spawn(
        self,
        closed: Arc<AtomicBool>,
        errors: broadcast::Sender<Arc<FlushError>>,
    ) -> JoinHandle<()> {
        let task = tokio::spawn(self.run());
        tokio::spawn(async move {
            let result = task.await;
            closed.store(true, Ordering::SeqCst);
            match result {
                Ok(()) => debug!("buffer loop stopped"),
                Err(e) if e.is_panic() => {
                    let msg = panic_message(e.into_panic());
                    eprintln!("firehose hook buffer loop panicked: {}", msg);
                    error!(panic = %msg, "buffer loop panicked, hook is closed");
                    let _ = errors.send(Arc::new(FlushError::LoopPanicked(msg)));
                }
                Err(e) => error!(error = %e, "buffer loop was cancelled"),
            }
        })
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                Some(entry) = self.entries.recv() => {
                    self.buf.push(entry);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Flush(request)) => self.flush(request).await,
                    Some(Command::RefreshClient) => self.flusher.refresh_client(),
                    Some(Command::Shutdown(done)) => {
                        let summary = self.flush_remaining().await;
                        let _ = done.send(summary);
                        break;
                    }
                    None => {
                        // Every handle is gone.
                        self.flush_remaining().await;
                        break;
                    }
                },
            }
        }
    }

    async fn flush(&mut self, request: FlushRequest) {
        debug!(sync = request.is_sync(), queued = self.buf.len(), "flush requested");
        self.drain_queue();
        let summary = self.flush_buffer().await;
        if let Some(done) = request.done {
            // The caller may have stopped waiting.
            let _ = done.send(summary);
        }
    }

    async fn flush_remaining(&mut self) -> FlushSummary {
        self.entries.close();
        while let Ok(entry) = self.entries.try_recv() {
            self.buf.push(entry);
        }
        self.flush_buffer().await
    }

    /// Move entries already waiting in the queue into the buffer so that a
    /// flush covers everything fired before it was requested. Bounded by
    /// the queue capacity so busy producers cannot stall the flush.
    fn drain_queue(&mut self) {
        for _ in 0..self.queue_capacity {
            match self.entries.try_recv() {
                Ok(entry) => self.buf.push(entry),
                Err(_) => break,
            }
        }
    }

    async fn flush_buffer(&mut self) -> FlushSummary {
        if self.buf.is_empty() {
            return FlushSummary::default();
        }
        let buf = std::mem::take(&mut self.buf);
        self.flusher.flush(&buf).await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
