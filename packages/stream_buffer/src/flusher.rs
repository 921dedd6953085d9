use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::{FlushOutcome, MessageBuffer};

/// Handle to the background task that drives a buffer's flush cycle.
///
/// Exactly one task runs per handle, so at most one flush is ever in flight
/// from the scheduler. Dropping the handle stops the task without a final
/// flush; call [`shutdown`](Self::shutdown) to drain first.
pub struct FlushTask {
    buffer: MessageBuffer,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl MessageBuffer {
    /// Spawn the flush scheduler on the current tokio runtime.
    ///
    /// The task sleeps until [`ingest`](MessageBuffer::ingest) wakes it, waits
    /// `flush_delay` so a burst lands in one batch, flushes, and keeps
    /// re-flushing every `reschedule_delay` while the queue is non-empty.
    pub fn spawn_flusher(&self) -> FlushTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_flush_loop(self.clone(), cancel.clone()));
        info!(
            "Flush scheduler started (delay {:?}, reschedule {:?})",
            self.config().flush_delay,
            self.config().reschedule_delay
        );
        FlushTask {
            buffer: self.clone(),
            cancel,
            handle: Some(handle),
        }
    }
}

impl FlushTask {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the scheduler and flush whatever is still queued.
    pub async fn shutdown(mut self) -> FlushOutcome {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        let outcome = self.buffer.flush();
        debug!("Flush scheduler stopped, final flush: {:?}", outcome);
        outcome
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_flush_loop(buffer: MessageBuffer, cancel: CancellationToken) {
    let shared = buffer.inner.clone();
    let config = buffer.config().clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = shared.wake.notified() => {}
        }

        let mut delay = config.flush_delay;
        loop {
            if !sleep_or_cancel(delay, &cancel).await {
                return;
            }

            buffer.flush();

            // Clear the flag before looking at the queue so an ingest racing
            // with this check either sees `false` and notifies, or its message
            // is already counted here.
            shared.scheduled.store(false, Ordering::Release);
            if buffer.pending_count() == 0 || shared.scheduled.swap(true, Ordering::AcqRel) {
                break;
            }
            delay = config.reschedule_delay;
        }
    }
}
