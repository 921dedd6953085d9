use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, trace};

use crate::error::BufferError;
use crate::message::StreamMessage;
use crate::query::{DirectionFilter, ViewFilter};

/// Visible log capacity used when nothing else is configured.
pub const MAX_MESSAGES: usize = 1000;

/// Coalescing window before the first flush after a quiet period (one frame).
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(16);

/// Delay before re-flushing when messages arrived during a flush.
pub const DEFAULT_RESCHEDULE_DELAY: Duration = Duration::from_millis(50);

/// Tunables for a [`MessageBuffer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum number of visible messages
    pub capacity: usize,
    /// Wait after the first ingest before flushing
    pub flush_delay: Duration,
    /// Wait between back-to-back flushes while the queue keeps filling
    pub reschedule_delay: Duration,
    /// Broadcast channel capacity for [`BufferEvent`]s
    pub event_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_MESSAGES,
            flush_delay: DEFAULT_FLUSH_DELAY,
            reschedule_delay: DEFAULT_RESCHEDULE_DELAY,
            event_capacity: 256,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Notifications published after each committed state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferEvent {
    /// A batch was merged into the visible log
    Flushed {
        appended: usize,
        evicted: usize,
        len: usize,
    },
    /// A batch was discarded because the buffer was paused
    Dropped { discarded: usize },
    Cleared,
    Reset,
    FilterChanged(DirectionFilter),
    SearchChanged(String),
    PauseToggled(bool),
}

/// Result of one [`MessageBuffer::flush`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// Another flush is in progress; this call did nothing
    Busy,
    /// The batch became visible; `evicted` oldest entries were dropped to stay in capacity
    Merged { appended: usize, evicted: usize },
    /// The buffer was paused and the batch was discarded
    Dropped { discarded: usize },
}

/// Consistent copy of the buffer's visible state.
#[derive(Clone, Debug, Default)]
pub struct BufferSnapshot {
    pub messages: Vec<StreamMessage>,
    pub is_paused: bool,
    pub filter_direction: DirectionFilter,
    pub search_term: String,
}

impl BufferSnapshot {
    pub fn view_filter(&self) -> ViewFilter {
        ViewFilter::new(self.filter_direction, &self.search_term)
    }

    /// The derived filtered view of this snapshot.
    pub fn filtered(&self) -> Vec<&StreamMessage> {
        self.view_filter().apply(&self.messages)
    }
}

#[derive(Debug, Default)]
struct BufferState {
    messages: VecDeque<StreamMessage>,
    is_paused: bool,
    filter_direction: DirectionFilter,
    search_term: String,
}

pub(crate) struct Shared {
    config: BufferConfig,
    pending: Mutex<Vec<StreamMessage>>,
    state: RwLock<BufferState>,
    flushing: AtomicBool,
    pub(crate) scheduled: AtomicBool,
    pub(crate) wake: Notify,
    event_tx: broadcast::Sender<BufferEvent>,
}

/// Bounded message log fed through an ingestion queue.
///
/// Producers call [`ingest`](Self::ingest), which only enqueues. A flush
/// (driven by [`spawn_flusher`](Self::spawn_flusher) or called directly)
/// moves the whole queue into the visible log in one step and evicts the
/// oldest entries beyond capacity. Cloning yields another handle to the
/// same buffer.
#[derive(Clone)]
pub struct MessageBuffer {
    pub(crate) inner: Arc<Shared>,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("capacity", &self.inner.config.capacity)
            .field("pending", &self.pending_count())
            .field("len", &self.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageBuffer {
    /// Create a buffer with the default capacity of [`MAX_MESSAGES`].
    pub fn new() -> Self {
        Self::build(BufferConfig::default())
    }

    pub fn with_config(config: BufferConfig) -> Result<Self, BufferError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BufferConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Shared {
                config,
                pending: Mutex::new(Vec::new()),
                state: RwLock::new(BufferState::default()),
                flushing: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
                wake: Notify::new(),
                event_tx,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: BufferEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    pub fn config(&self) -> &BufferConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Queue a message for the next flush. Never blocks on the visible log.
    pub fn ingest(&self, message: StreamMessage) {
        lock(&self.inner.pending).push(message);
        if !self.inner.scheduled.swap(true, Ordering::AcqRel) {
            self.inner.wake.notify_one();
        }
    }

    /// Queue several messages, keeping their order.
    pub fn ingest_all<I>(&self, messages: I)
    where
        I: IntoIterator<Item = StreamMessage>,
    {
        lock(&self.inner.pending).extend(messages);
        if !self.inner.scheduled.swap(true, Ordering::AcqRel) {
            self.inner.wake.notify_one();
        }
    }

    /// Number of messages waiting for a flush.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Run one flush cycle.
    ///
    /// Drains the entire pending queue as a single batch. While paused the
    /// batch is discarded rather than held for later.
    pub fn flush(&self) -> FlushOutcome {
        if self
            .inner
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::Busy;
        }

        // Lock order: state, then pending.
        let mut state = self.write();
        let batch = std::mem::take(&mut *lock(&self.inner.pending));
        let outcome = if batch.is_empty() {
            FlushOutcome::Idle
        } else if state.is_paused {
            let discarded = batch.len();
            debug!("Buffer paused, dropping batch of {} messages", discarded);
            self.publish(BufferEvent::Dropped { discarded });
            FlushOutcome::Dropped { discarded }
        } else {
            let appended = batch.len();
            state.messages.extend(batch);

            let evicted = state.messages.len().saturating_sub(self.capacity());
            if evicted > 0 {
                state.messages.drain(..evicted);
            }

            trace!(
                "Flushed {} messages ({} evicted, {} visible)",
                appended,
                evicted,
                state.messages.len()
            );
            self.publish(BufferEvent::Flushed {
                appended,
                evicted,
                len: state.messages.len(),
            });
            FlushOutcome::Merged { appended, evicted }
        };
        drop(state);

        self.inner.flushing.store(false, Ordering::Release);
        outcome
    }

    pub fn set_filter(&self, filter_direction: DirectionFilter) {
        let mut state = self.write();
        state.filter_direction = filter_direction;
        self.publish(BufferEvent::FilterChanged(filter_direction));
    }

    pub fn set_search(&self, term: impl Into<String>) {
        let term = term.into();
        let mut state = self.write();
        state.search_term = term.clone();
        self.publish(BufferEvent::SearchChanged(term));
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        let mut state = self.write();
        state.is_paused = !state.is_paused;
        let paused = state.is_paused;
        debug!("Buffer {}", if paused { "paused" } else { "resumed" });
        self.publish(BufferEvent::PauseToggled(paused));
        paused
    }

    /// Drop pending and visible messages. Pause, filter and search are kept.
    pub fn clear(&self) {
        let mut state = self.write();
        lock(&self.inner.pending).clear();
        state.messages.clear();
        self.publish(BufferEvent::Cleared);
    }

    /// Drop everything and restore every flag to its default.
    pub fn reset(&self) {
        let mut state = self.write();
        lock(&self.inner.pending).clear();
        *state = BufferState::default();
        self.publish(BufferEvent::Reset);
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.read();
        BufferSnapshot {
            messages: state.messages.iter().cloned().collect(),
            is_paused: state.is_paused,
            filter_direction: state.filter_direction,
            search_term: state.search_term.clone(),
        }
    }

    /// Visible messages, oldest first.
    pub fn messages(&self) -> Vec<StreamMessage> {
        self.read().messages.iter().cloned().collect()
    }

    /// The derived filtered view under the current filter and search term.
    pub fn filtered(&self) -> Vec<StreamMessage> {
        let state = self.read();
        let filter = ViewFilter::new(state.filter_direction, &state.search_term);
        filter
            .apply(state.messages.iter())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.read().is_paused
    }

    pub fn filter_direction(&self) -> DirectionFilter {
        self.read().filter_direction
    }

    pub fn search_term(&self) -> String {
        self.read().search_term.clone()
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.inner.event_tx.subscribe()
    }
}
