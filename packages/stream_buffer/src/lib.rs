//! Stream Buffer - bounded, batch-flushed message log
//!
//! Network transports can produce messages far faster than anything reading
//! them can keep up with. This crate decouples the two: producers enqueue
//! with [`MessageBuffer::ingest`], and a single flush cycle moves the queued
//! batch into a visible log capped at a fixed capacity, evicting the oldest
//! entries first. Readers get a filtered, searchable view of that log.
//!
//! It has no knowledge of tabs, sessions or specific protocols.
//!
//! # Example
//!
//! ```no_run
//! use stream_buffer::{Direction, DirectionFilter, MessageBuffer, StreamMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let buffer = MessageBuffer::new();
//!     let flusher = buffer.spawn_flusher();
//!
//!     // Called from transport tasks
//!     buffer.ingest(StreamMessage::inbound("WebSocket", "{\"type\":\"ping\"}"));
//!     buffer.ingest(StreamMessage::error("WebSocket", "connection reset"));
//!
//!     // Later, from the UI side
//!     buffer.set_filter(DirectionFilter::Only(Direction::Error));
//!     for message in buffer.filtered() {
//!         println!("{} {}", message.timestamp, message.payload);
//!     }
//!
//!     flusher.shutdown().await;
//! }
//! ```

mod buffer;
mod error;
mod flusher;
pub mod message;
pub mod query;

pub use buffer::{
    BufferConfig, BufferEvent, BufferSnapshot, DEFAULT_FLUSH_DELAY, DEFAULT_RESCHEDULE_DELAY,
    FlushOutcome, MAX_MESSAGES, MessageBuffer,
};
pub use error::BufferError;
pub use flusher::FlushTask;
pub use message::{Direction, MessageIdGenerator, StreamMessage};
pub use query::{DirectionFilter, MessageQuery, ViewFilter};
