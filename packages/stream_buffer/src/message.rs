use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BufferError;

/// Which way a message travelled, or whether the transport produced it itself.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the remote peer
    Inbound,
    /// Sent to the remote peer
    Outbound,
    /// Transport failure reported as a message
    Error,
    /// Lifecycle notice (connected, disconnected, reconnecting)
    System,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Inbound,
        Direction::Outbound,
        Direction::Error,
        Direction::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Error => "error",
            Direction::System => "system",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BufferError::UnknownDirection(s.to_string()))
    }
}

/// A single frame, event or notice produced by a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    pub id: String,
    pub direction: Direction,
    /// Label of the originating protocol (e.g. "WebSocket")
    pub protocol: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    /// Transport-specific extras (Kafka partition/offset, SSE event type, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StreamMessage {
    /// Build a message stamped with the current time and a process-unique id.
    pub fn new(
        direction: Direction,
        protocol: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageIdGenerator::global().next_id(),
            direction,
            protocol: protocol.into(),
            payload: payload.into(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn inbound(protocol: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Direction::Inbound, protocol, payload)
    }

    pub fn outbound(protocol: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Direction::Outbound, protocol, payload)
    }

    pub fn error(protocol: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Direction::Error, protocol, payload)
    }

    pub fn system(protocol: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Direction::System, protocol, payload)
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generates `msg-<unix-nanos>-<counter>` ids.
///
/// The counter alone guarantees uniqueness within a generator; the timestamp
/// keeps ids from different processes apart in exported logs.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    counter: AtomicU64,
}

static GLOBAL_IDS: MessageIdGenerator = MessageIdGenerator::new();

impl MessageIdGenerator {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Shared generator used by [`StreamMessage::new`].
    pub fn global() -> &'static MessageIdGenerator {
        &GLOBAL_IDS
    }

    pub fn next_id(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("msg-{}-{}", nanos, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_direction_parse_is_case_insensitive() {
        assert_eq!("inbound".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!("ERROR".parse::<Direction>().unwrap(), Direction::Error);
        assert_eq!(" System ".parse::<Direction>().unwrap(), Direction::System);
        assert_eq!(
            "sideways".parse::<Direction>(),
            Err(BufferError::UnknownDirection("sideways".to_string()))
        );
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Outbound).unwrap();
        assert_eq!(json, "\"outbound\"");
    }

    #[test]
    fn test_message_json_shape() {
        let msg = StreamMessage::inbound("WebSocket", "hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["direction"], "inbound");
        assert_eq!(value["protocol"], "WebSocket");
        assert_eq!(value["payload"], "hello");
        assert!(value.get("metadata").is_none());

        let with_meta = msg.with_metadata("partition", 3);
        let value = serde_json::to_value(&with_meta).unwrap();
        assert_eq!(value["metadata"]["partition"], 3);
    }

    #[test]
    fn test_message_deserializes_without_metadata() {
        let raw = r#"{"id":"m1","direction":"error","protocol":"Kafka","payload":"broker down","timestamp":"2024-06-15T10:00:00Z"}"#;
        let msg: StreamMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.direction, Direction::Error);
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_id_format() {
        let ids = MessageIdGenerator::new();
        let id = ids.next_id();
        assert!(id.starts_with("msg-"));
        assert!(id.ends_with("-1"));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(MessageIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
