use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BufferError;
use crate::message::{Direction, StreamMessage};

/// Direction constraint of the derived view: everything, or one direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DirectionFilter {
    #[default]
    All,
    Only(Direction),
}

impl DirectionFilter {
    pub fn matches(&self, direction: Direction) -> bool {
        match self {
            DirectionFilter::All => true,
            DirectionFilter::Only(wanted) => *wanted == direction,
        }
    }
}

impl From<Direction> for DirectionFilter {
    fn from(direction: Direction) -> Self {
        DirectionFilter::Only(direction)
    }
}

impl fmt::Display for DirectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectionFilter::All => f.write_str("all"),
            DirectionFilter::Only(direction) => direction.fmt(f),
        }
    }
}

impl FromStr for DirectionFilter {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(DirectionFilter::All)
        } else {
            s.parse().map(DirectionFilter::Only)
        }
    }
}

impl From<DirectionFilter> for String {
    fn from(filter: DirectionFilter) -> Self {
        filter.to_string()
    }
}

impl TryFrom<String> for DirectionFilter {
    type Error = BufferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The view configuration: direction filter plus case-insensitive search.
///
/// A message passes when its direction matches AND the search term is empty
/// or is a substring of the payload or the protocol label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewFilter {
    direction: DirectionFilter,
    search_lower: String,
}

impl ViewFilter {
    pub fn new(direction: DirectionFilter, search: &str) -> Self {
        Self {
            direction,
            search_lower: search.to_lowercase(),
        }
    }

    pub fn matches(&self, message: &StreamMessage) -> bool {
        self.direction.matches(message.direction)
            && (self.search_lower.is_empty()
                || message.payload.to_lowercase().contains(&self.search_lower)
                || message.protocol.to_lowercase().contains(&self.search_lower))
    }

    /// Project the matching messages, preserving order.
    pub fn apply<'a, I>(&self, messages: I) -> Vec<&'a StreamMessage>
    where
        I: IntoIterator<Item = &'a StreamMessage>,
    {
        messages.into_iter().filter(|m| self.matches(m)).collect()
    }
}

/// Read-only queries over a slice of messages.
pub struct MessageQuery<'a> {
    messages: &'a [StreamMessage],
}

impl<'a> MessageQuery<'a> {
    pub fn new(messages: &'a [StreamMessage]) -> Self {
        Self { messages }
    }

    pub fn by_direction(&self, direction: Direction) -> Vec<&'a StreamMessage> {
        self.messages
            .iter()
            .filter(|m| m.direction == direction)
            .collect()
    }

    pub fn contains_text(&self, search: &str) -> Vec<&'a StreamMessage> {
        ViewFilter::new(DirectionFilter::All, search).apply(self.messages)
    }

    pub fn errors(&self) -> Vec<&'a StreamMessage> {
        self.by_direction(Direction::Error)
    }

    pub fn filtered(&self, filter: &ViewFilter) -> Vec<&'a StreamMessage> {
        filter.apply(self.messages)
    }

    /// Most recent message, if any.
    pub fn latest(&self) -> Option<&'a StreamMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<StreamMessage> {
        vec![
            StreamMessage::inbound("ws", "ping"),
            StreamMessage::error("ws", "boom"),
        ]
    }

    #[test]
    fn test_filter_by_error_direction() {
        let messages = sample();
        let filter = ViewFilter::new(DirectionFilter::Only(Direction::Error), "");
        let view = filter.apply(&messages);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].payload, "boom");
    }

    #[test]
    fn test_search_with_all_filter() {
        let messages = sample();
        let view = ViewFilter::new(DirectionFilter::All, "ping").apply(&messages);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].payload, "ping");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let messages = sample();
        let view = ViewFilter::new(DirectionFilter::All, "PING").apply(&messages);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].direction, Direction::Inbound);
    }

    #[test]
    fn test_search_matches_protocol_label() {
        let messages = vec![
            StreamMessage::inbound("WebSocket", "a"),
            StreamMessage::inbound("Kafka", "b"),
        ];
        let view = ViewFilter::new(DirectionFilter::All, "kafka").apply(&messages);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].payload, "b");
    }

    #[test]
    fn test_direction_and_search_combine() {
        let messages = vec![
            StreamMessage::inbound("ws", "ping"),
            StreamMessage::outbound("ws", "ping"),
        ];
        let filter = ViewFilter::new(DirectionFilter::Only(Direction::Outbound), "ping");
        let view = filter.apply(&messages);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].direction, Direction::Outbound);
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let messages = sample();
        assert_eq!(ViewFilter::default().apply(&messages).len(), 2);
    }

    #[test]
    fn test_direction_filter_parse_and_serde() {
        assert_eq!("all".parse::<DirectionFilter>().unwrap(), DirectionFilter::All);
        assert_eq!(
            "outbound".parse::<DirectionFilter>().unwrap(),
            DirectionFilter::Only(Direction::Outbound)
        );
        assert!("nope".parse::<DirectionFilter>().is_err());

        let json = serde_json::to_string(&DirectionFilter::Only(Direction::System)).unwrap();
        assert_eq!(json, "\"system\"");
        let back: DirectionFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(back, DirectionFilter::All);
    }

    #[test]
    fn test_message_query() {
        let messages = vec![
            StreamMessage::inbound("ws", "hello"),
            StreamMessage::error("ws", "timeout"),
            StreamMessage::system("ws", "Connected"),
            StreamMessage::error("ws", "reset"),
        ];
        let query = MessageQuery::new(&messages);

        assert_eq!(query.errors().len(), 2);
        assert_eq!(query.by_direction(Direction::System).len(), 1);
        assert_eq!(query.contains_text("CONNECT").len(), 1);
        assert_eq!(query.latest().map(|m| m.payload.as_str()), Some("reset"));
    }
}
