use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TabError;

/// The protocol a tab speaks. Fixed at creation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabProtocol {
    /// Plain request/response
    Http,
    WebSocket,
    /// Server-Sent Events
    Sse,
    #[serde(rename = "grpc-stream")]
    GrpcStream,
    Kafka,
    Mqtt,
    /// Unary gRPC call
    Grpc,
}

impl TabProtocol {
    pub const ALL: [TabProtocol; 7] = [
        TabProtocol::Http,
        TabProtocol::WebSocket,
        TabProtocol::Sse,
        TabProtocol::GrpcStream,
        TabProtocol::Kafka,
        TabProtocol::Mqtt,
        TabProtocol::Grpc,
    ];

    /// Wire name, as used in config files and CLI flags.
    pub fn as_str(&self) -> &'static str {
        match self {
            TabProtocol::Http => "http",
            TabProtocol::WebSocket => "websocket",
            TabProtocol::Sse => "sse",
            TabProtocol::GrpcStream => "grpc-stream",
            TabProtocol::Kafka => "kafka",
            TabProtocol::Mqtt => "mqtt",
            TabProtocol::Grpc => "grpc",
        }
    }

    /// Human label, used for tab names and as the message protocol label.
    pub fn label(&self) -> &'static str {
        match self {
            TabProtocol::Http => "HTTP Request",
            TabProtocol::WebSocket => "WebSocket",
            TabProtocol::Sse => "SSE Stream",
            TabProtocol::GrpcStream => "gRPC Stream",
            TabProtocol::Kafka => "Kafka",
            TabProtocol::Mqtt => "MQTT",
            TabProtocol::Grpc => "gRPC",
        }
    }

    /// Streaming protocols carry a connection and a message list.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            TabProtocol::WebSocket
                | TabProtocol::Sse
                | TabProtocol::GrpcStream
                | TabProtocol::Kafka
                | TabProtocol::Mqtt
        )
    }
}

impl fmt::Display for TabProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabProtocol {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TabProtocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| TabError::UnknownProtocol(s.to_string()))
    }
}
