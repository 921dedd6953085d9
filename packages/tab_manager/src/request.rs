//! Per-protocol request state held by a tab.
//!
//! HTTP tabs keep a full request descriptor. Every other protocol keeps a
//! [`ConnectionTarget`]: a URL plus a configuration struct specific to that
//! protocol, so adapters never have to probe a loosely-shaped map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TabError;
use crate::protocol::TabProtocol;

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TabError::UnknownMethod(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyType {
    #[default]
    None,
    Json,
    Xml,
    Text,
    FormData,
    #[serde(rename = "x-www-form-urlencoded")]
    UrlEncoded,
}

/// A toggleable key/value row (query params, headers).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub id: String,
    pub key: String,
    pub value: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            value: value.into(),
            enabled: true,
            description: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RequestAuth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { key: String, value: String },
    #[serde(rename = "oauth2")]
    OAuth2 { token: String },
}

/// Request descriptor for plain request/response tabs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<KeyValue>,
    pub headers: Vec<KeyValue>,
    pub body: String,
    pub body_type: BodyType,
    pub auth: Option<RequestAuth>,
}

/// Last response received by an HTTP tab.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub status_code: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Elapsed time as displayed (e.g. "120 ms")
    pub time: String,
    /// Body size as displayed (e.g. "1.2 KB")
    pub size: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketConfig {
    pub subprotocol: Option<String>,
    pub auto_reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub enable_ping_pong: bool,
    pub ping_interval_ms: u64,
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            subprotocol: None,
            auto_reconnect: false,
            reconnect_interval_ms: 3000,
            enable_ping_pong: false,
            ping_interval_ms: 30_000,
            custom_headers: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseConfig {
    pub with_credentials: bool,
    pub retry_timeout_ms: u64,
    pub last_event_id: Option<String>,
    pub auto_reconnect: bool,
    pub custom_headers: BTreeMap<String, String>,
    /// Only surface these event types; empty means all
    pub event_type_filter: Vec<String>,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            with_credentials: false,
            retry_timeout_ms: 3000,
            last_event_id: None,
            auto_reconnect: true,
            custom_headers: BTreeMap::new(),
            event_type_filter: Vec::new(),
        }
    }
}

/// Shared by streaming and unary gRPC tabs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcConfig {
    pub service: String,
    pub method: String,
    pub use_tls: bool,
    /// Call deadline; `None` means no deadline
    pub deadline_ms: Option<u64>,
    pub compression: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KafkaAuthMechanism {
    #[default]
    None,
    Plain,
    ScramSha256,
    ScramSha512,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    pub bootstrap_servers: Vec<String>,
    pub client_id: String,
    pub auth_mechanism: KafkaAuthMechanism,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub use_tls: bool,
    pub tls_skip_verify: bool,
    pub connection_timeout_secs: u64,
    pub topic: String,
    pub consumer_group: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: Vec::new(),
            client_id: "pulse".to_string(),
            auth_mechanism: KafkaAuthMechanism::None,
            sasl_username: None,
            sasl_password: None,
            use_tls: false,
            tls_skip_verify: false,
            connection_timeout_secs: 10,
            topic: String::new(),
            consumer_group: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
    /// Topic filters to subscribe to
    pub topics: Vec<String>,
    /// QoS level 0, 1 or 2
    pub qos: u8,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: "pulse".to_string(),
            username: None,
            password: None,
            clean_session: true,
            keep_alive_secs: 60,
            topics: Vec::new(),
            qos: 0,
        }
    }
}

/// Protocol-specific settings; the variant always agrees with the tab's protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProtocolConfig {
    WebSocket(WebSocketConfig),
    Sse(SseConfig),
    #[serde(rename = "grpc-stream")]
    GrpcStream(GrpcConfig),
    Kafka(KafkaConfig),
    Mqtt(MqttConfig),
    Grpc(GrpcConfig),
}

impl ProtocolConfig {
    /// Default settings for a protocol, `None` for HTTP.
    pub fn for_protocol(protocol: TabProtocol) -> Option<Self> {
        Some(match protocol {
            TabProtocol::Http => return None,
            TabProtocol::WebSocket => ProtocolConfig::WebSocket(WebSocketConfig::default()),
            TabProtocol::Sse => ProtocolConfig::Sse(SseConfig::default()),
            TabProtocol::GrpcStream => ProtocolConfig::GrpcStream(GrpcConfig::default()),
            TabProtocol::Kafka => ProtocolConfig::Kafka(KafkaConfig::default()),
            TabProtocol::Mqtt => ProtocolConfig::Mqtt(MqttConfig::default()),
            TabProtocol::Grpc => ProtocolConfig::Grpc(GrpcConfig::default()),
        })
    }

    pub fn protocol(&self) -> TabProtocol {
        match self {
            ProtocolConfig::WebSocket(_) => TabProtocol::WebSocket,
            ProtocolConfig::Sse(_) => TabProtocol::Sse,
            ProtocolConfig::GrpcStream(_) => TabProtocol::GrpcStream,
            ProtocolConfig::Kafka(_) => TabProtocol::Kafka,
            ProtocolConfig::Mqtt(_) => TabProtocol::Mqtt,
            ProtocolConfig::Grpc(_) => TabProtocol::Grpc,
        }
    }
}

/// Where a non-HTTP tab connects to, and how.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTarget {
    pub url: String,
    pub config: ProtocolConfig,
}

/// Request-side state of a tab.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestState {
    Http(HttpRequest),
    Target(ConnectionTarget),
}

impl RequestState {
    /// Empty request state appropriate for a freshly created tab.
    pub fn for_protocol(protocol: TabProtocol) -> Self {
        match ProtocolConfig::for_protocol(protocol) {
            None => RequestState::Http(HttpRequest::default()),
            Some(config) => RequestState::Target(ConnectionTarget {
                url: String::new(),
                config,
            }),
        }
    }

    pub fn protocol(&self) -> TabProtocol {
        match self {
            RequestState::Http(_) => TabProtocol::Http,
            RequestState::Target(target) => target.config.protocol(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RequestState::Http(request) => &request.url,
            RequestState::Target(target) => &target.url,
        }
    }

    pub fn set_url(&mut self, url: String) {
        match self {
            RequestState::Http(request) => request.url = url,
            RequestState::Target(target) => target.url = url,
        }
    }

    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            RequestState::Http(request) => Some(request),
            RequestState::Target(_) => None,
        }
    }

    pub fn as_target(&self) -> Option<&ConnectionTarget> {
        match self {
            RequestState::Http(_) => None,
            RequestState::Target(target) => Some(target),
        }
    }
}
