use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use stream_buffer::StreamMessage;
use uuid::Uuid;

use crate::protocol::TabProtocol;
use crate::request::{RequestState, ResponseData};

/// Unique identifier for a tab
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Connection sub-state reported by the transport adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    /// Identifier the adapter uses to tear the connection down
    pub connection_id: Option<String>,
}

/// One open tab.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub name: String,
    pub protocol: TabProtocol,
    pub is_dirty: bool,
    pub last_active_at: DateTime<Utc>,
    pub request: RequestState,
    /// Last response, HTTP tabs only
    pub response: Option<ResponseData>,
    /// Present only on streaming tabs
    pub connection: Option<ConnectionState>,
    /// Session-scoped messages, streaming tabs only
    pub messages: Vec<StreamMessage>,
}

impl Tab {
    pub(crate) fn new(protocol: TabProtocol, name: String) -> Self {
        Self {
            id: TabId::new(),
            name,
            protocol,
            is_dirty: false,
            last_active_at: Utc::now(),
            request: RequestState::for_protocol(protocol),
            response: None,
            connection: protocol.is_streaming().then(ConnectionState::default),
            messages: Vec::new(),
        }
    }

    pub fn is_stream_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.connected)
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .and_then(|c| c.connection_id.as_deref())
    }

    pub(crate) fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

/// Partial update applied by [`TabManager::update`](crate::TabManager::update).
///
/// Unset fields are left alone. Any update marks the tab dirty.
#[derive(Clone, Debug, Default)]
pub struct TabPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub request: Option<RequestState>,
    pub response: Option<ResponseData>,
}

impl TabPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn request(mut self, request: RequestState) -> Self {
        self.request = Some(request);
        self
    }

    pub fn response(mut self, response: ResponseData) -> Self {
        self.response = Some(response);
        self
    }
}
