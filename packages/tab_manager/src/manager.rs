use stream_buffer::StreamMessage;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::error::TabError;
use crate::protocol::TabProtocol;
use crate::tab::{ConnectionState, Tab, TabId, TabPatch};

/// Per-tab message history cap used when nothing else is configured.
pub const DEFAULT_TAB_MESSAGE_LIMIT: usize = 1000;

/// Registry tunables
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabManagerConfig {
    /// Oldest tab messages are evicted beyond this count
    pub max_messages: usize,
    /// Broadcast channel capacity for [`TabEvent`]s
    pub event_capacity: usize,
}

impl Default for TabManagerConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_TAB_MESSAGE_LIMIT,
            event_capacity: 256,
        }
    }
}

impl TabManagerConfig {
    pub fn validate(&self) -> Result<(), TabError> {
        if self.max_messages == 0 {
            return Err(TabError::ZeroMessageLimit);
        }
        Ok(())
    }
}

/// Events emitted after each committed registry mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TabEvent {
    Created { id: TabId, protocol: TabProtocol },
    Activated { id: TabId },
    /// `active` is the active tab after the close
    Closed { id: TabId, active: Option<TabId> },
    Updated { id: TabId },
    Renamed { id: TabId, name: String },
    ConnectionChanged {
        id: TabId,
        connected: bool,
        connection_id: Option<String>,
    },
    MessageAppended { id: TabId },
    MessagesCleared { id: TabId },
    Duplicated { source: TabId, id: TabId },
    Reset,
}

/// Consistent copy of the registry.
#[derive(Clone, Debug, Default)]
pub struct TabsSnapshot {
    pub tabs: Vec<Tab>,
    pub active_tab_id: Option<TabId>,
}

impl TabsSnapshot {
    pub fn active_tab(&self) -> Option<&Tab> {
        let active = self.active_tab_id?;
        self.tabs.iter().find(|t| t.id == active)
    }
}

#[derive(Default)]
struct TabsState {
    tabs: Vec<Tab>,
    active_tab_id: Option<TabId>,
}

impl TabsState {
    fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    fn get_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    fn next_name(&self, protocol: TabProtocol) -> String {
        let existing = self.tabs.iter().filter(|t| t.protocol == protocol).count();
        if existing > 0 {
            format!("{} {}", protocol.label(), existing + 1)
        } else {
            protocol.label().to_string()
        }
    }
}

/// Registry of open tabs with exactly one active tab (or none when empty).
///
/// Every operation takes the single writer lock, so reads of the whole tab
/// set (naming counts, close adjacency) are never interleaved with another
/// mutation. Operations on unknown ids are no-ops and report `false`/`None`.
pub struct TabManager {
    state: RwLock<TabsState>,
    config: TabManagerConfig,
    event_tx: broadcast::Sender<TabEvent>,
}

impl Default for TabManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TabManager {
    pub fn new() -> Self {
        Self::build(TabManagerConfig::default())
    }

    pub fn with_config(config: TabManagerConfig) -> Result<Self, TabError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TabManagerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            state: RwLock::new(TabsState::default()),
            config,
            event_tx,
        }
    }

    fn publish(&self, event: TabEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Open a new tab and make it active.
    pub async fn create(&self, protocol: TabProtocol) -> TabId {
        let mut state = self.state.write().await;
        let tab = Tab::new(protocol, state.next_name(protocol));
        let id = tab.id;

        info!("Creating tab '{}' ({}) as {}", tab.name, protocol, id);

        state.tabs.push(tab);
        state.active_tab_id = Some(id);
        self.publish(TabEvent::Created { id, protocol });
        id
    }

    /// Focus a tab. Returns false if it does not exist.
    pub async fn activate(&self, id: TabId) -> bool {
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            debug!("Ignoring activate for unknown tab {}", id);
            return false;
        };
        tab.touch();
        state.active_tab_id = Some(id);
        self.publish(TabEvent::Activated { id });
        true
    }

    /// Remove a tab and hand it back so the caller can release its connection.
    ///
    /// Closing the active tab activates the tab before it, or the new first
    /// tab when the closed one was first.
    pub async fn close(&self, id: TabId) -> Option<Tab> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        let removed = state.tabs.remove(index);

        if state.active_tab_id == Some(id) {
            state.active_tab_id = state
                .tabs
                .get(index.saturating_sub(1))
                .map(|t| t.id);
        }

        info!(
            "Closed tab '{}' ({}), active now {:?}",
            removed.name, id, state.active_tab_id
        );
        self.publish(TabEvent::Closed {
            id,
            active: state.active_tab_id,
        });
        Some(removed)
    }

    /// Merge `patch` into a tab, marking it dirty and refreshing its activity time.
    ///
    /// Fields that do not fit the tab's protocol (a request of another
    /// protocol, a response on a non-HTTP tab) are skipped.
    pub async fn update(&self, id: TabId, patch: TabPatch) -> bool {
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            return false;
        };

        if let Some(name) = patch.name {
            tab.name = name;
        }
        if let Some(request) = patch.request {
            if request.protocol() == tab.protocol {
                tab.request = request;
            } else {
                warn!(
                    "Ignoring {} request state for {} tab {}",
                    request.protocol(),
                    tab.protocol,
                    id
                );
            }
        }
        if let Some(url) = patch.url {
            tab.request.set_url(url);
        }
        if let Some(response) = patch.response {
            if tab.protocol == TabProtocol::Http {
                tab.response = Some(response);
            } else {
                warn!("Ignoring response for {} tab {}", tab.protocol, id);
            }
        }

        tab.is_dirty = true;
        tab.touch();
        self.publish(TabEvent::Updated { id });
        true
    }

    /// Change a tab's name without marking it dirty.
    pub async fn rename(&self, id: TabId, name: impl Into<String>) -> bool {
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            return false;
        };
        tab.name = name.into();
        let name = tab.name.clone();
        self.publish(TabEvent::Renamed { id, name });
        true
    }

    /// Record a connect or disconnect reported by a transport adapter.
    pub async fn set_connection_state(
        &self,
        id: TabId,
        connected: bool,
        connection_id: Option<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            return false;
        };
        let Some(connection) = tab.connection.as_mut() else {
            warn!("Tab {} ({}) has no connection to update", id, tab.protocol);
            return false;
        };

        *connection = ConnectionState {
            connected,
            connection_id: connection_id.clone(),
        };
        debug!(
            "Tab {} connection {} ({:?})",
            id,
            if connected { "up" } else { "down" },
            connection_id
        );
        self.publish(TabEvent::ConnectionChanged {
            id,
            connected,
            connection_id,
        });
        true
    }

    /// Append to a streaming tab's message list, evicting the oldest beyond the cap.
    pub async fn append_message(&self, id: TabId, message: StreamMessage) -> bool {
        let max_messages = self.config.max_messages;
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            return false;
        };
        if !tab.protocol.is_streaming() {
            return false;
        }

        tab.messages.push(message);
        let excess = tab.messages.len().saturating_sub(max_messages);
        if excess > 0 {
            tab.messages.drain(..excess);
        }
        self.publish(TabEvent::MessageAppended { id });
        true
    }

    pub async fn clear_messages(&self, id: TabId) -> bool {
        let mut state = self.state.write().await;
        let Some(tab) = state.get_mut(id) else {
            return false;
        };
        if !tab.protocol.is_streaming() {
            return false;
        }
        tab.messages.clear();
        self.publish(TabEvent::MessagesCleared { id });
        true
    }

    /// Copy a tab's content into a new, active tab named "<original> (Copy)".
    ///
    /// The copy starts clean, disconnected and without messages.
    pub async fn duplicate(&self, id: TabId) -> Option<TabId> {
        let mut state = self.state.write().await;
        let source = state.tabs.iter().find(|t| t.id == id)?;

        let mut copy = source.clone();
        copy.id = TabId::new();
        copy.name = format!("{} (Copy)", source.name);
        copy.is_dirty = false;
        copy.touch();
        copy.connection = copy.protocol.is_streaming().then(ConnectionState::default);
        copy.messages = Vec::new();

        let new_id = copy.id;
        debug!("Duplicated tab {} as {} '{}'", id, new_id, copy.name);

        state.tabs.push(copy);
        state.active_tab_id = Some(new_id);
        self.publish(TabEvent::Duplicated { source: id, id: new_id });
        Some(new_id)
    }

    /// Close every tab and clear activation.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = TabsState::default();
        info!("Tab registry reset");
        self.publish(TabEvent::Reset);
    }

    pub async fn get(&self, id: TabId) -> Option<Tab> {
        self.state
            .read()
            .await
            .tabs
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub async fn active_tab_id(&self) -> Option<TabId> {
        self.state.read().await.active_tab_id
    }

    pub async fn active_tab(&self) -> Option<Tab> {
        let state = self.state.read().await;
        let active = state.active_tab_id?;
        state.tabs.iter().find(|t| t.id == active).cloned()
    }

    /// All tabs in display order.
    pub async fn list(&self) -> Vec<Tab> {
        self.state.read().await.tabs.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tabs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tabs.is_empty()
    }

    /// Find the streaming tab backed by `connection_id`.
    pub async fn find_by_connection(&self, connection_id: &str) -> Option<TabId> {
        self.state
            .read()
            .await
            .tabs
            .iter()
            .find(|t| t.connection_id() == Some(connection_id))
            .map(|t| t.id)
    }

    pub async fn snapshot(&self) -> TabsSnapshot {
        let state = self.state.read().await;
        TabsSnapshot {
            tabs: state.tabs.clone(),
            active_tab_id: state.active_tab_id,
        }
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.event_tx.subscribe()
    }
}
