//! Tab Manager - registry of open protocol sessions
//!
//! Each tab is one working session against one protocol: an HTTP request, a
//! WebSocket, an SSE stream and so on. The registry keeps tabs in display
//! order, tracks which one is active, and holds the per-tab request state,
//! last response, connection state and session messages.
//!
//! It never opens connections itself. Transport adapters report connection
//! changes and messages through [`TabManager::set_connection_state`] and
//! [`TabManager::append_message`], and release connections for the tabs
//! returned by [`TabManager::close`].
//!
//! # Example
//!
//! ```no_run
//! use tab_manager::{TabManager, TabPatch, TabProtocol};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = TabManager::new();
//!
//!     let ws = manager.create(TabProtocol::WebSocket).await;
//!     manager
//!         .update(ws, TabPatch::new().url("wss://echo.example.com"))
//!         .await;
//!
//!     let mut rx = manager.subscribe();
//!     let copy = manager.duplicate(ws).await.unwrap();
//!
//!     if let Ok(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     if let Some(tab) = manager.close(copy).await {
//!         println!("closed {}", tab.name);
//!     }
//! }
//! ```

mod error;
mod manager;
mod protocol;
pub mod request;
mod tab;

pub use error::TabError;
pub use manager::{DEFAULT_TAB_MESSAGE_LIMIT, TabEvent, TabManager, TabManagerConfig, TabsSnapshot};
pub use protocol::TabProtocol;
pub use request::{
    BodyType, ConnectionTarget, HttpMethod, HttpRequest, KeyValue, ProtocolConfig, RequestAuth,
    RequestState, ResponseData,
};
pub use tab::{ConnectionState, Tab, TabId, TabPatch};
