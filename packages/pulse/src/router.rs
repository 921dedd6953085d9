use std::sync::Arc;
use stream_buffer::{Direction, MessageBuffer, StreamMessage};
use tab_manager::{TabId, TabManager, TabProtocol};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Work handed to the routing task, processed in send order.
#[derive(Debug)]
enum RouteCommand {
    Message {
        connection_id: String,
        message: StreamMessage,
    },
    /// Replies with the tab's protocol once bound, `None` if the tab cannot stream
    Connected {
        tab: TabId,
        connection_id: String,
        respond_to: oneshot::Sender<Option<TabProtocol>>,
    },
    Disconnected {
        connection_id: String,
    },
    Sync {
        respond_to: oneshot::Sender<()>,
    },
}

/// Entry point for transport adapters.
///
/// Every emitted message lands in the shared [`MessageBuffer`] immediately,
/// and is then appended to the tab that owns its connection by a background
/// routing task. Messages for connections no tab claims stay in the buffer only.
///
/// Connection reports travel the same queue as messages, so tabs see them in
/// the order they were reported.
#[derive(Clone)]
pub struct StreamRouter {
    buffer: MessageBuffer,
    sender: mpsc::UnboundedSender<RouteCommand>,
}

/// Owns the routing task spawned by [`StreamRouter::spawn`].
pub struct RouterTask {
    cancel: CancellationToken,
    handle: JoinHandle<usize>,
}

impl RouterTask {
    /// Stop routing after draining everything already emitted.
    /// Returns the number of messages delivered to tabs over the task's life.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        match self.handle.await {
            Ok(routed) => routed,
            Err(e) => {
                warn!("Router task failed: {}", e);
                0
            }
        }
    }
}

impl StreamRouter {
    pub fn spawn(buffer: MessageBuffer, tabs: Arc<TabManager>) -> (Self, RouterTask) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_router(tabs, receiver, cancel.clone()));
        info!("Stream router started");
        (Self { buffer, sender }, RouterTask { cancel, handle })
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    /// Record one message observed on `connection_id`.
    ///
    /// Never blocks and never fails; returns the id assigned to the message.
    pub fn emit(
        &self,
        connection_id: &str,
        direction: Direction,
        protocol: &str,
        payload: impl Into<String>,
    ) -> String {
        let message = StreamMessage::new(direction, protocol, payload)
            .with_metadata("connectionId", connection_id);
        let id = message.id.clone();
        self.route(connection_id, message);
        id
    }

    /// Like [`emit`](Self::emit) for an already built message, keeping its
    /// id and timestamp.
    pub fn route(&self, connection_id: &str, message: StreamMessage) {
        self.buffer.ingest(message.clone());
        self.forward(RouteCommand::Message {
            connection_id: connection_id.to_string(),
            message,
        });
    }

    /// Bind `connection_id` to a streaming tab and note it in the stream.
    ///
    /// Applied after every report queued before it. Returns false if the tab
    /// is unknown, does not stream, or the router has stopped.
    pub async fn report_connected(&self, tab: TabId, connection_id: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        self.forward(RouteCommand::Connected {
            tab,
            connection_id: connection_id.to_string(),
            respond_to: tx,
        });
        let Ok(Some(protocol)) = rx.await else {
            return false;
        };

        info!("Connection {} bound to {}", connection_id, tab);
        self.emit(
            connection_id,
            Direction::System,
            protocol.label(),
            format!("Connected to {}", protocol.label()),
        );
        true
    }

    /// Note a closed connection. The owning tab is marked disconnected after
    /// every message emitted before this call has been routed to it.
    pub fn report_disconnected(&self, connection_id: &str, protocol: &str, reason: Option<&str>) {
        let payload = match reason {
            Some(reason) => format!("Disconnected: {}", reason),
            None => "Disconnected".to_string(),
        };
        self.emit(connection_id, Direction::System, protocol, payload);
        self.forward(RouteCommand::Disconnected {
            connection_id: connection_id.to_string(),
        });
    }

    /// Wait until everything emitted so far has been routed.
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(RouteCommand::Sync { respond_to: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    fn forward(&self, command: RouteCommand) {
        if self.sender.send(command).is_err() {
            debug!("Router task stopped; command dropped");
        }
    }
}

async fn run_router(
    tabs: Arc<TabManager>,
    mut receiver: mpsc::UnboundedReceiver<RouteCommand>,
    cancel: CancellationToken,
) -> usize {
    let mut routed = 0;
    loop {
        let command = tokio::select! {
            biased;
            command = receiver.recv() => command,
            _ = cancel.cancelled() => None,
        };
        match command {
            Some(command) => routed += apply(&tabs, command).await,
            None => break,
        }
    }

    receiver.close();
    while let Some(command) = receiver.recv().await {
        routed += apply(&tabs, command).await;
    }
    debug!("Stream router stopped after routing {} messages", routed);
    routed
}

async fn apply(tabs: &TabManager, command: RouteCommand) -> usize {
    match command {
        RouteCommand::Message {
            connection_id,
            message,
        } => {
            let Some(tab) = tabs.find_by_connection(&connection_id).await else {
                trace!("No tab for connection {}", connection_id);
                return 0;
            };
            usize::from(tabs.append_message(tab, message).await)
        }
        RouteCommand::Connected {
            tab,
            connection_id,
            respond_to,
        } => {
            let mut bound = None;
            if let Some(protocol) = tabs.get(tab).await.map(|t| t.protocol) {
                if tabs
                    .set_connection_state(tab, true, Some(connection_id))
                    .await
                {
                    bound = Some(protocol);
                }
            }
            let _ = respond_to.send(bound);
            0
        }
        RouteCommand::Disconnected { connection_id } => {
            if let Some(tab) = tabs.find_by_connection(&connection_id).await {
                tabs.set_connection_state(tab, false, None).await;
                info!("Connection {} on {} closed", connection_id, tab);
            }
            0
        }
        RouteCommand::Sync { respond_to } => {
            let _ = respond_to.send(());
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (StreamRouter, RouterTask, Arc<TabManager>) {
        let tabs = Arc::new(TabManager::new());
        let (router, task) = StreamRouter::spawn(MessageBuffer::new(), tabs.clone());
        (router, task, tabs)
    }

    #[tokio::test]
    async fn test_emit_reaches_buffer_and_tab() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::WebSocket).await;
        assert!(router.report_connected(tab, "ws-1").await);

        router.emit("ws-1", Direction::Inbound, "WebSocket", "hello");
        router.sync().await;
        router.buffer().flush();

        let payloads: Vec<_> = router
            .buffer()
            .messages()
            .into_iter()
            .map(|m| m.payload)
            .collect();
        assert_eq!(payloads, vec!["Connected to WebSocket", "hello"]);

        let tab = tabs.get(tab).await.unwrap();
        assert!(tab.is_stream_connected());
        assert_eq!(tab.messages.len(), 2);
        assert_eq!(tab.messages[1].payload, "hello");
        assert_eq!(
            tab.messages[1].metadata.get("connectionId"),
            Some(&serde_json::Value::from("ws-1"))
        );

        assert_eq!(task.shutdown().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_connection_stays_in_buffer() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::Sse).await;

        router.emit("orphan", Direction::Inbound, "SSE Stream", "data");
        router.sync().await;
        router.buffer().flush();

        assert_eq!(router.buffer().len(), 1);
        assert!(tabs.get(tab).await.unwrap().messages.is_empty());
        assert_eq!(task.shutdown().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_after_pending_messages() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::Mqtt).await;
        router.report_connected(tab, "mqtt-7").await;

        router.emit("mqtt-7", Direction::Inbound, "MQTT", "last words");
        router.report_disconnected("mqtt-7", "MQTT", Some("broker went away"));
        router.sync().await;

        let tab = tabs.get(tab).await.unwrap();
        assert!(!tab.is_stream_connected());
        assert!(tab.connection_id().is_none());
        let payloads: Vec<_> = tab.messages.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(
            payloads,
            vec![
                "Connected to MQTT",
                "last words",
                "Disconnected: broker went away"
            ]
        );
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect_wins() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::WebSocket).await;

        assert!(router.report_connected(tab, "ws-1").await);
        router.report_disconnected("ws-1", "WebSocket", None);
        assert!(router.report_connected(tab, "ws-1").await);
        router.sync().await;

        let tab = tabs.get(tab).await.unwrap();
        assert!(tab.is_stream_connected());
        assert_eq!(tab.connection_id(), Some("ws-1"));
        let payloads: Vec<_> = tab.messages.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(
            payloads,
            vec!["Connected to WebSocket", "Disconnected", "Connected to WebSocket"]
        );
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_report_connected_rejects_non_streaming() {
        let (router, task, tabs) = setup();
        let http = tabs.create(TabProtocol::Http).await;
        assert!(!router.report_connected(http, "x").await);
        assert!(!router.report_connected(TabId::new(), "x").await);
        assert_eq!(router.buffer().pending_count(), 0);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_messages() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::Kafka).await;
        router.report_connected(tab, "k-1").await;
        for i in 0..50 {
            router.emit("k-1", Direction::Inbound, "Kafka", i.to_string());
        }

        assert_eq!(task.shutdown().await, 51);
        assert_eq!(tabs.get(tab).await.unwrap().messages.len(), 51);
    }

    #[tokio::test]
    async fn test_closed_tab_stops_receiving() {
        let (router, task, tabs) = setup();
        let tab = tabs.create(TabProtocol::WebSocket).await;
        router.report_connected(tab, "ws-2").await;
        router.sync().await;

        let closed = tabs.close(tab).await.unwrap();
        assert_eq!(closed.connection_id(), Some("ws-2"));

        router.emit("ws-2", Direction::Inbound, "WebSocket", "late");
        router.sync().await;
        router.buffer().flush();
        assert_eq!(router.buffer().len(), 2);
        task.shutdown().await;
    }
}
