use anyhow::{Context, Result};
use std::sync::Arc;
use stream_buffer::{FlushOutcome, FlushTask, MessageBuffer};
use tab_manager::{Tab, TabId, TabManager, TabProtocol};
use tracing::info;

use crate::config::FileConfig;
use crate::router::{RouterTask, StreamRouter};

/// What was left to do when the runtime stopped.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Messages delivered to tabs by the router
    pub routed: usize,
    /// Result of draining the buffer queue one last time
    pub final_flush: FlushOutcome,
}

/// The running session runtime: one tab registry, one shared stream buffer
/// with its flush scheduler, and the router feeding both.
pub struct Pulse {
    tabs: Arc<TabManager>,
    buffer: MessageBuffer,
    router: StreamRouter,
    flusher: FlushTask,
    router_task: RouterTask,
}

impl Pulse {
    /// Build every component from `config` and start the background tasks.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &FileConfig) -> Result<Self> {
        let buffer = MessageBuffer::with_config(config.buffer.to_runtime())
            .context("Invalid [buffer] configuration")?;
        let tabs = Arc::new(
            TabManager::with_config(config.tabs.to_runtime())
                .context("Invalid [tabs] configuration")?,
        );

        let flusher = buffer.spawn_flusher();
        let (router, router_task) = StreamRouter::spawn(buffer.clone(), tabs.clone());

        info!(
            "Pulse runtime started (buffer capacity {}, tab history {})",
            buffer.capacity(),
            config.tabs.max_messages
        );

        Ok(Self {
            tabs,
            buffer,
            router,
            flusher,
            router_task,
        })
    }

    pub fn tabs(&self) -> &Arc<TabManager> {
        &self.tabs
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    /// Handle for transport adapters. Cheap to clone.
    pub fn router(&self) -> &StreamRouter {
        &self.router
    }

    pub async fn open_tab(&self, protocol: TabProtocol) -> TabId {
        self.tabs.create(protocol).await
    }

    /// Close a tab, recording the end of its connection if it had one.
    pub async fn close_tab(&self, id: TabId) -> Option<Tab> {
        let tab = self.tabs.close(id).await?;
        if let Some(connection_id) = tab.connection_id() {
            info!("Releasing connection {} of closed tab {}", connection_id, id);
            self.router
                .report_disconnected(connection_id, tab.protocol.label(), Some("tab closed"));
        }
        Some(tab)
    }

    /// Stop routing and flushing, delivering everything already emitted.
    pub async fn shutdown(self) -> ShutdownReport {
        let routed = self.router_task.shutdown().await;
        let final_flush = self.flusher.shutdown().await;
        info!(
            "Pulse runtime stopped ({} routed, final flush {:?})",
            routed, final_flush
        );
        ShutdownReport {
            routed,
            final_flush,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferFileConfig;
    use std::time::Duration;
    use stream_buffer::{Direction, DirectionFilter, StreamMessage};

    fn fast_config(capacity: usize) -> FileConfig {
        FileConfig {
            buffer: BufferFileConfig {
                capacity,
                flush_delay_ms: 1,
                reschedule_delay_ms: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn wait_until_drained(buffer: &MessageBuffer) {
        for _ in 0..500 {
            if buffer.pending_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if buffer.pending_count() == 0 {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("buffer never drained");
    }

    #[tokio::test]
    async fn test_rejects_zero_capacity() {
        assert!(Pulse::start(&fast_config(0)).is_err());
    }

    #[tokio::test]
    async fn test_rejects_zero_tab_message_limit() {
        let mut config = fast_config(1000);
        config.tabs.max_messages = 0;
        let err = Pulse::start(&config).err().unwrap();
        assert!(err.to_string().contains("[tabs]"));
    }

    #[tokio::test]
    async fn test_pause_drops_batch_end_to_end() {
        let pulse = Pulse::start(&fast_config(1000)).unwrap();
        let buffer = pulse.buffer().clone();

        for payload in ["a", "b", "c"] {
            buffer.ingest(StreamMessage::inbound("WebSocket", payload));
        }
        wait_until_drained(&buffer).await;
        assert_eq!(buffer.len(), 3);

        assert!(buffer.toggle_pause());
        buffer.ingest(StreamMessage::inbound("WebSocket", "d"));
        buffer.ingest(StreamMessage::inbound("WebSocket", "e"));
        wait_until_drained(&buffer).await;
        assert_eq!(buffer.len(), 3);

        assert!(!buffer.toggle_pause());
        buffer.ingest(StreamMessage::inbound("WebSocket", "f"));
        wait_until_drained(&buffer).await;

        let payloads: Vec<_> = buffer.messages().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["a", "b", "c", "f"]);
        pulse.shutdown().await;
    }

    #[tokio::test]
    async fn test_burst_is_capped_and_ordered() {
        let pulse = Pulse::start(&fast_config(100)).unwrap();
        let tab = pulse.open_tab(TabProtocol::WebSocket).await;
        let router = pulse.router().clone();
        router.report_connected(tab, "ws-burst").await;

        for i in 0..1000 {
            router.emit("ws-burst", Direction::Inbound, "WebSocket", i.to_string());
        }

        let report = pulse.shutdown().await;
        assert_eq!(report.routed, 1001);

        let messages = router.buffer().messages();
        assert_eq!(messages.len(), 100);
        assert_eq!(messages.first().unwrap().payload, "900");
        assert_eq!(messages.last().unwrap().payload, "999");
    }

    #[tokio::test]
    async fn test_filter_and_search_over_live_stream() {
        let pulse = Pulse::start(&fast_config(1000)).unwrap();
        let router = pulse.router().clone();

        router.emit("c", Direction::Inbound, "WebSocket", "{\"type\":\"ping\"}");
        router.emit("c", Direction::Outbound, "WebSocket", "PING");
        router.emit("c", Direction::Error, "WebSocket", "boom");
        wait_until_drained(pulse.buffer()).await;

        let buffer = pulse.buffer();
        buffer.set_search("ping");
        assert_eq!(buffer.filtered().len(), 2);

        buffer.set_filter(DirectionFilter::Only(Direction::Inbound));
        let filtered = buffer.filtered();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].payload, "{\"type\":\"ping\"}");

        buffer.set_search("");
        buffer.set_filter(DirectionFilter::Only(Direction::Error));
        assert_eq!(buffer.filtered()[0].payload, "boom");
        pulse.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_tab_reports_disconnect() {
        let pulse = Pulse::start(&fast_config(1000)).unwrap();
        let tab = pulse.open_tab(TabProtocol::Sse).await;
        pulse.router().report_connected(tab, "sse-1").await;

        let closed = pulse.close_tab(tab).await.unwrap();
        assert_eq!(closed.connection_id(), Some("sse-1"));
        assert!(pulse.tabs().is_empty().await);
        assert!(pulse.close_tab(tab).await.is_none());

        let buffer = pulse.buffer().clone();
        pulse.shutdown().await;
        let last = buffer.messages().pop().unwrap();
        assert_eq!(last.direction, Direction::System);
        assert_eq!(last.payload, "Disconnected: tab closed");
    }
}
