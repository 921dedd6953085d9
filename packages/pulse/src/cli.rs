use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;
use stream_buffer::{BufferEvent, Direction, DirectionFilter, StreamMessage, ViewFilter};
use tab_manager::TabProtocol;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::config::{FileConfig, PulseConfig};
use crate::runtime::Pulse;

const REPLAY_CONNECTION: &str = "replay";

/// Options for `pulse replay`.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Also route the messages into a tab of this protocol
    pub protocol: Option<TabProtocol>,
    pub filter: DirectionFilter,
    pub search: Option<String>,
    pub json: bool,
}

/// Parse newline-delimited JSON messages. Blank lines are skipped.
pub fn read_messages(reader: impl BufRead) -> Result<Vec<StreamMessage>> {
    let mut messages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read message log")?;
        if line.trim().is_empty() {
            continue;
        }
        let message: StreamMessage = serde_json::from_str(&line)
            .with_context(|| format!("Invalid message on line {}", index + 1))?;
        messages.push(message);
    }
    Ok(messages)
}

/// Render one message the way the stream view lists it.
pub fn format_message(message: &StreamMessage) -> String {
    format!(
        "{} {:>8} [{}] {}",
        message
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S%.3f"),
        message.direction.as_str(),
        message.protocol,
        message.payload
    )
}

/// Feed a recorded message log through the runtime and print the filtered view.
pub async fn replay_command(config: &FileConfig, file: &Path, options: ReplayOptions) -> Result<()> {
    let reader = BufReader::new(
        std::fs::File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let messages = read_messages(reader)?;
    info!("Replaying {} messages from {}", messages.len(), file.display());

    let pulse = Pulse::start(config)?;
    let tab = match options.protocol {
        Some(protocol) => {
            let tab = pulse.open_tab(protocol).await;
            if !pulse.router().report_connected(tab, REPLAY_CONNECTION).await {
                warn!("{} tabs do not stream; replaying into the buffer only", protocol);
            }
            Some(tab)
        }
        None => None,
    };

    let total = messages.len();
    for message in messages {
        pulse.router().route(REPLAY_CONNECTION, message);
    }

    pulse.router().sync().await;
    let closed = match tab {
        Some(id) => pulse.close_tab(id).await,
        None => None,
    };

    let buffer = pulse.buffer().clone();
    let report = pulse.shutdown().await;
    debug!("Replay finished: {:?}", report);

    let filter = ViewFilter::new(options.filter, options.search.as_deref().unwrap_or(""));
    let visible = buffer.messages();
    let shown = filter.apply(visible.iter());

    for message in &shown {
        if options.json {
            println!("{}", serde_json::to_string(message)?);
        } else {
            println!("{}", format_message(message));
        }
    }

    eprintln!(
        "{} read, {} visible, {} shown",
        total,
        visible.len(),
        shown.len()
    );
    if let Some(tab) = closed {
        eprintln!("tab '{}': {} messages", tab.name, tab.messages.len());
    }
    Ok(())
}

/// Run concurrent synthetic producers against the runtime and report what stuck.
pub async fn simulate_command(config: &FileConfig, tab_count: usize, per_tab: usize) -> Result<()> {
    let pulse = Pulse::start(config)?;
    let mut events = pulse.buffer().subscribe();

    let streaming: Vec<TabProtocol> = TabProtocol::ALL
        .into_iter()
        .filter(TabProtocol::is_streaming)
        .collect();

    let mut producers = Vec::with_capacity(tab_count);
    for i in 0..tab_count {
        let protocol = streaming[i % streaming.len()];
        let tab = pulse.open_tab(protocol).await;
        let connection_id = format!("sim-{}", i);
        pulse.router().report_connected(tab, &connection_id).await;

        let router = pulse.router().clone();
        producers.push(tokio::spawn(async move {
            for n in 0..per_tab {
                let direction = match n % 10 {
                    0 => Direction::Outbound,
                    9 => Direction::Error,
                    _ => Direction::Inbound,
                };
                router.emit(
                    &connection_id,
                    direction,
                    protocol.label(),
                    format!("{{\"seq\":{},\"source\":\"{}\"}}", n, connection_id),
                );
                if n % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    for producer in producers {
        producer.await.context("Producer task panicked")?;
    }

    let buffer = pulse.buffer().clone();
    let tabs = pulse.tabs().clone();
    let report = pulse.shutdown().await;

    let mut flushes = 0usize;
    let mut evicted = 0usize;
    loop {
        match events.try_recv() {
            Ok(BufferEvent::Flushed { evicted: e, .. }) => {
                flushes += 1;
                evicted += e;
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                debug!("Missed {} buffer events", skipped);
            }
            Err(_) => break,
        }
    }

    let emitted = tab_count * (per_tab + 1);
    println!("emitted:  {}", emitted);
    println!("routed:   {}", report.routed);
    println!("visible:  {} (capacity {})", buffer.len(), buffer.capacity());
    println!("flushes:  {} ({} evicted)", flushes, evicted);
    println!("final:    {:?}", report.final_flush);
    for tab in tabs.list().await {
        println!("  {:<16} {:>6} messages", tab.name, tab.messages.len());
    }
    Ok(())
}

/// Print the resolved configuration as TOML.
pub fn config_command(paths: &PulseConfig, config: &FileConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("# {}", paths.config_toml_path().display());
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_messages_skips_blank_lines() {
        let a = serde_json::to_string(&StreamMessage::inbound("WebSocket", "one")).unwrap();
        let b = serde_json::to_string(&StreamMessage::error("WebSocket", "two")).unwrap();
        let input = format!("{}\n\n{}\n", a, b);

        let messages = read_messages(Cursor::new(input)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, "one");
        assert_eq!(messages[1].direction, Direction::Error);
    }

    #[test]
    fn test_read_messages_reports_line() {
        let good = serde_json::to_string(&StreamMessage::inbound("SSE Stream", "ok")).unwrap();
        let input = format!("{}\nnot json\n", good);

        let err = read_messages(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_format_message() {
        let line = format_message(&StreamMessage::outbound("MQTT", "hello"));
        assert!(line.ends_with("outbound [MQTT] hello"));
    }

    #[tokio::test]
    async fn test_replay_command_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        let lines: Vec<String> = ["a", "b", "c"]
            .into_iter()
            .map(|p| serde_json::to_string(&StreamMessage::inbound("WebSocket", p)).unwrap())
            .collect();
        std::fs::write(&path, lines.join("\n")).unwrap();

        let options = ReplayOptions {
            protocol: Some(TabProtocol::WebSocket),
            search: Some("b".into()),
            ..Default::default()
        };
        replay_command(&FileConfig::default(), &path, options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replay_command_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let result = replay_command(
            &FileConfig::default(),
            &tmp.path().join("missing.jsonl"),
            ReplayOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_simulate_command_runs() {
        simulate_command(&FileConfig::default(), 3, 20).await.unwrap();
    }
}
