use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stream_buffer::{BufferConfig, MAX_MESSAGES};
use tab_manager::{DEFAULT_TAB_MESSAGE_LIMIT, TabManagerConfig};
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [buffer]
//                    capacity = 5000
//
//   env var:         PULSE_BUFFER__CAPACITY=5000   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub buffer: BufferFileConfig,
    #[serde(default)]
    pub tabs: TabsFileConfig,
}

/// Stream buffer tunables (lives under `[buffer]` in config.toml).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferFileConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    #[serde(default = "default_reschedule_delay_ms")]
    pub reschedule_delay_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BufferFileConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            flush_delay_ms: default_flush_delay_ms(),
            reschedule_delay_ms: default_reschedule_delay_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Tab registry tunables (lives under `[tabs]` in config.toml).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabsFileConfig {
    #[serde(default = "default_tab_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for TabsFileConfig {
    fn default() -> Self {
        Self {
            max_messages: default_tab_max_messages(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    MAX_MESSAGES
}
fn default_flush_delay_ms() -> u64 {
    16
}
fn default_reschedule_delay_ms() -> u64 {
    50
}
fn default_event_capacity() -> usize {
    256
}
fn default_tab_max_messages() -> usize {
    DEFAULT_TAB_MESSAGE_LIMIT
}

/// Build a figment that layers: defaults → config.toml → PULSE_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `PULSE_BUFFER__CAPACITY=5000`  →  `buffer.capacity = 5000`
///   `PULSE_TABS__MAX_MESSAGES=200`  →  `tabs.max_messages = 200`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("PULSE_").split("__"))
}

/// Load and extract the layered config for `data_dir`.
pub fn resolve(data_dir: &Path) -> Result<FileConfig> {
    load_config(data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", data_dir.display()))
}

// =============================================================================
// Runtime config conversions
// =============================================================================

impl BufferFileConfig {
    pub fn to_runtime(&self) -> BufferConfig {
        BufferConfig {
            capacity: self.capacity,
            flush_delay: Duration::from_millis(self.flush_delay_ms),
            reschedule_delay: Duration::from_millis(self.reschedule_delay_ms),
            event_capacity: self.event_capacity,
        }
    }
}

impl TabsFileConfig {
    pub fn to_runtime(&self) -> TabManagerConfig {
        TabManagerConfig {
            max_messages: self.max_messages,
            event_capacity: self.event_capacity,
        }
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct PulseConfig {
    pub data_dir: PathBuf,
}

impl PulseConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".pulse"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn load(&self) -> Result<FileConfig> {
        resolve(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_buffer_file_config_defaults() {
        let d = BufferFileConfig::default();
        assert_eq!(d.capacity, 1000);
        assert_eq!(d.flush_delay_ms, 16);
        assert_eq!(d.reschedule_delay_ms, 50);
        assert_eq!(d.event_capacity, 256);
    }

    #[test]
    fn test_tabs_file_config_defaults() {
        let d = TabsFileConfig::default();
        assert_eq!(d.max_messages, 1000);
        assert_eq!(d.event_capacity, 256);
    }

    // ── to_runtime ──────────────────────────────────────────────────────

    #[test]
    fn test_buffer_runtime_matches_library_defaults() {
        assert_eq!(BufferFileConfig::default().to_runtime(), BufferConfig::default());
    }

    #[test]
    fn test_tabs_runtime_matches_library_defaults() {
        assert_eq!(TabsFileConfig::default().to_runtime(), TabManagerConfig::default());
    }

    #[test]
    fn test_buffer_runtime_custom_values() {
        let fc = BufferFileConfig {
            capacity: 10,
            flush_delay_ms: 1,
            reschedule_delay_ms: 5,
            ..Default::default()
        };
        let rc = fc.to_runtime();
        assert_eq!(rc.capacity, 10);
        assert_eq!(rc.flush_delay, Duration::from_millis(1));
        assert_eq!(rc.reschedule_delay, Duration::from_millis(5));
    }

    // ── PulseConfig ─────────────────────────────────────────────────────

    #[test]
    fn test_pulse_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let config = PulseConfig::new(Some(dir.clone())).unwrap();

        assert_eq!(config.data_dir, dir);
        assert!(dir.exists());
        assert_eq!(config.config_toml_path(), dir.join("config.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc, FileConfig::default());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[buffer]\ncapacity = 5000\nflush_delay_ms = 8\n\n[tabs]\nmax_messages = 50\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.buffer.capacity, 5000);
        assert_eq!(fc.buffer.flush_delay_ms, 8);
        assert_eq!(fc.buffer.reschedule_delay_ms, 50);
        assert_eq!(fc.tabs.max_messages, 50);
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[buffer]\ncapacity = \"lots\"\n",
        )
        .unwrap();
        assert!(resolve(tmp.path()).is_err());
    }

    #[test]
    fn test_file_config_toml_roundtrip() {
        let rendered = toml::to_string_pretty(&FileConfig::default()).unwrap();
        assert!(rendered.contains("[buffer]"));
        assert!(rendered.contains("capacity = 1000"));
        let parsed: FileConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, FileConfig::default());
    }
}
