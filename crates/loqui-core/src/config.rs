//! YAML-backed application configuration.
//!
//! A single file is read once at startup. Every key has a safe default and
//! an absent file is equivalent to defaults, so a fresh installation needs
//! no configuration at all. Unknown keys are ignored for forward
//! compatibility.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file exists but is not valid YAML for this schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Root configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,
    pub keyboard: KeyboardConfig,
    pub mode: ModeConfig,
    pub recognition: RecognitionConfig,
    pub integrations: IntegrationsConfig,
    pub stream: StreamConfig,
    pub interrupt: InterruptConfig,
    pub memory: MemoryConfig,
}

impl AppConfig {
    /// Load the configuration from `path`.
    ///
    /// A missing file yields `Self::default()`; a malformed file is an
    /// error so that typos do not silently fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_yaml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }
}

/// `audio.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture target sample rate.
    pub sample_rate: u32,
    /// Capture channel count.
    pub channels: u16,
    /// Capture sample type label.
    pub dtype: String,
    /// Sample rate of the PCM chunks the server streams back.
    pub playback_sample_rate: u32,
    /// Seconds of playback audio the ring buffer may hold.
    pub playback_buffer_sec: f64,
    pub device_switch: DeviceSwitchConfig,
    /// `auto` | `prefer_a2dp` | `prefer_hfp`.
    pub bluetooth_policy: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            dtype: "int16".into(),
            playback_sample_rate: 24_000,
            playback_buffer_sec: 10.0,
            device_switch: DeviceSwitchConfig::default(),
            bluetooth_policy: "auto".into(),
        }
    }
}

/// `audio.device_switch.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSwitchConfig {
    /// How long a freshly appeared default device is allowed to settle
    /// before capture reopens on it.
    pub settle_ms: u64,
}

impl Default for DeviceSwitchConfig {
    fn default() -> Self {
        Self { settle_ms: 300 }
    }
}

/// `network.*` keys (gRPC channel keepalive and the connectivity probe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub keepalive_time: u64,
    pub keepalive_timeout: u64,
    /// Seconds between connectivity probes.
    pub probe_interval_sec: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            keepalive_time: 30,
            keepalive_timeout: 10,
            probe_interval_sec: 5.0,
        }
    }
}

/// `keyboard.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Hold duration after which a press counts as long.
    pub long_press_threshold_ms: u64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            long_press_threshold_ms: 600,
        }
    }
}

/// `mode.*` keys. A zero timeout disables the watchdog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub listening_timeout_sec: f64,
    pub processing_timeout_sec: f64,
}

impl ModeConfig {
    /// Listening watchdog duration, if enabled.
    #[must_use]
    pub fn listening_watchdog(&self) -> Option<Duration> {
        duration_if_positive(self.listening_timeout_sec)
    }

    /// Processing watchdog duration, if enabled.
    #[must_use]
    pub fn processing_watchdog(&self) -> Option<Duration> {
        duration_if_positive(self.processing_timeout_sec)
    }
}

fn duration_if_positive(secs: f64) -> Option<Duration> {
    (secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

/// `recognition.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Languages attempted in order until one yields text.
    pub languages: Vec<String>,
    pub timeout_sec: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".into()],
            timeout_sec: 10.0,
        }
    }
}

/// `integrations.*` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub grpc_client: GrpcClientConfig,
    pub audio_device: AudioDeviceConfig,
    pub permissions: PermissionsConfig,
}

/// `integrations.grpc_client.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcClientConfig {
    /// Server endpoint URI.
    pub server: String,
    /// How long a recognised text waits for its screenshot.
    pub aggregate_timeout_sec: f64,
    /// Whole-RPC deadline.
    pub request_timeout_sec: f64,
    /// Refuse sends while the network monitor reports offline.
    pub use_network_gate: bool,
}

impl Default for GrpcClientConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:50051".into(),
            aggregate_timeout_sec: 1.5,
            request_timeout_sec: 30.0,
            use_network_gate: true,
        }
    }
}

/// `integrations.audio_device.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDeviceConfig {
    pub auto_switch_enabled: bool,
    /// Seconds between default-device polls.
    pub monitoring_interval: f64,
    /// Seconds to wait before reopening on the new device.
    pub switch_delay: f64,
}

impl Default for AudioDeviceConfig {
    fn default() -> Self {
        Self {
            auto_switch_enabled: true,
            monitoring_interval: 1.0,
            switch_delay: 0.3,
        }
    }
}

/// `integrations.permissions.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Seconds between permission re-checks.
    pub check_interval: f64,
    /// Open the OS preference pane on denial.
    pub auto_open_preferences: bool,
    /// Log remediation instructions on denial.
    pub show_instructions: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            check_interval: 5.0,
            auto_open_preferences: false,
            show_instructions: true,
        }
    }
}

/// `stream.*` keys: the sentence-aggregation thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// A candidate segment at or above this length always emits.
    pub min_chars: usize,
    /// Word floor for segments after the first.
    pub min_words: usize,
    /// Word floor for the very first segment (lower, so the user hears
    /// something sooner).
    pub first_sentence_min_words: usize,
    /// Require whitespace after end punctuation to close a sentence
    /// mid-stream.
    pub punct_flush_strict: bool,
    /// Emit a dangling non-sentence remainder at end-of-text once it
    /// reaches this length. Zero disables the force flush.
    pub force_flush_max_chars: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_chars: 15,
            min_words: 3,
            first_sentence_min_words: 2,
            punct_flush_strict: true,
            force_flush_max_chars: 0,
        }
    }
}

/// `interrupt.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// How long an interrupt mark stays valid.
    pub mark_ttl_sec: f64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self { mark_ttl_sec: 5.0 }
    }
}

impl InterruptConfig {
    /// Mark TTL as a [`Duration`].
    #[must_use]
    pub fn mark_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.mark_ttl_sec.max(0.0))
    }
}

/// `memory.*` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Budget for the read path before a request proceeds without memory.
    pub read_budget_sec: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            read_budget_sec: 2.0,
        }
    }
}

impl MemoryConfig {
    /// Read budget as a [`Duration`].
    #[must_use]
    pub fn read_budget(&self) -> Duration {
        Duration::from_secs_f64(self.read_budget_sec.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.device_switch.settle_ms, 300);
        assert_eq!(config.integrations.grpc_client.aggregate_timeout_sec, 1.5);
        assert_eq!(config.stream.min_chars, 15);
        assert_eq!(config.stream.min_words, 3);
        assert_eq!(config.stream.first_sentence_min_words, 2);
        assert!(config.stream.punct_flush_strict);
        assert_eq!(config.stream.force_flush_max_chars, 0);
        assert_eq!(config.interrupt.mark_ttl_sec, 5.0);
        assert_eq!(config.memory.read_budget_sec, 2.0);
    }

    #[test]
    fn watchdogs_default_disabled() {
        let mode = ModeConfig::default();
        assert!(mode.listening_watchdog().is_none());
        assert!(mode.processing_watchdog().is_none());

        let mode = ModeConfig {
            listening_timeout_sec: 30.0,
            processing_timeout_sec: 0.0,
        };
        assert_eq!(mode.listening_watchdog(), Some(Duration::from_secs(30)));
        assert!(mode.processing_watchdog().is_none());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "integrations:\n  grpc_client:\n    server: \"http://10.0.0.2:443\"\nstream:\n  force_flush_max_chars: 40\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.integrations.grpc_client.server, "http://10.0.0.2:443");
        assert_eq!(config.stream.force_flush_max_chars, 40);
        // Unrelated keys keep their defaults
        assert_eq!(config.integrations.grpc_client.aggregate_timeout_sec, 1.5);
        assert_eq!(config.stream.min_chars, 15);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "stream: [not, a, map]").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
