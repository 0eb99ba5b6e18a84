//! Runtime configuration.
//!
//! The top-level [`Config`] deserializes from JSON and carries all
//! sub-configs. Every section defaults sensibly so an empty `{}` file is
//! valid. The batch delays (item timeout, settlement cooldown) are
//! empirical stability values around backend teardown latency; they are
//! config fields so deployments can tune them, but the cooldown must stay
//! non-zero.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backends: BackendsConfig,
    pub engine: EngineConfig,
    pub ranges: RangeConfig,
    pub batch: BatchConfig,
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.batch.settle_cooldown_ms == 0 {
            warnings.push(
                "batch.settle_cooldown_ms is 0; the backend may not finish teardown \
                 between files and cross-file reads can corrupt"
                    .into(),
            );
        }

        if self.batch.item_timeout_secs == 0 {
            warnings.push("batch.item_timeout_secs is 0; every item will time out".into());
        }

        if self.engine.write_attempts == 0 {
            warnings.push("engine.write_attempts is 0; all writes will fail".into());
        }

        if self.ranges.min_chunk_bytes > self.ranges.probe_prefix_bytes {
            warnings.push(
                "ranges.min_chunk_bytes exceeds ranges.probe_prefix_bytes; the floor wins".into(),
            );
        }

        if self.delivery.chunk_bytes == 0 {
            warnings.push("delivery.chunk_bytes is 0; chunked delivery cannot progress".into());
        }

        if self.delivery.chunk_bytes > self.delivery.direct_limit_bytes {
            warnings.push(
                "delivery.chunk_bytes exceeds delivery.direct_limit_bytes; chunked delivery \
                 will emit a single chunk"
                    .into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Backend locations and scratch space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Explicit path to the ffmpeg binary; discovered on `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Scratch directory for the text backend; a temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

/// Extraction engine retry and deadline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts for a backend write before escalating to fatal.
    pub write_attempts: u32,
    /// Base backoff between write attempts, doubled each retry.
    pub write_backoff_ms: u64,
    /// Hard deadline for one backend write.
    pub write_timeout_secs: u64,
    /// Hard deadline for one backend execute (probe or export).
    pub exec_timeout_secs: u64,
    /// Attempts for scratch cleanup; failures are logged and swallowed.
    pub cleanup_attempts: u32,
    /// Backoff between cleanup attempts.
    pub cleanup_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_attempts: 3,
            write_backoff_ms: 250,
            write_timeout_secs: 30,
            exec_timeout_secs: 120,
            cleanup_attempts: 3,
            cleanup_backoff_ms: 100,
        }
    }
}

/// Memory pressure level used to scale probe read windows down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    #[default]
    Low,
    Elevated,
    Critical,
}

impl MemoryPressure {
    /// Right-shift applied to base window sizes at this pressure level.
    pub fn shift(self) -> u32 {
        match self {
            MemoryPressure::Low => 0,
            MemoryPressure::Elevated => 1,
            MemoryPressure::Critical => 2,
        }
    }
}

/// Byte-range selection policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// ISO-BMFF files at or below this size are probed whole.
    pub probe_whole_file_limit: u64,
    /// Base size of each head/middle/tail window for large ISO-BMFF probes.
    pub probe_window_bytes: u64,
    /// Base prefix size for probing non-box containers.
    pub probe_prefix_bytes: u64,
    /// Floor below which pressure scaling stops shrinking windows.
    pub min_chunk_bytes: u64,
    /// Largest export read the engine will buffer; longer files export a
    /// prefix and the plan is marked incomplete.
    pub export_buffer_limit: u64,
    /// Current memory pressure level.
    pub pressure: MemoryPressure,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            probe_whole_file_limit: 64 * MIB,
            probe_window_bytes: 64 * MIB,
            probe_prefix_bytes: 32 * MIB,
            min_chunk_bytes: 8 * MIB,
            export_buffer_limit: 4 * GIB,
            pressure: MemoryPressure::Low,
        }
    }
}

/// Batch coordinator delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Deadline for one item to settle before it is forced to `TimedOut`.
    pub item_timeout_secs: u64,
    /// Cooldown after settlement before the next item is admitted, giving
    /// the backend time to finish asynchronous teardown.
    pub settle_cooldown_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_timeout_secs: 90,
            settle_cooldown_ms: 500,
        }
    }
}

/// Artifact delivery thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Artifacts below this size deliver in one piece.
    pub direct_limit_bytes: u64,
    /// Chunk size for streamed delivery of larger artifacts.
    pub chunk_bytes: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            direct_limit_bytes: 2 * GIB,
            chunk_bytes: 100 * MIB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.write_attempts, 3);
        assert_eq!(cfg.batch.item_timeout_secs, 90);
        assert_eq!(cfg.batch.settle_cooldown_ms, 500);
        assert_eq!(cfg.delivery.direct_limit_bytes, 2 * GIB);
        assert_eq!(cfg.delivery.chunk_bytes, 100 * MIB);
        assert_eq!(cfg.ranges.probe_window_bytes, 64 * MIB);
        assert_eq!(cfg.ranges.pressure, MemoryPressure::Low);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn zero_cooldown_warns() {
        let mut cfg = Config::default();
        cfg.batch.settle_cooldown_ms = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("settle_cooldown_ms")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"batch": {"item_timeout_secs": 30}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.batch.item_timeout_secs, 30);
        // Untouched sections keep defaults.
        assert_eq!(cfg.batch.settle_cooldown_ms, 500);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.engine.exec_timeout_secs, 120);
    }

    #[test]
    fn parse_pressure_level() {
        let json = r#"{"ranges": {"pressure": "critical"}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.ranges.pressure, MemoryPressure::Critical);
        assert_eq!(cfg.ranges.pressure.shift(), 2);
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.batch.item_timeout_secs, 90);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.batch.item_timeout_secs, 90);
    }
}
