//! Configuration for the capture host.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use camfeed_core::{CaptureConfig, CaptureMode, CompressionLevel, PayloadCodec, PixelFormat};

use crate::renderer::Pattern;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Capture pipeline settings.
    pub capture: CaptureSection,
    /// Synthetic renderer settings.
    pub render: RenderConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the frame listener binds to.
    pub listen_addr: String,
}

/// Capture pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub width: u32,
    pub height: u32,
    /// Surface pixel layout: "argb32", "rgba8", "bgra8".
    pub format: PixelFormat,
    /// Readback slots in the ring.
    pub slots: usize,
    /// Minimum milliseconds between captures.
    pub min_interval_ms: u64,
    /// Largest consumer backlog at which capturing continues.
    pub max_queue_depth: usize,
    /// Readback path: "auto", "async", "sync".
    pub mode: CaptureMode,
    /// Payload codec: "png", "zstd".
    pub codec: PayloadCodec,
    /// Compression effort: "fast", "default", "best".
    pub compression: CompressionLevel,
    /// Re-render the surface before a synchronous readback.
    pub sync_rerender: bool,
}

/// Synthetic renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Rendered frames per second.
    pub fps: u32,
    /// Test pattern: "gradient" or "checker".
    pub pattern: Pattern,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7340".into(),
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        let core = CaptureConfig::default();
        Self {
            width: core.width,
            height: core.height,
            format: core.format,
            slots: core.slot_count,
            min_interval_ms: core.min_interval.as_millis() as u64,
            max_queue_depth: core.max_queue_depth,
            mode: core.mode,
            codec: core.codec,
            compression: core.compression,
            sync_rerender: core.sync_rerender,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            pattern: Pattern::Gradient,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Interval between rendered frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.render.fps.clamp(1, 240)
    }

    /// Convert the capture section into a core [`CaptureConfig`].
    pub fn to_capture_config(&self) -> CaptureConfig {
        let c = &self.capture;
        CaptureConfig {
            width: c.width.max(1),
            height: c.height.max(1),
            format: c.format,
            slot_count: c.slots.max(2),
            min_interval: Duration::from_millis(c.min_interval_ms.max(1)),
            max_queue_depth: c.max_queue_depth,
            mode: c.mode,
            codec: c.codec,
            compression: c.compression,
            sync_rerender: c.sync_rerender,
            ..CaptureConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
