//! Capture pipeline configuration.
//!
//! This is the plain in-process configuration. Binaries load their own
//! TOML files and convert them into a [`CaptureConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoder::{CompressionLevel, PayloadCodec};
use crate::error::CaptureError;
use crate::surface::{PixelFormat, SurfaceDesc};

/// Which readback path the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Async when the backend supports it, otherwise sync.
    #[default]
    Auto,
    /// Double-buffered asynchronous readback, one tick of latency.
    Async,
    /// Blocking readback inside the tick, no latency.
    Sync,
}

/// Configuration for [`CaptureDriver`](crate::CaptureDriver).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Surface pixel layout.
    pub format: PixelFormat,
    /// Number of readback slots in the ring (>= 2).
    pub slot_count: usize,
    /// Minimum time between two capture attempts.
    pub min_interval: Duration,
    /// Largest transport queue depth at which capturing still proceeds.
    pub max_queue_depth: usize,
    pub mode: CaptureMode,
    pub codec: PayloadCodec,
    pub compression: CompressionLevel,
    /// Force a render of the surface before a synchronous readback.
    pub sync_rerender: bool,
    /// How often the driver logs its send rate.
    pub stats_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 80,
            format: PixelFormat::Argb32,
            slot_count: 2,
            min_interval: Duration::from_millis(30),
            max_queue_depth: 1,
            mode: CaptureMode::Auto,
            codec: PayloadCodec::Png,
            compression: CompressionLevel::Fast,
            sync_rerender: false,
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl CaptureConfig {
    pub fn surface_desc(&self) -> SurfaceDesc {
        SurfaceDesc::new(self.width, self.height, self.format)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidConfig("surface dimensions must be non-zero"));
        }
        if self.slot_count < 2 {
            return Err(CaptureError::InvalidConfig("slot_count must be at least 2"));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_instance() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.surface_desc(), SurfaceDesc::new(128, 80, PixelFormat::Argb32));
        assert_eq!(cfg.slot_count, 2);
        assert_eq!(cfg.min_interval, Duration::from_millis(30));
        assert_eq!(cfg.max_queue_depth, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = CaptureConfig::default();
        cfg.slot_count = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = CaptureConfig::default();
        cfg.height = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mode_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            mode: CaptureMode,
            codec: PayloadCodec,
        }
        let w: Wrap = toml::from_str("mode = \"sync\"\ncodec = \"zstd\"").unwrap();
        assert_eq!(w.mode, CaptureMode::Sync);
        assert_eq!(w.codec, PayloadCodec::Zstd);
    }
}
