//! Error types for the capture pipeline.
//!
//! Fallible operations return `Result<T, CaptureError>`. Routine degraded
//! events (a failed readback, a throttled tick) are not errors; they are
//! reported through [`crate::TickOutcome`] instead.

use thiserror::Error;

use crate::surface::SurfaceDesc;

/// The canonical error type for `camfeed-core`.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Framing ──────────────────────────────────────────────────
    /// The encoded payload does not fit the 16-bit wire length prefix.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Configuration ────────────────────────────────────────────
    /// A configuration value is outside its accepted range.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// A surface handed to the pipeline does not match its geometry.
    #[error("surface mismatch: expected {expected}, got {actual}")]
    SurfaceMismatch {
        expected: SurfaceDesc,
        actual: SurfaceDesc,
    },

    // ── Readback ─────────────────────────────────────────────────
    /// The readback backend reported a failure.
    #[error("readback failed: {0}")]
    Readback(String),

    // ── Encoding ─────────────────────────────────────────────────
    /// The payload codec failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Transport ────────────────────────────────────────────────
    /// The socket/IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<png::EncodingError> for CaptureError {
    fn from(e: png::EncodingError) -> Self {
        CaptureError::Encoding(e.to_string())
    }
}
