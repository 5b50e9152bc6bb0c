//! # camfeed-core
//!
//! Captures rendered frames without stalling the render loop and streams
//! them as length-prefixed images to a single consumer.
//!
//! ```text
//! end-of-frame tick
//!        │
//!        ▼
//!  CaptureGate ──skip──► (nothing)
//!        │ proceed
//!        ▼
//!  ReadbackPipeline  (async ring, or blocking fallback)
//!        │ ReadyImage
//!        ▼
//!  FrameEncoder  ──►  WireFrame [len_hi len_lo payload…]
//!        │
//!        ▼
//!  Transport::send   (bound once via TransportBinding)
//! ```
//!
//! This crate contains:
//! - **Surface types**: `PixelFormat`, `SurfaceDesc`, `RenderSurface`, `ReadyImage`
//! - **Readback**: `ReadbackBackend`, `ReadbackPipeline`, `ReadbackCompletion`, `WorkerReadback`
//! - **Gate**: `CaptureGate` pacing and backpressure
//! - **Encoding**: `FrameEncoder` (PNG or zstd payloads)
//! - **Wire**: `WireFrame` and the `WireFrameCodec` for `tokio_util`
//! - **Transport**: `Transport`, `TransportBinding`, `ChannelTransport`
//! - **Driver**: `CaptureDriver`, the per-tick orchestrator
//! - **Error**: `CaptureError`, a `thiserror`-based error type

pub mod config;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod gate;
pub mod readback;
pub mod stats;
pub mod surface;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::{CaptureConfig, CaptureMode};
pub use driver::{CaptureDriver, CapturePath, TickOutcome};
pub use encoder::{CompressionLevel, FrameEncoder, PayloadCodec};
pub use error::CaptureError;
pub use gate::CaptureGate;
pub use readback::{
    ReadbackBackend, ReadbackCompletion, ReadbackPipeline, SlotState, SoftwareSurface,
    WorkerReadback,
};
pub use stats::{CaptureStats, ThroughputMeter};
pub use surface::{PixelFormat, ReadyImage, RenderSurface, SurfaceDesc};
pub use transport::{ChannelReceiver, ChannelTransport, PendingFrame, Transport, TransportBinding};
pub use wire::{MAX_PAYLOAD_LEN, WireFrame, WireFrameCodec};
