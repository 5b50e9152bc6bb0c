//! Per-tick capture orchestration.
//!
//! The host calls [`CaptureDriver::on_frame_tick`] once after every
//! rendered frame:
//!
//! 1. No bound transport → nothing happens.
//! 2. [`CaptureGate`] checks pacing and transport queue depth.
//! 3. The readback path produces an image:
//!    - **async**: issue into the next slot, consume the current slot,
//!      rotate. The image lags its request by one tick.
//!    - **sync**: blocking readback into the shared image.
//! 4. [`FrameEncoder`] builds the wire frame and the transport sends it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, trace, warn};

use crate::config::{CaptureConfig, CaptureMode};
use crate::encoder::FrameEncoder;
use crate::error::CaptureError;
use crate::gate::CaptureGate;
use crate::readback::{Consumed, Issue, ReadbackBackend, ReadbackPipeline};
use crate::stats::{CaptureStats, ThroughputMeter};
use crate::transport::{Transport, TransportBinding};

// ── TickOutcome ──────────────────────────────────────────────────

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No transport bound (or the driver was torn down).
    Unbound,
    /// Skipped: the pacing interval has not elapsed.
    Throttled,
    /// Skipped: the transport queue is too deep.
    Backpressure,
    /// Captured, but no image was ready to consume yet.
    Warming,
    /// A frame of `bytes` wire bytes was sent.
    Sent { bytes: usize },
    /// A captured frame was dropped (readback or encoding failure).
    Dropped,
}

/// Readback path resolved from [`CaptureMode`] and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePath {
    Async,
    Sync,
}

// ── CaptureDriver ────────────────────────────────────────────────

/// Top-level capture orchestrator.
pub struct CaptureDriver<B: ReadbackBackend> {
    backend: B,
    pipeline: Option<ReadbackPipeline>,
    gate: CaptureGate,
    encoder: FrameEncoder,
    binding: Arc<TransportBinding>,
    path: CapturePath,
    sync_rerender: bool,
    stats: CaptureStats,
    meter: ThroughputMeter,
    stats_interval: Duration,
    last_report: Option<Instant>,
}

impl<B: ReadbackBackend> CaptureDriver<B> {
    /// Allocate the readback ring and resolve the capture path.
    pub fn new(backend: B, config: &CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let pipeline = ReadbackPipeline::new(config.surface_desc(), config.slot_count)?;
        let path = match config.mode {
            CaptureMode::Async => CapturePath::Async,
            CaptureMode::Sync => CapturePath::Sync,
            CaptureMode::Auto if backend.supports_async() => CapturePath::Async,
            CaptureMode::Auto => CapturePath::Sync,
        };
        info!(
            surface = %config.surface_desc(),
            slots = config.slot_count,
            ?path,
            codec = ?config.codec,
            "capture driver ready"
        );

        Ok(Self {
            backend,
            pipeline: Some(pipeline),
            gate: CaptureGate::new(config.min_interval, config.max_queue_depth),
            encoder: FrameEncoder::new(config.codec, config.compression),
            binding: Arc::new(TransportBinding::new()),
            path,
            sync_rerender: config.sync_rerender,
            stats: CaptureStats::default(),
            meter: ThroughputMeter::new(),
            stats_interval: config.stats_interval,
            last_report: None,
        })
    }

    /// A cloneable handle through which a transport can be bound from
    /// another task.
    pub fn binding(&self) -> Arc<TransportBinding> {
        Arc::clone(&self.binding)
    }

    /// Bind `transport` unless one is already bound.
    pub fn bind(&self, transport: Arc<dyn Transport>) -> bool {
        self.binding.bind(transport)
    }

    pub fn path(&self) -> CapturePath {
        self.path
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The readback ring; `None` after [`teardown`](Self::teardown).
    pub fn pipeline(&self) -> Option<&ReadbackPipeline> {
        self.pipeline.as_ref()
    }

    /// Handle one end-of-frame signal.
    pub fn on_frame_tick(&mut self, surface: &B::Surface, now: Instant) -> TickOutcome {
        let Some(transport) = self.binding.current() else {
            return TickOutcome::Unbound;
        };
        let Some(pipeline) = self.pipeline.as_mut() else {
            return TickOutcome::Unbound;
        };
        self.stats.ticks += 1;

        let depth = transport.queue_depth();
        if !self.gate.should_capture(now, depth) {
            return if depth > self.gate.max_queue_depth() {
                self.stats.backpressured += 1;
                TickOutcome::Backpressure
            } else {
                self.stats.throttled += 1;
                TickOutcome::Throttled
            };
        }
        self.gate.record_capture(now);

        let encoded = match self.path {
            CapturePath::Async => {
                match pipeline.issue_capture(&self.backend, surface) {
                    Ok(Issue::Issued) => self.stats.issued += 1,
                    Ok(Issue::InFlight | Issue::SlotBusy) => self.stats.issue_skipped += 1,
                    Err(e) => {
                        warn!("readback issue failed: {e}");
                        self.stats.issue_skipped += 1;
                    }
                }

                let encoded = match pipeline.try_consume() {
                    Consumed::Image(image) => self.encoder.encode(image),
                    Consumed::Failed => {
                        self.stats.readback_errors += 1;
                        pipeline.rotate();
                        return TickOutcome::Dropped;
                    }
                    Consumed::Empty => {
                        pipeline.rotate();
                        return TickOutcome::Warming;
                    }
                };
                pipeline.rotate();
                encoded
            }
            CapturePath::Sync => {
                match pipeline.read_blocking(&self.backend, surface, self.sync_rerender) {
                    Ok(image) => self.encoder.encode(image),
                    Err(e) => {
                        warn!("blocking readback failed, frame dropped: {e}");
                        self.stats.readback_errors += 1;
                        return TickOutcome::Dropped;
                    }
                }
            }
        };

        match encoded {
            Ok(frame) => {
                let bytes = frame.len();
                trace!(bytes, "sending frame");
                transport.send(frame);
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                self.meter.record_at(now, bytes as u64);
                self.maybe_report(now);
                TickOutcome::Sent { bytes }
            }
            Err(CaptureError::PayloadTooLarge { size, max }) => {
                warn!("encoded frame is {size} bytes, over the {max}-byte wire limit; dropped");
                self.stats.frames_dropped += 1;
                TickOutcome::Dropped
            }
            Err(e) => {
                warn!("frame encoding failed, frame dropped: {e}");
                self.stats.frames_dropped += 1;
                TickOutcome::Dropped
            }
        }
    }

    /// Unbind the transport, then wait for in-flight readbacks and free
    /// the ring. Blocks until every pending request has completed.
    pub fn teardown(&mut self) {
        self.binding.clear();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.drain_and_release();
        }
        info!(
            frames = self.stats.frames_sent,
            bytes = self.stats.bytes_sent,
            dropped = self.stats.frames_dropped,
            readback_errors = self.stats.readback_errors,
            "capture driver torn down"
        );
    }

    // ── Internal ─────────────────────────────────────────────────

    fn maybe_report(&mut self, now: Instant) {
        let Some(last) = self.last_report else {
            self.last_report = Some(now);
            return;
        };
        if now.saturating_duration_since(last) < self.stats_interval {
            return;
        }
        self.last_report = Some(now);
        info!(
            fps = format_args!("{:.1}", self.meter.frames_per_sec()),
            bytes_per_sec = self.meter.bytes_per_sec(),
            sent = self.stats.frames_sent,
            dropped = self.stats.frames_dropped,
            "capture stream"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────
