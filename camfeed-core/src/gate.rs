//! Capture pacing and backpressure.
//!
//! The gate caps the capture rate independently of the render rate and
//! refuses to capture while the transport still has frames waiting.

use std::time::{Duration, Instant};

/// Decides, once per tick, whether a capture should be attempted.
#[derive(Debug, Clone)]
pub struct CaptureGate {
    min_interval: Duration,
    max_queue_depth: usize,
    last_capture: Option<Instant>,
}

impl CaptureGate {
    pub fn new(min_interval: Duration, max_queue_depth: usize) -> Self {
        Self {
            min_interval,
            max_queue_depth,
            last_capture: None,
        }
    }

    /// Whether a capture may proceed at `now` with `queue_depth` frames
    /// still waiting in the transport. Never mutates the gate.
    pub fn should_capture(&self, now: Instant, queue_depth: usize) -> bool {
        if queue_depth > self.max_queue_depth {
            return false;
        }
        match self.last_capture {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    /// Record that a capture was started at `now`.
    ///
    /// Must be called as soon as the caller decides to proceed, before the
    /// capture itself completes.
    pub fn record_capture(&mut self, now: Instant) {
        self.last_capture = Some(now);
    }

    pub fn last_capture(&self) -> Option<Instant> {
        self.last_capture
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }
}

// ── Tests ────────────────────────────────────────────────────────
