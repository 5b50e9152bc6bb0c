//! Capture counters and send-rate estimation.
//!
//! [`ThroughputMeter`] keeps `(timestamp, bytes)` samples over a rolling
//! window and derives frames/second and bytes/second from them. The driver
//! feeds it every sent frame and logs a summary periodically.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

// ── ThroughputMeter ──────────────────────────────────────────────

/// Rolling-window send-rate estimator.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl ThroughputMeter {
    /// Create a meter with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(64),
            window,
            total_bytes: 0,
        }
    }

    /// Record a frame of `bytes` sent at `when`.
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Frames per second over the window.
    pub fn frames_per_sec(&self) -> f64 {
        match self.span() {
            Some(secs) => (self.samples.len() - 1) as f64 / secs,
            None => 0.0,
        }
    }

    /// Bytes per second over the window.
    ///
    /// The oldest sample opens the span, so its bytes are not counted,
    /// matching the interval count used by [`frames_per_sec`](Self::frames_per_sec).
    pub fn bytes_per_sec(&self) -> u64 {
        let (Some(secs), Some(&(_, first))) = (self.span(), self.samples.front()) else {
            return 0;
        };
        (self.total_bytes.saturating_sub(first) as f64 / secs) as u64
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Seconds between the oldest and newest sample, if at least two exist.
    fn span(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let (first, _) = self.samples.front()?;
        let (last, _) = self.samples.back()?;
        let d = last.duration_since(*first).max(Duration::from_millis(1));
        Some(d.as_secs_f64())
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── CaptureStats ─────────────────────────────────────────────────

/// Lifetime counters of a capture driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Ticks observed while a transport was bound.
    pub ticks: u64,
    /// Ticks skipped by the pacing interval.
    pub throttled: u64,
    /// Ticks skipped because the transport queue was too deep.
    pub backpressured: u64,
    /// Readback requests issued.
    pub issued: u64,
    /// Issue attempts skipped because a slot was still busy.
    pub issue_skipped: u64,
    /// Frames handed to the transport.
    pub frames_sent: u64,
    /// Wire bytes handed to the transport.
    pub bytes_sent: u64,
    /// Readbacks that completed with an error.
    pub readback_errors: u64,
    /// Frames dropped after capture (encoding failure, oversized payload).
    pub frames_dropped: u64,
}

// ── Tests ────────────────────────────────────────────────────────
