//! Transport contract and the set-once binding the driver reads each tick.
//!
//! The pipeline needs exactly two things from a transport: how many frames
//! are still waiting for delivery, and a fire-and-forget `send`.
//! [`ChannelTransport`] provides both on top of a tokio channel so that an
//! async writer task can own the actual socket.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::wire::WireFrame;

// ── Transport ────────────────────────────────────────────────────

/// Capability the capture driver depends on.
pub trait Transport: Send + Sync {
    /// Number of frames accepted by `send` and not yet delivered.
    fn queue_depth(&self) -> usize;

    /// Queue `frame` for delivery. Must not block.
    fn send(&self, frame: WireFrame);
}

// ── TransportBinding ─────────────────────────────────────────────

/// Optional transport handle that can be set only once.
///
/// The first [`bind`](Self::bind) wins; later calls are ignored until the
/// binding is [`clear`](Self::clear)ed at teardown. Shared between the tick
/// thread (reads every tick) and whoever accepts the consumer (binds once).
#[derive(Default)]
pub struct TransportBinding {
    handle: RwLock<Option<Arc<dyn Transport>>>,
}

impl TransportBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `transport` if nothing is bound yet. Returns whether it took effect.
    pub fn bind(&self, transport: Arc<dyn Transport>) -> bool {
        let mut handle = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            debug!("transport already bound; ignoring bind");
            return false;
        }
        *handle = Some(transport);
        info!("transport bound");
        true
    }

    /// The bound transport, if any.
    pub fn current(&self) -> Option<Arc<dyn Transport>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_bound(&self) -> bool {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the bound transport. Returns whether one was bound.
    pub fn clear(&self) -> bool {
        self.handle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

impl std::fmt::Debug for TransportBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBinding")
            .field("bound", &self.is_bound())
            .finish()
    }
}

// ── ChannelTransport ─────────────────────────────────────────────

/// Create a connected transport/receiver pair.
pub fn channel() -> (ChannelTransport, ChannelReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        ChannelTransport {
            tx,
            depth: Arc::clone(&depth),
        },
        ChannelReceiver { rx, depth },
    )
}

/// [`Transport`] that hands frames to a [`ChannelReceiver`].
///
/// A frame counts towards the queue depth from `send` until the receiving
/// side drops its [`PendingFrame`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<WireFrame>,
    depth: Arc<AtomicUsize>,
}

impl ChannelTransport {
    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    fn send(&self, frame: WireFrame) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(frame).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            debug!("transport receiver closed; frame dropped");
        }
    }
}

/// Receiving half of [`channel`].
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<WireFrame>,
    depth: Arc<AtomicUsize>,
}

impl ChannelReceiver {
    /// Wait for the next frame. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<PendingFrame> {
        let frame = self.rx.recv().await?;
        Some(self.pending(frame))
    }

    /// Take the next frame if one is queued.
    pub fn try_recv(&mut self) -> Option<PendingFrame> {
        let frame = self.rx.try_recv().ok()?;
        Some(self.pending(frame))
    }

    fn pending(&self, frame: WireFrame) -> PendingFrame {
        PendingFrame {
            frame,
            depth: Arc::clone(&self.depth),
        }
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        // Queued frames will never be delivered; stop counting them.
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "transport receiver dropped with frames queued");
        }
    }
}

/// A received frame that still counts as queued until it is dropped.
///
/// Drop it once the frame has actually been delivered.
#[derive(Debug)]
pub struct PendingFrame {
    frame: WireFrame,
    depth: Arc<AtomicUsize>,
}

impl Deref for PendingFrame {
    type Target = WireFrame;

    fn deref(&self) -> &WireFrame {
        &self.frame
    }
}

impl Drop for PendingFrame {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

// ── Tests ────────────────────────────────────────────────────────
