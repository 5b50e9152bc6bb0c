//! One entry of the readback ring: a fixed buffer plus request state.
//!
//! The state word is the handoff point between the thread that completes a
//! request and the tick thread that consumes it. The completer writes the
//! buffer first and then publishes `Ready` with `Release`; the tick thread
//! loads the state with `Acquire` before it touches the buffer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::surface::ReadyImage;

// ── SlotState ────────────────────────────────────────────────────

/// Lifecycle of the request held by a [`ReadbackSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// No request outstanding; the buffer may be reused.
    Idle = 0,
    /// A request was issued and has not completed yet.
    Pending = 1,
    /// The request completed and the buffer holds fresh pixels.
    Ready = 2,
    /// The request completed with an error; the buffer is stale.
    Errored = 3,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SlotState::Idle,
            1 => SlotState::Pending,
            2 => SlotState::Ready,
            _ => SlotState::Errored,
        }
    }
}

// ── Shared slot storage ──────────────────────────────────────────

struct SlotData {
    pixels: Vec<u8>,
    error: Option<String>,
}

struct SlotShared {
    state: AtomicU8,
    data: Mutex<SlotData>,
    settled: Condvar,
}

impl SlotShared {
    fn lock(&self) -> MutexGuard<'_, SlotData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }
}

// ── ReadbackSlot ─────────────────────────────────────────────────

/// Result of [`ReadbackSlot::take_into`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Taken {
    /// The image was overwritten with fresh pixels.
    Image,
    /// The request failed; the slot is idle again.
    Failed(String),
    /// Nothing to take (slot idle or still pending).
    Nothing,
}

/// A fixed-capacity host buffer plus the state of at most one request.
pub struct ReadbackSlot {
    shared: Arc<SlotShared>,
}

impl ReadbackSlot {
    /// Allocate a slot whose buffer holds exactly `byte_len` bytes.
    pub(crate) fn new(byte_len: usize) -> Self {
        Self {
            shared: Arc::new(SlotShared {
                state: AtomicU8::new(SlotState::Idle as u8),
                data: Mutex::new(SlotData {
                    pixels: vec![0; byte_len],
                    error: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Current request state.
    pub fn state(&self) -> SlotState {
        self.shared.load_state()
    }

    /// Move `Idle → Pending` and hand out the completion for the new request.
    ///
    /// Returns `None` when the slot is not idle.
    pub(crate) fn begin(&self) -> Option<ReadbackCompletion> {
        self.shared
            .state
            .compare_exchange(
                SlotState::Idle as u8,
                SlotState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        Some(ReadbackCompletion {
            shared: Some(Arc::clone(&self.shared)),
        })
    }

    /// Consume a settled request into `image` and return the slot to `Idle`.
    pub(crate) fn take_into(&self, image: &mut ReadyImage) -> Taken {
        match self.state() {
            SlotState::Ready => {
                {
                    let data = self.shared.lock();
                    image.load(&data.pixels);
                }
                self.shared
                    .state
                    .store(SlotState::Idle as u8, Ordering::Release);
                Taken::Image
            }
            SlotState::Errored => {
                let reason = self
                    .shared
                    .lock()
                    .error
                    .take()
                    .unwrap_or_else(|| "unknown readback error".into());
                self.shared
                    .state
                    .store(SlotState::Idle as u8, Ordering::Release);
                Taken::Failed(reason)
            }
            SlotState::Idle | SlotState::Pending => Taken::Nothing,
        }
    }

    /// Block until the outstanding request (if any) has completed.
    pub(crate) fn wait(&self) {
        let mut data = self.shared.lock();
        while self.state() == SlotState::Pending {
            data = self
                .shared
                .settled
                .wait(data)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Free the buffer. Only valid once no request is pending.
    pub(crate) fn release(&self) {
        debug_assert_ne!(self.state(), SlotState::Pending);
        let mut data = self.shared.lock();
        data.pixels = Vec::new();
    }

    /// Capacity of the slot buffer in bytes (0 once released).
    pub fn byte_len(&self) -> usize {
        self.shared.lock().pixels.len()
    }
}

// ── ReadbackCompletion ───────────────────────────────────────────

/// Completion handle for one outstanding readback request.
///
/// Handed to the [`ReadbackBackend`](super::ReadbackBackend) when a request
/// is issued. It settles the request exactly once: every settling method
/// consumes the handle, and dropping it unsettled counts as a failure.
/// It may be moved to and settled from any thread.
pub struct ReadbackCompletion {
    shared: Option<Arc<SlotShared>>,
}

impl ReadbackCompletion {
    /// Number of bytes the destination buffer expects.
    pub fn byte_len(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.lock().pixels.len())
    }

    /// Complete successfully by copying `pixels` into the slot buffer.
    ///
    /// A length mismatch settles the request as failed instead.
    pub fn complete(self, pixels: &[u8]) {
        let expected = self.byte_len();
        if pixels.len() != expected {
            self.fail(format!(
                "readback size mismatch: expected {expected} bytes, got {}",
                pixels.len()
            ));
            return;
        }
        self.complete_with(|dst| dst.copy_from_slice(pixels));
    }

    /// Complete successfully by filling the slot buffer in place.
    pub fn complete_with<F: FnOnce(&mut [u8])>(mut self, fill: F) {
        if let Some(shared) = self.shared.take() {
            let mut data = shared.lock();
            fill(&mut data.pixels);
            data.error = None;
            shared
                .state
                .store(SlotState::Ready as u8, Ordering::Release);
            drop(data);
            shared.settled.notify_all();
        }
    }

    /// Settle the request as failed.
    pub fn fail(mut self, reason: impl Into<String>) {
        if let Some(shared) = self.shared.take() {
            Self::settle_failed(&shared, reason.into());
        }
    }

    fn settle_failed(shared: &SlotShared, reason: String) {
        let mut data = shared.lock();
        data.error = Some(reason);
        shared
            .state
            .store(SlotState::Errored as u8, Ordering::Release);
        drop(data);
        shared.settled.notify_all();
    }
}

impl Drop for ReadbackCompletion {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            warn!("readback completion dropped without being settled");
            Self::settle_failed(&shared, "request dropped by backend".into());
        }
    }
}

impl std::fmt::Debug for ReadbackCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadbackCompletion")
            .field("settled", &self.shared.is_none())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{PixelFormat, SurfaceDesc};

    fn image() -> ReadyImage {
        ReadyImage::new(SurfaceDesc::new(1, 1, PixelFormat::Rgba8))
    }

    #[test]
    fn begin_only_from_idle() {
        let slot = ReadbackSlot::new(4);
        let completion = slot.begin().unwrap();
        assert_eq!(slot.state(), SlotState::Pending);
        assert!(slot.begin().is_none());
        completion.complete(&[1, 2, 3, 4]);
        assert_eq!(slot.state(), SlotState::Ready);
        assert!(slot.begin().is_none());
    }

    #[test]
    fn ready_slot_loads_image_and_goes_idle() {
        let slot = ReadbackSlot::new(4);
        slot.begin().unwrap().complete(&[9, 8, 7, 6]);

        let mut img = image();
        assert_eq!(slot.take_into(&mut img), Taken::Image);
        assert_eq!(img.pixels(), &[9, 8, 7, 6]);
        assert_eq!(slot.state(), SlotState::Idle);
        assert_eq!(slot.take_into(&mut img), Taken::Nothing);
    }

    #[test]
    fn failed_request_reports_reason() {
        let slot = ReadbackSlot::new(4);
        slot.begin().unwrap().fail("device lost");
        assert_eq!(slot.state(), SlotState::Errored);

        let mut img = image();
        assert_eq!(slot.take_into(&mut img), Taken::Failed("device lost".into()));
        assert_eq!(slot.state(), SlotState::Idle);
    }

    #[test]
    fn wrong_length_completion_fails() {
        let slot = ReadbackSlot::new(4);
        slot.begin().unwrap().complete(&[1, 2]);
        assert_eq!(slot.state(), SlotState::Errored);
    }

    #[test]
    fn dropped_completion_counts_as_error() {
        let slot = ReadbackSlot::new(4);
        drop(slot.begin().unwrap());
        assert_eq!(slot.state(), SlotState::Errored);
    }

    #[test]
    fn pending_slot_yields_nothing() {
        let slot = ReadbackSlot::new(4);
        let _completion = slot.begin().unwrap();
        let mut img = image();
        assert_eq!(slot.take_into(&mut img), Taken::Nothing);
        assert_eq!(slot.state(), SlotState::Pending);
    }

    #[test]
    fn wait_returns_after_cross_thread_completion() {
        let slot = ReadbackSlot::new(4);
        let completion = slot.begin().unwrap();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            completion.complete(&[1, 1, 1, 1]);
        });
        slot.wait();
        assert_eq!(slot.state(), SlotState::Ready);
        handle.join().unwrap();
    }
}
