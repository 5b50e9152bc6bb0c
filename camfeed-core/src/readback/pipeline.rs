//! Rotating ring of readback slots.
//!
//! Each tick the pipeline issues a request into the slot holding the
//! "next" role, tries to consume the slot holding the "current" role, and
//! then rotates both roles by one position. A request is therefore always
//! consumed one tick after it was issued, and the tick thread never waits
//! on the backend.
//!
//! ```text
//!  tick k      base = k     current = k mod N      next = (k + N - 1) mod N
//!  rotate      base = k + 1
//! ```

use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::readback::ReadbackBackend;
use crate::readback::slot::{ReadbackSlot, SlotState, Taken};
use crate::surface::{ReadyImage, RenderSurface, SurfaceDesc};

/// Outcome of [`ReadbackPipeline::issue_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issue {
    /// A new request is now pending in the next-role slot.
    Issued,
    /// Another slot still has a request in flight.
    InFlight,
    /// The next-role slot still holds an unconsumed result.
    SlotBusy,
}

/// Result of polling the current-role slot.
#[derive(Debug)]
pub enum Consumed<'a> {
    /// A readback completed; the shared image now holds its pixels.
    Image(&'a ReadyImage),
    /// A readback failed and its frame was dropped.
    Failed,
    /// Nothing completed in the current slot.
    Empty,
}

impl<'a> Consumed<'a> {
    pub fn image(self) -> Option<&'a ReadyImage> {
        match self {
            Consumed::Image(image) => Some(image),
            Consumed::Failed | Consumed::Empty => None,
        }
    }
}

/// Fixed ring of [`ReadbackSlot`]s plus the shared [`ReadyImage`].
pub struct ReadbackPipeline {
    desc: SurfaceDesc,
    slots: Vec<ReadbackSlot>,
    /// Rotation counter; roles are derived from it modulo the ring size.
    base: usize,
    image: ReadyImage,
    /// Set once the buffers were freed by `drain_and_release`.
    released: bool,
}

impl ReadbackPipeline {
    /// Allocate `slot_count` buffers sized for `desc`.
    ///
    /// At least two slots are required so that the issue and consume roles
    /// never land on the same slot.
    pub fn new(desc: SurfaceDesc, slot_count: usize) -> Result<Self, CaptureError> {
        if slot_count < 2 {
            return Err(CaptureError::InvalidConfig("readback ring needs at least 2 slots"));
        }
        if desc.pixel_count() == 0 {
            return Err(CaptureError::InvalidConfig("surface must not be empty"));
        }
        let slots = (0..slot_count)
            .map(|_| ReadbackSlot::new(desc.byte_len()))
            .collect();
        Ok(Self {
            desc,
            slots,
            base: 0,
            image: ReadyImage::new(desc),
            released: false,
        })
    }

    pub fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    /// Number of slots in the ring.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot currently holding the consume role.
    pub fn current_index(&self) -> usize {
        self.base % self.slots.len()
    }

    /// Index of the slot currently holding the issue role.
    pub fn next_index(&self) -> usize {
        (self.base + self.slots.len() - 1) % self.slots.len()
    }

    /// State of slot `index`.
    pub fn slot_state(&self, index: usize) -> SlotState {
        self.slots[index].state()
    }

    /// Number of slots with a request in flight.
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state() == SlotState::Pending)
            .count()
    }

    /// Issue a non-blocking readback of `surface` into the next-role slot.
    ///
    /// The request is skipped while any slot is still pending or the
    /// next-role slot holds an unconsumed result, so at most one request is
    /// ever in flight.
    pub fn issue_capture<B: ReadbackBackend>(
        &mut self,
        backend: &B,
        surface: &B::Surface,
    ) -> Result<Issue, CaptureError> {
        self.check_surface(surface)?;

        if self.pending_count() > 0 {
            debug!("readback still in flight; not issuing");
            return Ok(Issue::InFlight);
        }

        let next = self.next_index();
        match self.slots[next].begin() {
            Some(completion) => {
                backend.request(surface, completion);
                Ok(Issue::Issued)
            }
            None => {
                debug!(slot = next, "next slot not idle; not issuing");
                Ok(Issue::SlotBusy)
            }
        }
    }

    /// Poll the current-role slot without blocking.
    pub fn try_consume(&mut self) -> Consumed<'_> {
        let current = self.current_index();
        match self.slots[current].take_into(&mut self.image) {
            Taken::Image => Consumed::Image(&self.image),
            Taken::Failed(reason) => {
                warn!(slot = current, "readback error, frame dropped: {reason}");
                Consumed::Failed
            }
            Taken::Nothing => Consumed::Empty,
        }
    }

    /// Advance both roles by one slot.
    pub fn rotate(&mut self) {
        self.base = self.base.wrapping_add(1);
    }

    /// Synchronous readback: render (optionally) and copy straight into the
    /// shared image, blocking the caller until the copy completes.
    pub fn read_blocking<B: ReadbackBackend>(
        &mut self,
        backend: &B,
        surface: &B::Surface,
        rerender: bool,
    ) -> Result<&ReadyImage, CaptureError> {
        self.check_surface(surface)?;
        if rerender {
            backend.render(surface)?;
        }
        backend.read_blocking(surface, self.image.pixels_mut())?;
        Ok(&self.image)
    }

    /// Wait for every in-flight request, then free all slot buffers.
    pub fn drain_and_release(mut self) {
        self.drain();
        for slot in &self.slots {
            slot.release();
        }
        self.released = true;
        info!(slots = self.slots.len(), "readback pipeline released");
    }

    /// Block until no slot is pending.
    fn drain(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.state() == SlotState::Pending {
                debug!(slot = index, "waiting for in-flight readback");
                slot.wait();
            }
        }
    }

    fn check_surface<S: RenderSurface>(&self, surface: &S) -> Result<(), CaptureError> {
        let actual = surface.desc();
        if actual != self.desc {
            return Err(CaptureError::SurfaceMismatch {
                expected: self.desc,
                actual,
            });
        }
        Ok(())
    }
}

/// Never blocks. A completion still held by the backend keeps its slot
/// storage alive through the shared `Arc`, so a late copy lands in live
/// memory; only [`ReadbackPipeline::drain_and_release`] waits.
impl Drop for ReadbackPipeline {
    fn drop(&mut self) {
        let pending = self.pending_count();
        if !self.released && pending > 0 {
            warn!(pending, "readback pipeline dropped with requests in flight");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readback::ReadbackCompletion;
    use crate::surface::PixelFormat;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const DESC: SurfaceDesc = SurfaceDesc::new(2, 2, PixelFormat::Argb32);

    /// A surface whose whole content is one repeated byte.
    struct Fill(u8);

    impl RenderSurface for Fill {
        fn desc(&self) -> SurfaceDesc {
            DESC
        }
    }

    /// Holds completions until the test settles them.
    #[derive(Default)]
    struct Manual {
        held: RefCell<Vec<(u8, ReadbackCompletion)>>,
    }

    impl Manual {
        fn complete_all(&self) {
            for (fill, c) in self.held.borrow_mut().drain(..) {
                c.complete(&vec![fill; DESC.byte_len()]);
            }
        }
    }

    impl ReadbackBackend for Manual {
        type Surface = Fill;

        fn request(&self, surface: &Fill, completion: ReadbackCompletion) {
            self.held.borrow_mut().push((surface.0, completion));
        }

        fn read_blocking(&self, surface: &Fill, dst: &mut [u8]) -> Result<(), CaptureError> {
            dst.fill(surface.0);
            Ok(())
        }
    }

    #[test]
    fn rejects_single_slot_ring() {
        assert!(ReadbackPipeline::new(DESC, 1).is_err());
    }

    #[test]
    fn roles_rotate_around_the_ring() {
        let mut p = ReadbackPipeline::new(DESC, 3).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push((p.current_index(), p.next_index()));
            p.rotate();
        }
        assert_eq!(seen, vec![(0, 2), (1, 0), (2, 1), (0, 2)]);
    }

    #[test]
    fn result_is_consumed_one_tick_later() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();

        assert_eq!(p.issue_capture(&backend, &Fill(7)).unwrap(), Issue::Issued);
        assert_eq!(p.slot_state(1), SlotState::Pending);
        assert!(p.try_consume().image().is_none());
        p.rotate();
        backend.complete_all();

        assert_eq!(p.issue_capture(&backend, &Fill(9)).unwrap(), Issue::Issued);
        let image = p.try_consume().image().unwrap();
        assert!(image.pixels().iter().all(|&b| b == 7));
        backend.complete_all();
    }

    #[test]
    fn never_more_than_one_pending() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 3).unwrap();

        assert_eq!(p.issue_capture(&backend, &Fill(1)).unwrap(), Issue::Issued);
        p.rotate();
        assert_eq!(p.issue_capture(&backend, &Fill(2)).unwrap(), Issue::InFlight);
        assert_eq!(p.pending_count(), 1);
        backend.complete_all();
    }

    #[test]
    fn dropping_with_request_in_flight_does_not_block() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();
        p.issue_capture(&backend, &Fill(4)).unwrap();
        assert_eq!(p.pending_count(), 1);

        drop(p);

        // The late completion still has a live buffer to write into.
        backend.complete_all();
        assert!(backend.held.borrow().is_empty());
    }

    #[test]
    fn unconsumed_result_blocks_reissue() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();

        p.issue_capture(&backend, &Fill(1)).unwrap();
        backend.complete_all();
        // Rotate twice without consuming: slot 1 is "next" again, still Ready.
        p.rotate();
        p.rotate();
        assert_eq!(p.next_index(), 1);
        assert_eq!(p.issue_capture(&backend, &Fill(2)).unwrap(), Issue::SlotBusy);
    }

    #[test]
    fn failed_readback_is_dropped() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();

        p.issue_capture(&backend, &Fill(1)).unwrap();
        p.rotate();
        let (_, completion) = backend.held.borrow_mut().pop().unwrap();
        completion.fail("boom");

        assert!(matches!(p.try_consume(), Consumed::Failed));
        assert_eq!(p.slot_state(1), SlotState::Idle);
        assert!(matches!(p.try_consume(), Consumed::Empty));
    }

    #[test]
    fn blocking_read_has_no_latency() {
        let backend = Manual::default();
        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();
        let image = p.read_blocking(&backend, &Fill(5), false).unwrap();
        assert!(image.pixels().iter().all(|&b| b == 5));
    }

    #[test]
    fn surface_mismatch_is_rejected() {
        struct Big;
        impl RenderSurface for Big {
            fn desc(&self) -> SurfaceDesc {
                SurfaceDesc::new(4, 4, PixelFormat::Argb32)
            }
        }
        struct Null;
        impl ReadbackBackend for Null {
            type Surface = Big;
            fn request(&self, _: &Big, c: ReadbackCompletion) {
                c.fail("unused");
            }
            fn read_blocking(&self, _: &Big, _: &mut [u8]) -> Result<(), CaptureError> {
                Ok(())
            }
        }

        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();
        let err = p.issue_capture(&Null, &Big).unwrap_err();
        assert!(matches!(err, CaptureError::SurfaceMismatch { .. }));
    }

    #[test]
    fn drain_waits_for_pending_request() {
        struct Threaded;
        static FINISHED: AtomicBool = AtomicBool::new(false);

        impl ReadbackBackend for Threaded {
            type Surface = Fill;
            fn request(&self, surface: &Fill, completion: ReadbackCompletion) {
                let fill = surface.0;
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(50));
                    FINISHED.store(true, Ordering::SeqCst);
                    completion.complete(&vec![fill; DESC.byte_len()]);
                });
            }
            fn read_blocking(&self, _: &Fill, _: &mut [u8]) -> Result<(), CaptureError> {
                Ok(())
            }
        }

        let mut p = ReadbackPipeline::new(DESC, 2).unwrap();
        p.issue_capture(&Threaded, &Fill(3)).unwrap();
        assert_eq!(p.pending_count(), 1);
        p.drain_and_release();
        assert!(FINISHED.load(Ordering::SeqCst));
    }
}
