//! Readback: getting rendered pixels out of render-only memory.
//!
//! | Module     | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | `slot`     | One buffer + request state, exactly-once completion   |
//! | `pipeline` | Rotating ring of slots, issue / consume / rotate      |
//! | `worker`   | CPU backend completing requests on a worker thread    |

pub mod pipeline;
pub mod slot;
pub mod worker;

pub use pipeline::{Consumed, Issue, ReadbackPipeline};
pub use slot::{ReadbackCompletion, ReadbackSlot, SlotState};
pub use worker::{SoftwareSurface, WorkerReadback};

use crate::error::CaptureError;
use crate::surface::RenderSurface;

/// The renderer-side copy engine the pipeline drives.
///
/// `request` must not block: it queues the copy and returns. The backend
/// later settles the [`ReadbackCompletion`] exactly once, from any thread,
/// writing the surface content as it was when the request was issued.
pub trait ReadbackBackend {
    type Surface: RenderSurface;

    /// Queue an asynchronous copy of `surface` into the completion's buffer.
    fn request(&self, surface: &Self::Surface, completion: ReadbackCompletion);

    /// Blocking copy of the current surface content into `dst`.
    fn read_blocking(&self, surface: &Self::Surface, dst: &mut [u8]) -> Result<(), CaptureError>;

    /// Force a render of `surface` before a blocking read.
    fn render(&self, _surface: &Self::Surface) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Whether asynchronous readback can be trusted on this backend.
    fn supports_async(&self) -> bool {
        true
    }
}
