//! CPU readback backend.
//!
//! [`SoftwareSurface`] is a shared pixel buffer a software renderer draws
//! into. [`WorkerReadback`] snapshots it when a request is issued and
//! settles the completion from a dedicated worker thread, the way a GPU
//! driver signals a finished copy outside the render loop.

use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::readback::{ReadbackBackend, ReadbackCompletion};
use crate::surface::{RenderSurface, SurfaceDesc};

// ── SoftwareSurface ──────────────────────────────────────────────

/// A CPU-side render target shared between a renderer and the backend.
///
/// Cloning is cheap; clones refer to the same pixels.
#[derive(Debug, Clone)]
pub struct SoftwareSurface {
    desc: SurfaceDesc,
    pixels: Arc<RwLock<Vec<u8>>>,
}

impl SoftwareSurface {
    /// Allocate a zeroed surface.
    pub fn new(desc: SurfaceDesc) -> Self {
        Self {
            desc,
            pixels: Arc::new(RwLock::new(vec![0; desc.byte_len()])),
        }
    }

    /// Draw into the surface.
    pub fn draw<F: FnOnce(&mut [u8])>(&self, paint: F) {
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        paint(&mut pixels);
    }

    /// Copy the current content into `dst`.
    pub fn copy_to(&self, dst: &mut [u8]) -> Result<(), CaptureError> {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        if dst.len() != pixels.len() {
            return Err(CaptureError::Readback(format!(
                "destination holds {} bytes, surface has {}",
                dst.len(),
                pixels.len()
            )));
        }
        dst.copy_from_slice(&pixels);
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        self.pixels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RenderSurface for SoftwareSurface {
    fn desc(&self) -> SurfaceDesc {
        self.desc
    }
}

// ── WorkerReadback ───────────────────────────────────────────────

type Redraw = Box<dyn Fn(&SoftwareSurface) + Send + Sync>;

struct Job {
    pixels: Vec<u8>,
    completion: ReadbackCompletion,
}

/// [`ReadbackBackend`] that completes requests on its own thread.
///
/// Dropping the backend lets the worker finish every queued job before it
/// exits, so no issued request is left unsettled.
pub struct WorkerReadback {
    tx: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    redraw: Option<Redraw>,
    async_supported: bool,
}

impl WorkerReadback {
    /// Start a worker that settles each request after `latency`.
    pub fn spawn(latency: Duration) -> Result<Self, CaptureError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name("camfeed-readback".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if !latency.is_zero() {
                        std::thread::sleep(latency);
                    }
                    job.completion.complete(&job.pixels);
                }
                debug!("readback worker exiting");
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            redraw: None,
            async_supported: true,
        })
    }

    /// Install the callback used when the synchronous path forces a render.
    pub fn with_redraw<F>(mut self, redraw: F) -> Self
    where
        F: Fn(&SoftwareSurface) + Send + Sync + 'static,
    {
        self.redraw = Some(Box::new(redraw));
        self
    }

    /// Report async readback as unsupported, steering `Auto` mode to the
    /// synchronous path.
    pub fn without_async(mut self) -> Self {
        self.async_supported = false;
        self
    }
}

impl ReadbackBackend for WorkerReadback {
    type Surface = SoftwareSurface;

    fn request(&self, surface: &SoftwareSurface, completion: ReadbackCompletion) {
        let job = Job {
            pixels: surface.snapshot(),
            completion,
        };
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(job) {
                    job.completion.fail("readback worker is gone");
                }
            }
            None => job.completion.fail("readback worker is stopped"),
        }
    }

    fn read_blocking(&self, surface: &SoftwareSurface, dst: &mut [u8]) -> Result<(), CaptureError> {
        surface.copy_to(dst)
    }

    fn render(&self, surface: &SoftwareSurface) -> Result<(), CaptureError> {
        if let Some(redraw) = &self.redraw {
            redraw(surface);
        }
        Ok(())
    }

    fn supports_async(&self) -> bool {
        self.async_supported
    }
}

impl Drop for WorkerReadback {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the queued jobs.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("readback worker panicked");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readback::{ReadbackPipeline, SlotState};
    use crate::surface::PixelFormat;

    const DESC: SurfaceDesc = SurfaceDesc::new(4, 2, PixelFormat::Argb32);

    #[test]
    fn worker_completes_from_its_own_thread() {
        let backend = WorkerReadback::spawn(Duration::ZERO).unwrap();
        let surface = SoftwareSurface::new(DESC);
        surface.draw(|px| px.fill(0x42));

        let mut pipeline = ReadbackPipeline::new(DESC, 2).unwrap();
        pipeline.issue_capture(&backend, &surface).unwrap();
        pipeline.rotate();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while pipeline.slot_state(1) == SlotState::Pending {
            assert!(std::time::Instant::now() < deadline, "worker never completed");
            std::thread::sleep(Duration::from_millis(1));
        }
        let image = pipeline.try_consume().image().unwrap();
        assert!(image.pixels().iter().all(|&b| b == 0x42));
    }

    #[test]
    fn request_snapshots_surface_at_issue_time() {
        let backend = WorkerReadback::spawn(Duration::from_millis(20)).unwrap();
        let surface = SoftwareSurface::new(DESC);
        surface.draw(|px| px.fill(1));

        let mut pipeline = ReadbackPipeline::new(DESC, 2).unwrap();
        pipeline.issue_capture(&backend, &surface).unwrap();
        surface.draw(|px| px.fill(2));
        pipeline.rotate();

        drop(backend); // joins the worker after the queued job
        let image = pipeline.try_consume().image().unwrap();
        assert!(image.pixels().iter().all(|&b| b == 1));
    }

    #[test]
    fn render_invokes_redraw() {
        let backend = WorkerReadback::spawn(Duration::ZERO)
            .unwrap()
            .with_redraw(|s| s.draw(|px| px.fill(9)));
        let surface = SoftwareSurface::new(DESC);

        let mut dst = vec![0; DESC.byte_len()];
        backend.render(&surface).unwrap();
        backend.read_blocking(&surface, &mut dst).unwrap();
        assert!(dst.iter().all(|&b| b == 9));
    }

    #[test]
    fn copy_to_rejects_wrong_size() {
        let surface = SoftwareSurface::new(DESC);
        let mut dst = vec![0; 3];
        assert!(surface.copy_to(&mut dst).is_err());
    }
}
