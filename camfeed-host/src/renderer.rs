//! Synthetic renderer.
//!
//! Draws an animated test pattern into a [`SoftwareSurface`] so the capture
//! pipeline has moving content to stream without a GPU.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use camfeed_core::{RenderSurface, SoftwareSurface};

/// Test pattern drawn by [`PatternRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Diagonal colour gradient scrolling one pixel per frame.
    #[default]
    Gradient,
    /// 8×8 checkerboard sliding one pixel per frame.
    Checker,
}

/// Frame-counting pattern renderer.
///
/// Shared between the tick loop, which advances and draws, and the readback
/// backend's redraw hook, which redraws the current frame.
#[derive(Debug)]
pub struct PatternRenderer {
    pattern: Pattern,
    frame: AtomicU64,
}

impl PatternRenderer {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            frame: AtomicU64::new(0),
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// Move to the next frame and draw it.
    pub fn render_next(&self, surface: &SoftwareSurface) {
        self.frame.fetch_add(1, Ordering::Relaxed);
        self.draw(surface);
    }

    /// Draw the current frame.
    pub fn draw(&self, surface: &SoftwareSurface) {
        let desc = surface.desc();
        let width = desc.width as usize;
        let bpp = desc.format.bytes_per_pixel();
        let t = self.frame();

        surface.draw(|pixels| {
            for (i, px) in pixels.chunks_exact_mut(bpp).enumerate() {
                let x = (i % width) as u64 + t;
                let y = (i / width) as u64;
                let rgba = match self.pattern {
                    Pattern::Gradient => [x as u8, y as u8, (x + y) as u8, 0xFF],
                    Pattern::Checker if ((x / 8) + (y / 8)) % 2 == 0 => [0xFF, 0xFF, 0xFF, 0xFF],
                    Pattern::Checker => [0x20, 0x20, 0x20, 0xFF],
                };
                px.copy_from_slice(&desc.format.from_rgba(rgba));
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
