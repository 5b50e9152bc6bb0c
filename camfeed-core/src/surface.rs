//! Pixel and surface types shared by the readback and encoding stages.
//!
//! A [`RenderSurface`] is whatever the renderer draws into; the core only
//! ever needs its [`SurfaceDesc`]. Pixel bytes reach the host through the
//! readback backend and land in a [`ReadyImage`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ── PixelFormat ──────────────────────────────────────────────────

/// Byte layout of a single pixel in a surface or readback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel: Alpha, Red, Green, Blue.
    Argb32,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Argb32 | PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// Convert one pixel in this format to `[r, g, b, a]`.
    #[inline]
    pub fn to_rgba(self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Argb32 => [px[1], px[2], px[3], px[0]],
            PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
        }
    }

    /// Convert `[r, g, b, a]` into this format's byte order.
    #[inline]
    pub fn from_rgba(self, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        match self {
            PixelFormat::Argb32 => [a, r, g, b],
            PixelFormat::Rgba8 => [r, g, b, a],
            PixelFormat::Bgra8 => [b, g, r, a],
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Argb32 => write!(f, "argb32"),
            PixelFormat::Rgba8 => write!(f, "rgba8"),
            PixelFormat::Bgra8 => write!(f, "bgra8"),
        }
    }
}

// ── SurfaceDesc ──────────────────────────────────────────────────

/// Fixed geometry of a render surface: resolution plus pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl SurfaceDesc {
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Number of pixels in one surface.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Tightly packed byte size of one surface.
    pub const fn byte_len(&self) -> usize {
        self.pixel_count() * self.format.bytes_per_pixel()
    }
}

impl fmt::Display for SurfaceDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

// ── RenderSurface ────────────────────────────────────────────────

/// A render target produced by the external renderer once per tick.
///
/// The core never reads pixels from it directly; the readback backend
/// does, on the core's behalf.
pub trait RenderSurface {
    fn desc(&self) -> SurfaceDesc;
}

// ── ReadyImage ───────────────────────────────────────────────────

/// Host-resident image holding the most recently read-back pixels.
///
/// Allocated once by the pipeline and overwritten in place each time a
/// readback is consumed.
#[derive(Debug, Clone)]
pub struct ReadyImage {
    desc: SurfaceDesc,
    pixels: Vec<u8>,
}

impl ReadyImage {
    /// Allocate a zeroed image for `desc`.
    pub fn new(desc: SurfaceDesc) -> Self {
        Self {
            desc,
            pixels: vec![0; desc.byte_len()],
        }
    }

    pub fn desc(&self) -> SurfaceDesc {
        self.desc
    }

    /// Raw pixel bytes in [`SurfaceDesc::format`] order.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable access for blocking readbacks that write straight into the image.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Overwrite the image with `src`, which must be exactly one surface.
    ///
    /// # Panics
    ///
    /// Panics if `src.len()` differs from the image size.
    pub fn load(&mut self, src: &[u8]) {
        self.pixels.copy_from_slice(src);
    }

    /// Write the image as tightly packed RGBA into `out`, reusing its capacity.
    pub fn write_rgba(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.desc.pixel_count() * 4);
        let bpp = self.desc.format.bytes_per_pixel();
        for px in self.pixels.chunks_exact(bpp) {
            out.extend_from_slice(&self.desc.format.to_rgba(px));
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_sizes() {
        let desc = SurfaceDesc::new(128, 80, PixelFormat::Argb32);
        assert_eq!(desc.pixel_count(), 10_240);
        assert_eq!(desc.byte_len(), 40_960);
        assert_eq!(desc.to_string(), "128x80 argb32");
    }

    #[test]
    fn argb_converts_to_rgba() {
        let px = PixelFormat::Argb32.from_rgba([10, 20, 30, 255]);
        assert_eq!(px, [255, 10, 20, 30]);
        assert_eq!(PixelFormat::Argb32.to_rgba(&px), [10, 20, 30, 255]);
        assert_eq!(PixelFormat::Bgra8.to_rgba(&[3, 2, 1, 4]), [1, 2, 3, 4]);
    }

    #[test]
    fn ready_image_load_overwrites_in_place() {
        let desc = SurfaceDesc::new(2, 1, PixelFormat::Argb32);
        let mut image = ReadyImage::new(desc);
        let before = image.pixels().as_ptr();

        image.load(&[255, 1, 2, 3, 128, 4, 5, 6]);
        assert_eq!(image.pixels().as_ptr(), before);

        let mut rgba = Vec::new();
        image.write_rgba(&mut rgba);
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 128]);
    }

    #[test]
    #[should_panic]
    fn ready_image_rejects_wrong_size() {
        let mut image = ReadyImage::new(SurfaceDesc::new(2, 2, PixelFormat::Rgba8));
        image.load(&[0; 4]);
    }
}
