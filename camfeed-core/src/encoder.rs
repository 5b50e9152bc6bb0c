//! Frame encoder: ready image → lossless payload → [`WireFrame`].
//!
//! Two payload codecs are available:
//!
//! - **Png**: the image as an 8-bit RGBA PNG.
//! - **Zstd**: the raw pixel bytes in surface order, zstd-compressed.
//!
//! Both are lossless and deterministic for a given image and setting, so
//! the same image always yields the same frame.

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::surface::ReadyImage;
use crate::wire::{MAX_PAYLOAD_LEN, WireFrame};

// ── Settings ─────────────────────────────────────────────────────

/// Payload codec used for captured images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCodec {
    #[default]
    Png,
    Zstd,
}

/// Speed/size trade-off of the payload codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    #[default]
    Fast,
    Default,
    Best,
}

impl CompressionLevel {
    fn png(self) -> png::Compression {
        match self {
            CompressionLevel::Fast => png::Compression::Fast,
            CompressionLevel::Default => png::Compression::Default,
            CompressionLevel::Best => png::Compression::Best,
        }
    }

    fn zstd(self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Default => 3,
            CompressionLevel::Best => 19,
        }
    }
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// Compresses images and wraps them in the wire framing.
///
/// Scratch buffers are kept between calls so steady-state encoding does
/// not reallocate.
pub struct FrameEncoder {
    codec: PayloadCodec,
    level: CompressionLevel,
    rgba: Vec<u8>,
    payload: Vec<u8>,
    frame_count: u64,
}

impl FrameEncoder {
    pub fn new(codec: PayloadCodec, level: CompressionLevel) -> Self {
        Self {
            codec,
            level,
            rgba: Vec::new(),
            payload: Vec::new(),
            frame_count: 0,
        }
    }

    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    /// Number of frames successfully encoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Encode `image` into a wire frame.
    ///
    /// Fails with [`CaptureError::PayloadTooLarge`] when the compressed
    /// image does not fit the 16-bit length prefix; no partial frame is
    /// produced in that case.
    pub fn encode(&mut self, image: &ReadyImage) -> Result<WireFrame, CaptureError> {
        self.payload.clear();
        match self.codec {
            PayloadCodec::Png => self.encode_png(image)?,
            PayloadCodec::Zstd => self.encode_zstd(image)?,
        }

        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CaptureError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let frame = WireFrame::from_payload(&self.payload)?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn encode_png(&mut self, image: &ReadyImage) -> Result<(), CaptureError> {
        let desc = image.desc();
        image.write_rgba(&mut self.rgba);

        let mut encoder = png::Encoder::new(&mut self.payload, desc.width, desc.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(self.level.png());
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.rgba)?;
        writer.finish()?;
        Ok(())
    }

    fn encode_zstd(&mut self, image: &ReadyImage) -> Result<(), CaptureError> {
        zstd::stream::copy_encode(image.pixels(), &mut self.payload, self.level.zstd())
            .map_err(|e| CaptureError::Encoding(format!("zstd encode failed: {e}")))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(PayloadCodec::Png, CompressionLevel::Fast)
    }
}

// ── Tests ────────────────────────────────────────────────────────
