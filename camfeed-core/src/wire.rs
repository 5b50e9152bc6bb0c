//! Wire framing for captured frames.
//!
//! Every unit on the wire is a 16-bit big-endian length followed by that
//! many payload bytes:
//!
//! ```text
//! len_hi:  u8
//! len_lo:  u8
//! payload: [u8; len_hi << 8 | len_lo]
//! ```
//!
//! There is no sequence number or timestamp; frame order is arrival order.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CaptureError;

/// Size of the length prefix.
pub const LEN_PREFIX_SIZE: usize = 2;

/// Largest payload the length prefix can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

// ── WireFrame ────────────────────────────────────────────────────

/// An immutable, length-prefixed frame ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame(Bytes);

impl WireFrame {
    /// Prefix `payload` with its big-endian length.
    ///
    /// Fails without allocating a frame if the payload exceeds
    /// [`MAX_PAYLOAD_LEN`].
    pub fn from_payload(payload: &[u8]) -> Result<Self, CaptureError> {
        let len: u16 = payload
            .len()
            .try_into()
            .map_err(|_| CaptureError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            })?;
        let mut buf = BytesMut::with_capacity(LEN_PREFIX_SIZE + payload.len());
        buf.put_u16(len);
        buf.put_slice(payload);
        Ok(Self(buf.freeze()))
    }

    /// Length announced by the prefix.
    pub fn payload_len(&self) -> usize {
        u16::from_be_bytes([self.0[0], self.0[1]]) as usize
    }

    /// The encoded image bytes, without the prefix.
    pub fn payload(&self) -> &[u8] {
        &self.0[LEN_PREFIX_SIZE..]
    }

    /// The full frame, prefix included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a frame carries at least its prefix.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

// ── WireFrameCodec ───────────────────────────────────────────────

/// `tokio_util` codec for streams of [`WireFrame`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireFrameCodec;

impl Decoder for WireFrameCodec {
    type Item = WireFrame;
    type Error = CaptureError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX_SIZE {
            return Ok(None);
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        let total = LEN_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        Ok(Some(WireFrame(src.split_to(total).freeze())))
    }
}

impl Encoder<WireFrame> for WireFrameCodec {
    type Error = CaptureError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
