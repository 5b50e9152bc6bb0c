//! Stream receiver.
//!
//! Reads [`WireFrame`]s off a TCP stream with [`WireFrameCodec`], checks
//! that PNG payloads decode, and periodically logs the receive rate.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{info, trace, warn};

use camfeed_core::wire::LEN_PREFIX_SIZE;
use camfeed_core::{ThroughputMeter, WireFrameCodec};

use crate::config::RecvConfig;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

// ── Payload inspection ───────────────────────────────────────────

/// What a payload turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Png { width: u32, height: u32 },
    /// Not a PNG; raw compressed pixels or anything else.
    Opaque,
}

impl PayloadKind {
    fn extension(self) -> &'static str {
        match self {
            PayloadKind::Png { .. } => "png",
            PayloadKind::Opaque => "bin",
        }
    }
}

/// Classify `payload`, fully decoding it when it claims to be a PNG.
pub fn inspect(payload: &[u8]) -> Result<PayloadKind, png::DecodingError> {
    if !payload.starts_with(&PNG_SIGNATURE) {
        return Ok(PayloadKind::Opaque);
    }
    let mut reader = png::Decoder::new(payload).read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    Ok(PayloadKind::Png {
        width: info.width,
        height: info.height,
    })
}

/// Counters for one receive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames: u64,
    /// Wire bytes, length prefixes included.
    pub bytes: u64,
    /// PNG payloads that failed to decode.
    pub invalid: u64,
    pub saved: u64,
}

// ── Receiver ─────────────────────────────────────────────────────

pub struct Receiver {
    config: RecvConfig,
    running: Arc<AtomicBool>,
}

impl Receiver {
    pub fn new(config: RecvConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the receiver from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Connect to the configured host and receive until the stream ends
    /// or the receiver is stopped.
    pub async fn run(&self) -> Result<ReceiverStats, BoxError> {
        let addr: SocketAddr = self.config.network.host_addr.parse()?;
        info!("connecting to host at {addr}");
        let stream =
            tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(addr)).await??;
        stream.set_nodelay(true)?;
        self.run_on(stream).await
    }

    /// Receive from an already connected stream.
    pub async fn run_on(&self, stream: TcpStream) -> Result<ReceiverStats, BoxError> {
        self.running.store(true, Ordering::SeqCst);

        let save_dir = self.config.save_dir();
        if let Some(dir) = &save_dir {
            tokio::fs::create_dir_all(dir).await?;
            info!("saving every {}th frame to {}", self.config.output.save_every, dir.display());
        }

        let mut frames = FramedRead::new(stream, WireFrameCodec);
        let mut stats = ReceiverStats::default();
        let mut meter = ThroughputMeter::new();
        let mut last_report = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let next = tokio::select! {
                next = frames.next() => next,
                _ = Self::wait_for_stop(&self.running) => break,
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!("stream error: {e}");
                    break;
                }
                None => {
                    info!("host closed the stream");
                    break;
                }
            };

            let now = Instant::now();
            stats.frames += 1;
            stats.bytes += frame.len() as u64;
            meter.record_at(now, frame.len() as u64);

            let kind = match inspect(frame.payload()) {
                Ok(kind) => kind,
                Err(e) => {
                    stats.invalid += 1;
                    warn!(frame = stats.frames, "payload failed to decode: {e}");
                    continue;
                }
            };
            trace!(frame = stats.frames, len = frame.payload_len(), ?kind, "frame received");

            if let Some(dir) = &save_dir {
                if stats.frames % self.config.output.save_every == 0 {
                    let path = dir.join(format!("frame-{:06}.{}", stats.frames, kind.extension()));
                    let payload = frame.into_bytes().slice(LEN_PREFIX_SIZE..);
                    match save(&path, payload).await {
                        Ok(()) => stats.saved += 1,
                        Err(e) => warn!("could not write {}: {e}", path.display()),
                    }
                }
            }

            if now.duration_since(last_report) >= REPORT_INTERVAL {
                info!(
                    fps = format_args!("{:.1}", meter.frames_per_sec()),
                    kib_per_sec = meter.bytes_per_sec() / 1024,
                    frames = stats.frames,
                    invalid = stats.invalid,
                    "receiving"
                );
                last_report = now;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            frames = stats.frames,
            bytes = stats.bytes,
            invalid = stats.invalid,
            saved = stats.saved,
            "receiver stopped"
        );
        Ok(stats)
    }

    /// Signal the receiver to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn save(path: &Path, payload: Bytes) -> std::io::Result<()> {
    tokio::fs::write(path, payload).await
}

// ── Tests ────────────────────────────────────────────────────────
