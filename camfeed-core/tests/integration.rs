//! Integration tests: the capture driver against the worker backend, the
//! channel transport, and a real TCP stream on localhost.

use std::sync::Arc;
use std::time::{Duration, Instant};

use camfeed_core::transport::channel;
use camfeed_core::{
    CaptureConfig, CaptureDriver, CaptureMode, PayloadCodec, PixelFormat, SoftwareSurface,
    SurfaceDesc, TickOutcome, Transport, WireFrame, WireFrameCodec, WorkerReadback,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

// ── Helpers ──────────────────────────────────────────────────────

const DESC: SurfaceDesc = SurfaceDesc::new(16, 8, PixelFormat::Argb32);

fn config(mode: CaptureMode, codec: PayloadCodec) -> CaptureConfig {
    CaptureConfig {
        width: DESC.width,
        height: DESC.height,
        format: DESC.format,
        mode,
        codec,
        ..CaptureConfig::default()
    }
}

/// Fill every ARGB pixel with an opaque grey of level `v`.
fn paint(surface: &SoftwareSurface, v: u8) {
    surface.draw(|px| {
        for p in px.chunks_exact_mut(4) {
            p.copy_from_slice(&[0xFF, v, v, v]);
        }
    });
}

/// Wait (really) until the worker has settled every outstanding request.
fn settle(driver: &CaptureDriver<WorkerReadback>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while driver.pipeline().is_some_and(|p| p.pending_count() > 0) {
        assert!(Instant::now() < deadline, "readback never settled");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn decode_png(payload: &[u8]) -> (png::OutputInfo, Vec<u8>) {
    let decoder = png::Decoder::new(payload);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    buf.truncate(info.buffer_size());
    (info, buf)
}

// ── Driver + worker + channel ────────────────────────────────────

#[test]
fn test_async_stream_lags_one_capture() {
    let backend = WorkerReadback::spawn(Duration::ZERO).unwrap();
    let mut driver = CaptureDriver::new(backend, &config(CaptureMode::Async, PayloadCodec::Png)).unwrap();
    let (tx, mut rx) = channel();
    assert!(driver.bind(Arc::new(tx)));

    let surface = SoftwareSurface::new(DESC);
    let t0 = Instant::now();
    let mut levels = Vec::new();

    for i in 0..6u64 {
        let level = (i as u8 + 1) * 20;
        paint(&surface, level);
        let outcome = driver.on_frame_tick(&surface, t0 + Duration::from_millis(i * 40));
        settle(&driver);

        if let Some(frame) = rx.try_recv() {
            let (info, rgba) = decode_png(frame.payload());
            assert_eq!((info.width, info.height), (DESC.width, DESC.height));
            assert!(matches!(outcome, TickOutcome::Sent { .. }));
            levels.push(rgba[0]);
        } else {
            assert_eq!(outcome, TickOutcome::Warming);
        }
    }

    // Every frame carries the content of the previous capture.
    assert_eq!(levels, vec![20, 40, 60, 80, 100]);
    driver.teardown();
}

#[test]
fn test_undelivered_frames_apply_backpressure() {
    let backend = WorkerReadback::spawn(Duration::ZERO).unwrap();
    let mut driver = CaptureDriver::new(backend, &config(CaptureMode::Sync, PayloadCodec::Zstd)).unwrap();
    let (tx, mut rx) = channel();
    let depth_view = tx.clone();
    driver.bind(Arc::new(tx));

    let surface = SoftwareSurface::new(DESC);
    let t0 = Instant::now();
    let tick = |n: u64| t0 + Duration::from_millis(n * 40);

    assert!(matches!(driver.on_frame_tick(&surface, tick(0)), TickOutcome::Sent { .. }));
    assert!(matches!(driver.on_frame_tick(&surface, tick(1)), TickOutcome::Sent { .. }));
    assert_eq!(depth_view.queue_depth(), 2);
    assert_eq!(driver.on_frame_tick(&surface, tick(2)), TickOutcome::Backpressure);

    // Delivering one frame brings the depth back to the threshold.
    drop(rx.try_recv().unwrap());
    assert_eq!(depth_view.queue_depth(), 1);
    assert!(matches!(driver.on_frame_tick(&surface, tick(3)), TickOutcome::Sent { .. }));
    assert_eq!(driver.stats().backpressured, 1);
}

#[test]
fn test_auto_mode_without_async_support_captures_current_frame() {
    let backend = WorkerReadback::spawn(Duration::ZERO).unwrap().without_async();
    let mut driver = CaptureDriver::new(backend, &config(CaptureMode::Auto, PayloadCodec::Png)).unwrap();
    let (tx, mut rx) = channel();
    driver.bind(Arc::new(tx));

    let surface = SoftwareSurface::new(DESC);
    paint(&surface, 0x42);
    driver.on_frame_tick(&surface, Instant::now());

    let frame = rx.try_recv().unwrap();
    let (_, rgba) = decode_png(frame.payload());
    assert_eq!(&rgba[..4], &[0x42, 0x42, 0x42, 0xFF]);
}

#[test]
fn test_teardown_waits_for_inflight_readback() {
    let latency = Duration::from_millis(50);
    let backend = WorkerReadback::spawn(latency).unwrap();
    let mut driver = CaptureDriver::new(backend, &config(CaptureMode::Async, PayloadCodec::Png)).unwrap();
    let (tx, _rx) = channel();
    driver.bind(Arc::new(tx));

    let surface = SoftwareSurface::new(DESC);
    let started = Instant::now();
    assert_eq!(driver.on_frame_tick(&surface, started), TickOutcome::Warming);
    assert_eq!(driver.pipeline().unwrap().pending_count(), 1);

    driver.teardown();
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(driver.pipeline().is_none());
    assert_eq!(driver.on_frame_tick(&surface, Instant::now()), TickOutcome::Unbound);
}

// ── Wire over TCP ────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_survive_tcp_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let reader = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = FramedRead::new(stream, WireFrameCodec);
        let mut got = Vec::new();
        while let Some(frame) = framed.next().await {
            got.push(frame.unwrap());
        }
        got
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut sink = FramedWrite::new(stream, WireFrameCodec);
    let payloads: [&[u8]; 3] = [b"first", &[0xAB; 300], b""];
    for p in payloads {
        sink.send(WireFrame::from_payload(p).unwrap()).await.unwrap();
    }
    drop(sink);

    let got = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(got.len(), 3);
    for (frame, expected) in got.iter().zip(payloads) {
        assert_eq!(frame.payload(), expected);
    }
}

#[tokio::test]
async fn test_captured_png_streams_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Capture on a blocking thread, then ship what the channel produced.
    let frames = tokio::task::spawn_blocking(|| {
        let backend = WorkerReadback::spawn(Duration::ZERO).unwrap();
        let mut driver =
            CaptureDriver::new(backend, &config(CaptureMode::Sync, PayloadCodec::Png)).unwrap();
        let (tx, mut rx) = channel();
        driver.bind(Arc::new(tx));

        let surface = SoftwareSurface::new(DESC);
        paint(&surface, 0x80);
        driver.on_frame_tick(&surface, Instant::now());
        driver.teardown();

        let mut out = Vec::new();
        while let Some(pending) = rx.try_recv() {
            out.push(WireFrame::clone(&pending));
        }
        out
    })
    .await
    .unwrap();
    assert_eq!(frames.len(), 1);

    let client = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut sink = FramedWrite::new(stream, WireFrameCodec);
        for f in frames {
            sink.send(f).await.unwrap();
        }
    });

    let (stream, _) = listener.accept().await.unwrap();
    let mut framed = FramedRead::new(stream, WireFrameCodec);
    let frame = framed.next().await.unwrap().unwrap();
    client.await.unwrap();

    let (info, rgba) = decode_png(frame.payload());
    assert_eq!((info.width, info.height), (16, 8));
    assert!(rgba.chunks_exact(4).all(|p| p == [0x80, 0x80, 0x80, 0xFF]));
}
