//! Capture host service.
//!
//! Owns the render/capture tick loop and the TCP listener. The first
//! accepted client is bound as the driver's transport; a writer task
//! drains the channel transport into the socket with [`WireFrameCodec`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use camfeed_core::transport::channel;
use camfeed_core::{
    CaptureDriver, ChannelReceiver, SoftwareSurface, TransportBinding, WireFrame,
    WireFrameCodec, WorkerReadback,
};

use crate::config::HostConfig;
use crate::renderer::PatternRenderer;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── HostService ──────────────────────────────────────────────────

/// The top-level capture host.
pub struct HostService {
    config: HostConfig,
    running: Arc<AtomicBool>,
}

impl HostService {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Bind the configured address and run until stopped.
    pub async fn run(&self) -> Result<(), BoxError> {
        let addr: SocketAddr = self.config.network.listen_addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.run_on(listener).await
    }

    /// Run on an already bound listener until stopped.
    ///
    /// 1. Starts the readback worker and the capture driver.
    /// 2. Renders a frame and ticks the driver at `render.fps`.
    /// 3. Binds the first accepted client as the transport; refuses others.
    /// 4. On stop, tears the driver down and lets the writer flush.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), BoxError> {
        self.running.store(true, Ordering::SeqCst);
        info!("camfeed host listening on {}", listener.local_addr()?);

        let renderer = Arc::new(PatternRenderer::new(self.config.render.pattern));
        let backend = WorkerReadback::spawn(Duration::ZERO)?.with_redraw({
            let renderer = Arc::clone(&renderer);
            move |surface: &SoftwareSurface| renderer.draw(surface)
        });
        let capture = self.config.to_capture_config();
        let surface = SoftwareSurface::new(capture.surface_desc());
        let mut driver = CaptureDriver::new(backend, &capture)?;
        let binding = driver.binding();

        let mut ticker = tokio::time::interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut writer: Option<JoinHandle<()>> = None;

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {
                    renderer.render_next(&surface);
                    driver.on_frame_tick(&surface, Instant::now());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Some(handle) = Self::attach(&binding, stream, peer) {
                            writer = Some(handle);
                        }
                    }
                    Err(e) => warn!("accept error: {e}"),
                },
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        // Teardown waits on in-flight readbacks and joins the readback
        // worker; keep that off the runtime threads.
        let teardown = tokio::task::spawn_blocking(move || driver.teardown());
        if let Err(e) = teardown.await {
            warn!("capture teardown failed: {e}");
        }
        if let Some(handle) = writer {
            if tokio::time::timeout(Duration::from_secs(2), handle).await.is_err() {
                warn!("frame writer did not finish in time");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(frames = renderer.frame(), "camfeed host stopped");
        Ok(())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Bind `stream` as the consumer, or close it if one is already bound.
    fn attach(
        binding: &TransportBinding,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Option<JoinHandle<()>> {
        if binding.is_bound() {
            info!("refusing {peer}: a consumer is already attached");
            return None;
        }
        let (tx, rx) = channel();
        if !binding.bind(Arc::new(tx)) {
            debug!("lost bind race for {peer}");
            return None;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }
        info!("consumer attached from {peer}");
        Some(tokio::spawn(Self::write_frames(stream, rx, peer)))
    }

    /// Forward queued frames to the socket until either side closes.
    async fn write_frames(stream: TcpStream, mut rx: ChannelReceiver, peer: SocketAddr) {
        let mut sink = FramedWrite::new(stream, WireFrameCodec);
        while let Some(pending) = rx.recv().await {
            if let Err(e) = sink.send(WireFrame::clone(&pending)).await {
                warn!("consumer {peer} write failed: {e}");
                break;
            }
            // Counts as delivered only once the socket accepted it.
            drop(pending);
        }
        info!("consumer {peer} detached");
    }

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

// ── Tests ────────────────────────────────────────────────────────
