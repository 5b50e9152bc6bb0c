//! camfeed receiver: entry point.
//!
//! ```text
//! camfeed-recv                   Run with camfeed-recv.toml (or defaults)
//! camfeed-recv --config <path>   Load a custom config TOML
//! camfeed-recv --host <addr>     Override network.host_addr
//! camfeed-recv --out <dir>       Override output.dir
//! camfeed-recv --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camfeed_recv::config::RecvConfig;
use camfeed_recv::receiver::{BoxError, Receiver};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camfeed-recv", about = "Receive and check a camfeed capture stream")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camfeed-recv.toml")]
    config: PathBuf,

    /// Host address, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Directory to save sampled payloads into.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RecvConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = RecvConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host_addr = host;
    }
    if let Some(out) = cli.out {
        config.output.dir = out.to_string_lossy().into_owned();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camfeed-recv v{}", env!("CARGO_PKG_VERSION"));

    let receiver = Receiver::new(config);
    let stop = receiver.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let stats = receiver.run().await?;
    info!("received {} frames ({} bytes)", stats.frames, stats.bytes);

    Ok(())
}
