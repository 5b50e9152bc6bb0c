//! camfeed host: entry point.
//!
//! ```text
//! camfeed-host                   Run with camfeed-host.toml (or defaults)
//! camfeed-host --config <path>   Load a custom config TOML
//! camfeed-host --listen <addr>   Override network.listen_addr
//! camfeed-host --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camfeed_host::config::HostConfig;
use camfeed_host::service::{BoxError, HostService};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camfeed-host", about = "Render a test surface and stream captured frames")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camfeed-host.toml")]
    config: PathBuf,

    /// Address to listen on, overriding the config file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = HostConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen_addr = listen;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camfeed-host v{}", env!("CARGO_PKG_VERSION"));
    info!("listen address: {}", config.network.listen_addr);
    info!(
        "surface: {}x{} {}",
        config.capture.width, config.capture.height, config.capture.format
    );
    info!("render: {} fps, {:?} pattern", config.render.fps, config.render.pattern);

    let service = HostService::new(config);
    let stop = service.stop_handle();

    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
