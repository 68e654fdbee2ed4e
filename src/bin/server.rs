#![forbid(unsafe_code)]

//! HTTP API and static frontend for YouTube ALL DOWNLOADER.
//!
//! Open the printed address in a browser. yt-dlp is refreshed once before the
//! listener starts unless `--skip-update` is passed.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use ytall_tools::config::{RuntimeConfig, RuntimeOverrides, resolve_runtime_config};
use ytall_tools::server::{AppState, router, shutdown_signal};
use ytall_tools::{APP_NAME, APP_VERSION, logging};

#[derive(Debug, Parser)]
#[command(name = "server", version, about = "Serve the ytall HTTP API and frontend")]
struct ServerArgs {
    /// Listen address (overrides YTALL_HOST)
    #[arg(long)]
    host: Option<String>,
    /// Listen port (overrides YTALL_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Root folder for downloads (overrides DOWNLOADS_DIR)
    #[arg(long)]
    downloads_dir: Option<PathBuf>,
    /// Static frontend folder (overrides FRONTEND_DIR)
    #[arg(long)]
    frontend_dir: Option<PathBuf>,
    /// Where a runtime-configured API key is stored
    #[arg(long)]
    settings_file: Option<PathBuf>,
    /// yt-dlp executable (overrides YTDLP_BIN)
    #[arg(long)]
    ytdlp_bin: Option<PathBuf>,
    /// YouTube Data API key (overrides YOUTUBE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
    /// Alternate .env file
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Do not run `yt-dlp -U` on startup
    #[arg(long)]
    skip_update: bool,
}

impl ServerArgs {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            downloads_dir: self.downloads_dir.clone(),
            frontend_dir: self.frontend_dir.clone(),
            settings_file: self.settings_file.clone(),
            host: self.host.clone(),
            port: self.port,
            api_key: self.api_key.clone(),
            ytdlp_bin: self.ytdlp_bin.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

fn listen_addr(config: &RuntimeConfig) -> Result<SocketAddr> {
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("expected an IPv4 or IPv6 address, got {}", config.host))?;
    Ok(SocketAddr::new(host, config.port))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    logging::init("info");

    let config = resolve_runtime_config(args.overrides())?;
    let addr = listen_addr(&config)?;
    info!("{APP_NAME} v{APP_VERSION}");

    let state = AppState::from_config(&config);
    if args.skip_update {
        info!("Skipping yt-dlp update");
    } else {
        let outcome = state.updater().check_and_update().await;
        if outcome.success {
            info!("{}", outcome.message);
        } else {
            warn!("yt-dlp update failed, continuing: {}", outcome.message);
        }
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("Server running on http://{addr}");
    info!("Downloads directory: {}", config.downloads_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}
