//! Binary entry point. Loads configuration, constructs the external
//! collaborators this core depends on (`Store`, `Detector`,
//! `NotificationSink` implementations are out of scope for this crate —
//! this binary wires in-memory test doubles since no production backend
//! ships with the core crate), assembles a [`Pipeline`], registers
//! configured cameras, and serves the HTTP/WS surface: load config, spawn
//! subsystems, await.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nexguard_core::http::{router, AppState};
use nexguard_core::media::transcode::FfmpegTranscoder;
use nexguard_core::media::MediaState;
use nexguard_core::testing::{FixedDetector, InMemoryStore, RecordingNotificationSink};
use nexguard_core::NexGuardConfig;
use nexguard_core::Pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "nexguard.toml")]
    config: String,

    /// Overrides `server.bind_ip` from the config file.
    #[arg(long)]
    bind_ip: Option<String>,

    /// Overrides `server.web_port` from the config file.
    #[arg(long)]
    web_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CliArgs::parse();
    info!(?args, "starting nexguard-core");

    let mut config = match NexGuardConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %args.config, error = %e, "failed to load config file, using defaults");
            NexGuardConfig::default()
        }
    };
    if let Some(bind_ip) = args.bind_ip {
        config.server.bind_ip = bind_ip;
    }
    if let Some(web_port) = args.web_port {
        config.server.web_port = web_port;
    }

    std::fs::create_dir_all(&config.storage.storage_dir)?;

    let store = Arc::new(InMemoryStore::with_cameras(config.cameras.clone()));
    let detector = Arc::new(FixedDetector::new(Vec::new()));
    let notification_sink = Arc::new(RecordingNotificationSink::default());

    let loader = Arc::new(|_path: &std::path::Path| -> anyhow::Result<Arc<dyn nexguard_core::traits::Detector>> {
        Ok(Arc::new(FixedDetector::new(Vec::new())))
    });

    let pipeline = Arc::new(Pipeline::new(
        &config,
        store.clone(),
        detector,
        loader,
        Some(notification_sink),
    ));
    pipeline.load_cameras(&config.cameras);
    pipeline.start_all()?;

    let media_state = MediaState {
        store,
        transcoder: Some(Arc::new(FfmpegTranscoder)),
        storage_dir: std::path::PathBuf::from(&config.storage.storage_dir),
    };
    let app = router(AppState {
        pipeline: Arc::clone(&pipeline),
        media: media_state,
    });

    let addr = format!("{}:{}", config.server.bind_ip, config.server.web_port);
    info!(addr = %addr, "serving http/ws surface");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    pipeline.stop_all();
    Ok(())
}
