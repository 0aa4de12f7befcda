//! Client entry point - the composition root.
//!
//! Wires the cpal audio actors, the built-in adapters, and any disabled
//! stand-ins, then runs until ctrl-c. The activation key is fed from
//! stdin in this binary (`p<enter>` toggles press/release); an embedding
//! application replaces that with a real OS key hook.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncBufReadExt;

use loqui_client::app::{self, ClientPorts};
use loqui_client::bus::EventBus;
use loqui_client::input::KeyTransition;
use loqui_client::network::TcpProbe;
use loqui_client::permissions::AlwaysGranted;
use loqui_client::stubs::{DisabledRecognizer, DisabledScreenshotCapture};
use loqui_core::config::AppConfig;
use loqui_core::ports::{EventSink, TracingErrorSink};

#[derive(Parser, Debug)]
#[command(name = "loqui-client", about = "loqui voice assistant client")]
struct Args {
    /// Configuration file (defaults to <app-support>/loqui/config.yaml).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the application-support directory.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let paths = match &args.data_dir {
        Some(root) => loqui_core::paths::AppPaths::with_root(root.clone())?,
        None => loqui_core::paths::AppPaths::resolve()?,
    };
    let config_path = args.config.unwrap_or_else(|| paths.config_file());
    let config = AppConfig::load(&config_path)?;

    let (key_tx, key_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(stdin_keys(key_tx));

    let (bus, driver) = EventBus::new(Arc::new(TracingErrorSink));

    let sink: Arc<dyn EventSink> = Arc::new(bus.clone());
    let (capture, playback) = app::default_audio(&config, Some(sink))?;

    let ports = ClientPorts {
        capture,
        playback,
        recognizer: Arc::new(DisabledRecognizer),
        screenshot: Arc::new(DisabledScreenshotCapture),
        network_probe: Arc::new(TcpProbe::new(
            &config.integrations.grpc_client.server,
            Duration::from_secs(2),
        )),
        hardware_id: Arc::new(loqui_client::hardware::GeneratedHardwareId),
        permissions: Arc::new(AlwaysGranted),
    };

    app::run(config, paths, bus, driver, ports, key_rx, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    Ok(())
}

/// Development key source: each `p` line toggles the activation key.
async fn stdin_keys(tx: tokio::sync::mpsc::UnboundedSender<KeyTransition>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut held = false;
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == "p" {
            held = !held;
            let transition = if held {
                KeyTransition::Down
            } else {
                KeyTransition::Up
            };
            if tx.send(transition).is_err() {
                break;
            }
        }
    }
}
