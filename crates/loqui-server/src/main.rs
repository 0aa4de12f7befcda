//! Server entry point - the composition root.
//!
//! Wires the SQLite memory store, the interrupt registry, the streaming
//! workflow, and the gRPC endpoint. The text and TTS ports get the
//! built-in development providers unless an embedding deployment swaps
//! them out.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use loqui_core::config::AppConfig;
use loqui_server::interrupt::InterruptRegistry;
use loqui_server::memory::MemoryCoordinator;
use loqui_server::orchestrator::RequestOrchestrator;
use loqui_server::providers::{EchoTextProvider, RollingMemoryAnalyser, SilenceSynthesizer};
use loqui_server::service::AssistantService;
use loqui_server::store::SqliteMemoryStore;
use loqui_server::workflow::StreamingWorkflow;

#[derive(Parser, Debug)]
#[command(name = "loqui-server", about = "loqui voice assistant server")]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:50051")]
    listen: SocketAddr,

    /// Configuration file (defaults to <app-support>/loqui/config.yaml).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// SQLite database for memory records.
    #[arg(long)]
    db: Option<std::path::PathBuf>,
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

    let paths = loqui_core::paths::AppPaths::resolve()?;
    let config_path = args.config.unwrap_or_else(|| paths.config_file());
    let config = AppConfig::load(&config_path)?;

    let db_path = args.db.unwrap_or_else(|| paths.root().join("memory.db"));
    let store = Arc::new(
        SqliteMemoryStore::open(&db_path)
            .await
            .map_err(|e| anyhow::anyhow!("opening memory store: {e}"))?,
    );

    let (memory, writer) = MemoryCoordinator::new(
        store,
        Arc::new(RollingMemoryAnalyser),
        config.memory.read_budget(),
    );
    tokio::spawn(writer.run());

    let workflow = Arc::new(StreamingWorkflow::new(
        Arc::new(EchoTextProvider),
        Arc::new(SilenceSynthesizer::default()),
        config.stream.clone(),
    ));
    let interrupts = Arc::new(InterruptRegistry::new(config.interrupt.mark_ttl()));

    // Expired marks read as absent either way; the sweep just keeps the
    // map from accumulating dead entries.
    let sweeper = Arc::clone(&interrupts);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });

    let orchestrator = Arc::new(RequestOrchestrator::new(workflow, memory, interrupts));

    tracing::info!(listen = %args.listen, db = %db_path.display(), "server starting");

    tonic::transport::Server::builder()
        .add_service(AssistantService::new(orchestrator).into_server())
        .serve_with_shutdown(args.listen, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}
