//! The `labops serve` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use labops_core::{EventLab, LabStatus, LibsqlSignalStore, MemorySignalStore, SignalStore};
use labops_gate::{MockTokenChain, PaymentGate, RpcTokenChain, TokenChain};
use labops_server::{AppState, LabopsServer};

use crate::config::LabopsConfig;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to a labops.toml config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Persist to a local libSQL database file instead of memory
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Seed a demo lab on startup (development)
    #[arg(long)]
    pub seed_demo: bool,
}

/// Run the server until interrupted.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => LabopsConfig::load(path)?,
        None => LabopsConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store: Arc<dyn SignalStore> = match &args.db {
        Some(path) => {
            info!(path = %path.display(), "using libSQL store");
            Arc::new(LibsqlSignalStore::new_local(path).await?)
        }
        None => {
            info!("using in-memory store");
            Arc::new(MemorySignalStore::new())
        }
    };

    if args.seed_demo {
        seed_demo_lab(store.as_ref()).await;
    }

    let chain: Arc<dyn TokenChain> = match &config.chain.rpc_url {
        Some(url) => {
            info!(%url, "payment verification against chain RPC");
            Arc::new(RpcTokenChain::new(
                url.clone(),
                Duration::from_millis(config.chain.call_timeout_ms),
            ))
        }
        None => {
            warn!("no chain RPC configured; payment verification is mocked (dev only)");
            Arc::new(MockTokenChain::accepting())
        }
    };

    let state = Arc::new(AppState::new(
        store,
        config.trust.clone(),
        config.telemetry.clone(),
    ));
    let gate = Arc::new(PaymentGate::new(config.pricing.clone(), chain));

    LabopsServer::new(config.server.clone(), state, gate)
        .run()
        .await?;
    Ok(())
}

async fn seed_demo_lab(store: &dyn SignalStore) {
    let lab = EventLab::new("demo-event", "Demo Event")
        .with_objective("find rough edges before launch")
        .with_surfaces(vec!["checkout".to_string(), "search".to_string()])
        .with_status(LabStatus::Active);
    match store.insert_lab(lab).await {
        Ok(lab) => info!(slug = %lab.slug, "seeded demo lab"),
        Err(err) => warn!(error = %err, "demo lab already present or seeding failed"),
    }
}
