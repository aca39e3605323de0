//! labops-server - HTTP surface for the event feedback ops core
//!
//! Routes feedback submission and triage, on-demand telemetry, and the
//! payment-gated retro export. Handlers are request-scoped and stateless;
//! the only state shared between requests is the store handle and the
//! immutable pricing configuration inside the gate.

mod error;
pub mod http;
pub mod middleware;
mod state;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use labops_gate::PaymentGate;

pub use error::ServerError;
pub use http::create_router;
pub use middleware::{payment_middleware, PaymentLayer, X_PAYMENT_HEADER};
pub use state::AppState;

/// Server bind configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4402
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The main labops server
pub struct LabopsServer {
    config: ServerConfig,
    state: Arc<AppState>,
    gate: Arc<PaymentGate>,
}

impl LabopsServer {
    /// Create a new server over prepared state and a configured gate.
    pub fn new(config: ServerConfig, state: Arc<AppState>, gate: Arc<PaymentGate>) -> Self {
        Self {
            config,
            state,
            gate,
        }
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, "labops server listening");

        let router = create_router(self.state, self.gate);
        axum::serve(listener, router)
            .await
            .map_err(ServerError::Serve)
    }
}
