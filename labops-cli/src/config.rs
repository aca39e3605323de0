//! TOML configuration for the labops binary.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use labops_core::TrustConfig;
use labops_gate::PricingTable;
use labops_server::ServerConfig;
use labops_telemetry::TelemetryConfig;

/// Chain client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint for payment verification. Without one, the server
    /// runs with a permissive in-memory chain (development only).
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Time budget per chain call, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Full configuration for `labops serve`. Every section has defaults, so an
/// empty file (or none at all) boots a dev server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabopsConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub pricing: PricingTable,
}

impl LabopsConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: LabopsConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 4402);
        assert_eq!(config.chain.call_timeout_ms, 5_000);
        assert!(config.pricing.routes.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config: LabopsConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [trust]
            window_secs = 10
            max_per_window = 2

            [telemetry]
            review_threshold = 50.0

            [chain]
            rpc_url = "https://sepolia.base.org"

            [pricing]
            network = "base-sepolia"

            [pricing.routes.export]
            amount = 10000
            token = "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
            pay_to = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.trust.max_per_window, 2);
        assert_eq!(config.telemetry.review_threshold, 50.0);
        assert_eq!(
            config.chain.rpc_url.as_deref(),
            Some("https://sepolia.base.org")
        );
        assert!(config.pricing.should_gate("export"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = LabopsConfig::load(Path::new("/nonexistent/labops.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labops.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = LabopsConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
    }
}
