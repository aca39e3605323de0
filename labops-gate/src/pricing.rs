//! Route pricing configuration.
//!
//! The pricing table is loaded once at startup and injected into the gate as
//! an immutable value; nothing in the process mutates it afterwards.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PricingError;

/// Price entry for one gated route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePrice {
    /// Price in base units of the token (e.g. 10_000 = 0.01 USDC)
    pub amount: u64,

    /// Token contract address the payment must be denominated in
    pub token: String,

    /// Receiving address authorizations must be made out to
    pub pay_to: String,

    /// Human-readable description carried into the 402 challenge
    #[serde(default)]
    pub description: String,
}

/// Process-wide static pricing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Network identifier carried into challenges (e.g. "base-sepolia")
    #[serde(default = "default_network")]
    pub network: String,

    /// Priced routes keyed by route identity
    #[serde(default)]
    pub routes: HashMap<String, RoutePrice>,
}

fn default_network() -> String {
    "base-sepolia".to_string()
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl PricingTable {
    /// An empty table: every route is unpriced.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            network: default_network(),
            routes: HashMap::new(),
        }
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PricingError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a table from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, PricingError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// The price entry for a route, if the route is gated.
    #[must_use]
    pub fn price_for(&self, route_key: &str) -> Option<&RoutePrice> {
        self.routes.get(route_key)
    }

    /// Pure lookup: does this route require payment?
    #[must_use]
    pub fn should_gate(&self, route_key: &str) -> bool {
        self.routes.contains_key(route_key)
    }
}
