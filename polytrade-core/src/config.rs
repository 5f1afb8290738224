//! # Per-venue worker configuration
//!
//! One [`WorkerConfig`] is supplied to each worker at `start`. Unknown TOML
//! keys are ignored rather than rejected (`#[serde(default)]` throughout,
//! never `deny_unknown_fields`) since config schemas evolve per venue.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reconnect backoff knobs for a worker's sockets. Defaults match the
/// reconnecting transport's own defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            connection_timeout_ms: 5_000,
            backoff_factor: 2.0,
        }
    }
}

/// Signing material for a venue. Never logged or serialized in `Debug`
/// output beyond the variant name.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum VenueCredentials {
    /// HMAC-SHA256 query/body signing (centralized derivatives venues).
    Hmac { api_key: String, api_secret: String },
    /// EVM wallet signing (EIP-712 CLOB auth, on-chain perps/aggregators).
    EvmWallet { private_key: String },
    /// Derived L2 API key used by CLOB venues after an initial EIP-712 auth.
    ClobApiKey {
        api_key: String,
        secret: String,
        passphrase: String,
    },
    /// No credentials configured; public-only worker.
    None,
}

impl std::fmt::Debug for VenueCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            VenueCredentials::Hmac { .. } => "Hmac",
            VenueCredentials::EvmWallet { .. } => "EvmWallet",
            VenueCredentials::ClobApiKey { .. } => "ClobApiKey",
            VenueCredentials::None => "None",
        };
        f.debug_tuple("VenueCredentials").field(&kind).finish()
    }
}

impl Default for VenueCredentials {
    fn default() -> Self {
        VenueCredentials::None
    }
}

/// Per-venue configuration, recognized at `start` under
/// `{ <venue>: { options: { ... } } }` in the outer command envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Price tick size per symbol (smallest allowed price increment).
    pub tick_size: HashMap<String, f64>,
    /// Minimum order size per symbol.
    pub min_size: HashMap<String, f64>,
    /// Orders per second this venue allows per account.
    pub rate_limit: u32,
    /// Rate-limit weight consumed per submission.
    pub consume: u32,
    /// Max orders batched into a single submission request.
    pub max_orders_per_batch: usize,
    pub reconnect: ReconnectConfig,
    pub credentials: VenueCredentials,
    /// Operator/router address for on-chain venues (DEX aggregator, DEX perp).
    pub operator_address: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_size: HashMap::new(),
            min_size: HashMap::new(),
            rate_limit: 5,
            consume: 1,
            max_orders_per_batch: 10,
            reconnect: ReconnectConfig::default(),
            credentials: VenueCredentials::None,
            operator_address: None,
        }
    }
}

impl WorkerConfig {
    /// Parse a worker config from a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored_not_rejected() {
        let toml = r#"
            rate_limit = 10
            consume = 2
            totally_unrecognized_future_key = true
        "#;
        let cfg = WorkerConfig::from_toml(toml).expect("parses despite unknown key");
        assert_eq!(cfg.rate_limit, 10);
        assert_eq!(cfg.consume, 2);
        assert_eq!(cfg.max_orders_per_batch, 10); // default preserved
    }

    #[test]
    fn defaults_match_documented_rate_limit() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.rate_limit, 5);
        assert_eq!(cfg.consume, 1);
        assert_eq!(cfg.reconnect.retry_delay_ms, 1_000);
        assert_eq!(cfg.reconnect.max_retry_delay_ms, 30_000);
        assert_eq!(cfg.reconnect.backoff_factor, 2.0);
    }
}
