//! # Daemon Configuration
//!
//! TOML, camelCase keys, `deny_unknown_fields` throughout: a typo in a key
//! is a startup error, not a silently-ignored setting.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Complete daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MarketConfig {
    /// Consensus-layer RPC endpoint.
    pub rpc_endpoint: String,
    /// Consensus-layer websocket endpoint.
    pub ws_endpoint: String,
    /// HTTP listen address for the gateway.
    pub listen_addr: String,
    /// Outbox journal path.
    pub outbox_path: PathBuf,
    /// Marketplace base URL for outbox delivery.
    pub marketplace_url: String,
    /// Hex seed of the provider signing key; generated (ephemeral) when
    /// empty, which is only acceptable for development.
    pub provider_key_seed_hex: String,

    /// Heartbeat classifier thresholds.
    pub stale_threshold_sec: u64,
    pub offline_threshold_sec: u64,
    pub dereg_threshold_sec: u64,

    pub scheduler_weights: WeightsSection,
    pub outbox: OutboxSection,
    pub reporter: ReporterSection,
    pub event_client: EventClientSection,

    /// Seconds every task gets to drain on shutdown.
    pub shutdown_grace_period_sec: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "http://127.0.0.1:26657".into(),
            ws_endpoint: "ws://127.0.0.1:26657/websocket".into(),
            listen_addr: "0.0.0.0:8443".into(),
            outbox_path: PathBuf::from("./data/outbox.journal"),
            marketplace_url: "http://127.0.0.1:8080".into(),
            provider_key_seed_hex: String::new(),
            stale_threshold_sec: 30,
            offline_threshold_sec: 120,
            dereg_threshold_sec: 3_600,
            scheduler_weights: WeightsSection::default(),
            outbox: OutboxSection::default(),
            reporter: ReporterSection::default(),
            event_client: EventClientSection::default(),
            shutdown_grace_period_sec: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct WeightsSection {
    pub capacity: f64,
    pub latency: f64,
    pub reliability: f64,
}

impl Default for WeightsSection {
    fn default() -> Self {
        Self {
            capacity: 0.5,
            latency: 0.2,
            reliability: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct OutboxSection {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_pct: u8,
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff_ms: 1_000,
            max_backoff_ms: 300_000,
            jitter_pct: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ReporterSection {
    pub min_period_sec: u64,
    pub max_period_sec: u64,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            min_period_sec: 60,
            max_period_sec: 3_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct EventClientSection {
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_reconnect_attempts: u32,
    pub auto_reconnect: bool,
}

impl Default for EventClientSection {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 60_000,
            max_reconnect_attempts: 0,
            auto_reconnect: true,
        }
    }
}

/// Configuration loading / validation failure. Exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {0}: {1}")]
    Unreadable(PathBuf, String),
    #[error("config parse: {0}")]
    Parse(String),
    #[error("config invalid: {0}")]
    Invalid(String),
}

impl MarketConfig {
    /// Load from a TOML file; a missing path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e.to_string()))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = gm_03_hpc_scheduler::SchedulerWeights {
            capacity: self.scheduler_weights.capacity,
            latency: self.scheduler_weights.latency,
            reliability: self.scheduler_weights.reliability,
        };
        weights.validate().map_err(ConfigError::Invalid)?;

        if !(self.stale_threshold_sec < self.offline_threshold_sec
            && self.offline_threshold_sec < self.dereg_threshold_sec)
        {
            return Err(ConfigError::Invalid(format!(
                "thresholds must be ordered stale < offline < dereg, got {} / {} / {}",
                self.stale_threshold_sec, self.offline_threshold_sec, self.dereg_threshold_sec
            )));
        }
        if self.reporter.min_period_sec == 0
            || self.reporter.min_period_sec >= self.reporter.max_period_sec
        {
            return Err(ConfigError::Invalid(
                "reporter periods must satisfy 0 < min < max".into(),
            ));
        }
        if self.outbox.max_attempts == 0 {
            return Err(ConfigError::Invalid("outbox.maxAttempts must be > 0".into()));
        }
        if self.outbox.jitter_pct > 100 {
            return Err(ConfigError::Invalid("outbox.jitterPct must be <= 100".into()));
        }
        if self.shutdown_grace_period_sec == 0 {
            return Err(ConfigError::Invalid(
                "shutdownGracePeriodSec must be > 0".into(),
            ));
        }
        if !self.provider_key_seed_hex.is_empty() {
            let bytes = hex::decode(&self.provider_key_seed_hex)
                .map_err(|e| ConfigError::Invalid(format!("providerKeySeedHex: {e}")))?;
            if bytes.len() != 32 {
                return Err(ConfigError::Invalid(
                    "providerKeySeedHex must decode to 32 bytes".into(),
                ));
            }
        }
        Ok(())
    }

    /// The provider signing key, from the configured seed or ephemeral.
    pub fn provider_keypair(&self) -> shared_crypto::Ed25519KeyPair {
        if self.provider_key_seed_hex.is_empty() {
            tracing::warn!("No provider key seed configured, using an ephemeral key");
            return shared_crypto::Ed25519KeyPair::generate();
        }
        let bytes = hex::decode(&self.provider_key_seed_hex).unwrap_or_default();
        let seed: [u8; 32] = bytes.try_into().unwrap_or([0u8; 32]);
        shared_crypto::Ed25519KeyPair::from_seed(seed)
    }
}
