//! Client configuration, loaded from JSON or environment variables.

use std::str::FromStr;
use std::time::Duration;

use chain_sol::address_to_bytes;
use serde::{Deserialize, Serialize};

use crate::error::{QfError, Result};

/// How settled a transaction must be before it counts as confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl FromStr for Commitment {
    type Err = QfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(QfError::Config(format!("invalid commitment: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Base58 id of the deployed quadratic-funding program.
    pub program_id: String,
    #[serde(default)]
    pub commitment: Commitment,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single HTTP round-trip.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "http://localhost:8899".to_string()
}

fn default_confirm_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Read `QF_RPC_URL`, `QF_PROGRAM_ID`, `QF_COMMITMENT`,
    /// `QF_CONFIRM_TIMEOUT_SECS`, `QF_POLL_INTERVAL_MS` and
    /// `QF_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = ClientConfig {
            rpc_url: lookup("QF_RPC_URL").unwrap_or_else(default_rpc_url),
            program_id: lookup("QF_PROGRAM_ID").ok_or_else(|| {
                QfError::Config("QF_PROGRAM_ID environment variable is required".to_string())
            })?,
            commitment: match lookup("QF_COMMITMENT") {
                Some(value) => value.parse()?,
                None => Commitment::default(),
            },
            confirm_timeout_secs: parse_or(
                &lookup,
                "QF_CONFIRM_TIMEOUT_SECS",
                default_confirm_timeout_secs(),
            )?,
            poll_interval_ms: parse_or(&lookup, "QF_POLL_INTERVAL_MS", default_poll_interval_ms())?,
            request_timeout_secs: parse_or(
                &lookup,
                "QF_REQUEST_TIMEOUT_SECS",
                default_request_timeout_secs(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| QfError::Config(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.program_id()?;
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(QfError::Config(format!("invalid rpc url: {}", self.rpc_url)));
        }
        if self.confirm_timeout_secs == 0 {
            return Err(QfError::Config("confirm timeout must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(QfError::Config("poll interval must be > 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(QfError::Config("request timeout must be > 0".into()));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Result<[u8; 32]> {
        address_to_bytes(&self.program_id)
            .map_err(|e| QfError::Config(format!("invalid program id: {e}")))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|_| QfError::Config(format!("invalid {key}: {value}"))),
        None => Ok(default),
    }
}
