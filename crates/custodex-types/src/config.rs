//! Configuration types for a Custodex node.
//!
//! Every section has defaults from [`crate::constants`], so a config file
//! only needs to name what it overrides:
//!
//! ```toml
//! [withdraw]
//! interval_ms = 5000
//! passphrase = "hot wallet passphrase"
//!
//! [logging]
//! filter = "custodex=debug"
//! json = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CustodexError, Result, constants};

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub deposit: DepositConfig,
    pub withdraw: WithdrawConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl ExchangeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CustodexError::Configuration(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// Deposit scanning and confirmation sweep timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositConfig {
    pub scan_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub jitter_ms: u64,
}

impl DepositConfig {
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: constants::DEFAULT_SCAN_INTERVAL_MS,
            sweep_interval_ms: constants::DEFAULT_SWEEP_INTERVAL_MS,
            jitter_ms: constants::DEFAULT_JITTER_MS,
        }
    }
}

/// Withdrawal dispatch and recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawConfig {
    pub interval_ms: u64,
    pub recovery_interval_ms: u64,
    pub jitter_ms: u64,
    pub processing_timeout_secs: u64,
    pub unknown_outcome_timeout_secs: u64,
    /// Fixed passphrase mixed with wallet entropy for key derivation.
    pub passphrase: String,
}

impl WithdrawConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    #[must_use]
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    #[must_use]
    pub fn unknown_outcome_timeout(&self) -> Duration {
        Duration::from_secs(self.unknown_outcome_timeout_secs)
    }
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::DEFAULT_WITHDRAW_INTERVAL_MS,
            recovery_interval_ms: constants::DEFAULT_RECOVERY_INTERVAL_MS,
            jitter_ms: constants::DEFAULT_JITTER_MS,
            processing_timeout_secs: constants::DEFAULT_PROCESSING_TIMEOUT_SECS,
            unknown_outcome_timeout_secs: constants::DEFAULT_UNKNOWN_OUTCOME_TIMEOUT_SECS,
            passphrase: String::new(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Withdrawal security codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub code_ttl_secs: u64,
}

impl SecurityConfig {
    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: constants::DEFAULT_SECURITY_CODE_TTL_SECS,
        }
    }
}
