//! # Ledger Configuration
//!
//! Configuration for the settlement engine and its database.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKPULSE_DB_PATH=/var/lib/stockpulse/ledger.db                   │
//! │     STOCKPULSE_DISCOUNT_POLICY=clamp                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockpulse/ledger.toml (Linux)                           │
//! │     ~/Library/Application Support/com.stockpulse.ledger/ledger.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     stockpulse.db in the working directory, reject oversized discounts │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [database]
//! path = "/var/lib/stockpulse/ledger.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [settlement]
//! max_commit_attempts = 3
//! retry_base_delay_ms = 25
//! discount_policy = "reject"          # reject | clamp
//! utc_offset_minutes = 330            # business day boundary (UTC+05:30)
//! purchase_payment_mode = "BANK_TRANSFER"
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockpulse_core::{DiscountPolicy, PaymentMode, PlanningOptions};
use stockpulse_db::DbConfig;

/// Upper bound on commit attempts per settlement.
pub const MAX_COMMIT_ATTEMPTS_LIMIT: u32 = 10;

/// Widest real-world UTC offset (UTC+14:00), in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger lives and how the pool behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Milliseconds a writer waits on another writer's lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("stockpulse.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Settlement Settings
// =============================================================================

/// Settlement policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Attempts per settlement before a busy store surfaces as
    /// `CommitFailure`.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,

    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default)]
    pub discount_policy: DiscountPolicy,

    /// Offset applied to UTC when deciding which business day a document
    /// number belongs to.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Payment mode recorded for purchases that don't name one.
    #[serde(default = "default_purchase_payment_mode")]
    pub purchase_payment_mode: PaymentMode,
}

fn default_max_commit_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    25
}

fn default_purchase_payment_mode() -> PaymentMode {
    PaymentMode::BankTransfer
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            discount_policy: DiscountPolicy::default(),
            utc_offset_minutes: 0,
            purchase_payment_mode: default_purchase_payment_mode(),
        }
    }
}

impl SettlementSettings {
    /// Options handed to the pure planner.
    pub fn planning_options(&self) -> PlanningOptions {
        PlanningOptions {
            discount_policy: self.discount_policy,
            purchase_payment_mode: self.purchase_payment_mode,
        }
    }

    /// The business day `now` falls on.
    pub fn business_day(&self, now: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => now.date_naive(),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

// =============================================================================
// Ledger Config
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub settlement: SettlementSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let db = &self.database;
        if db.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if db.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if db.min_connections > db.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }

        let settlement = &self.settlement;
        if !(1..=MAX_COMMIT_ATTEMPTS_LIMIT).contains(&settlement.max_commit_attempts) {
            return Err(ConfigError::Invalid(format!(
                "settlement.max_commit_attempts must be between 1 and {}",
                MAX_COMMIT_ATTEMPTS_LIMIT
            )));
        }
        if settlement.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "settlement.utc_offset_minutes must be within ±{}",
                MAX_UTC_OFFSET_MINUTES
            )));
        }

        Ok(())
    }

    /// Applies `STOCKPULSE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STOCKPULSE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("STOCKPULSE_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring STOCKPULSE_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = lookup("STOCKPULSE_BUSY_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_ms = n,
                Err(_) => warn!(value = %ms, "Ignoring STOCKPULSE_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(attempts) = lookup("STOCKPULSE_MAX_COMMIT_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.settlement.max_commit_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring STOCKPULSE_MAX_COMMIT_ATTEMPTS"),
            }
        }

        if let Some(policy) = lookup("STOCKPULSE_DISCOUNT_POLICY") {
            match policy.to_lowercase().as_str() {
                "reject" => self.settlement.discount_policy = DiscountPolicy::Reject,
                "clamp" => self.settlement.discount_policy = DiscountPolicy::Clamp,
                _ => warn!(policy = %policy, "Unknown discount policy in environment"),
            }
        }

        if let Some(offset) = lookup("STOCKPULSE_UTC_OFFSET_MINUTES") {
            match offset.parse::<i32>() {
                Ok(n) => self.settlement.utc_offset_minutes = n,
                Err(_) => warn!(value = %offset, "Ignoring STOCKPULSE_UTC_OFFSET_MINUTES"),
            }
        }

        if let Some(mode) = lookup("STOCKPULSE_PURCHASE_PAYMENT_MODE") {
            match mode.parse::<PaymentMode>() {
                Ok(parsed) => self.settlement.purchase_payment_mode = parsed,
                Err(e) => warn!(error = %e, "Ignoring STOCKPULSE_PURCHASE_PAYMENT_MODE"),
            }
        }
    }

    /// Pool settings for `Database::new`.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.acquire_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockpulse", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }
}
