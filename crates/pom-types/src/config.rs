//! Configuration for the settlement engine.
//!
//! Every struct has a `Default` backed by [`crate::constants`]. A full
//! [`SettlementConfig`] can be loaded from JSON or from `POM_*` environment
//! variables; both paths finish with [`SettlementConfig::validate`].

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, FailureKind, PomError, Result, constants};

/// Exponential backoff policy: `base × multiplier^attempt`, capped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(constants::DEFAULT_RETRY_BASE_DELAY_MS),
            multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(constants::DEFAULT_RETRY_MAX_DELAY_MS),
            max_attempts: constants::DEFAULT_TIMEOUT_MAX_ATTEMPTS,
        }
    }
}

/// Per-kind retry policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub ledger_timeout: RetryPolicy,
    pub conversion_path: RetryPolicy,
    pub slippage: RetryPolicy,
}

impl RetryConfig {
    /// Policy for a retryable kind; `None` for kinds that are never retried.
    #[must_use]
    pub fn policy_for(&self, kind: FailureKind) -> Option<&RetryPolicy> {
        match kind {
            FailureKind::LedgerTimeout => Some(&self.ledger_timeout),
            FailureKind::ConversionPathNotFound => Some(&self.conversion_path),
            FailureKind::SlippageExceeded => Some(&self.slippage),
            _ => None,
        }
    }

    /// Same attempts, but with `base` as base delay and cap. Useful where
    /// wall-clock backoff is unwanted.
    #[must_use]
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        for p in [&mut self.ledger_timeout, &mut self.conversion_path, &mut self.slippage] {
            p.base_delay = base;
            p.max_delay = base;
        }
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ledger_timeout: RetryPolicy::with_attempts(constants::DEFAULT_TIMEOUT_MAX_ATTEMPTS),
            conversion_path: RetryPolicy::with_attempts(constants::DEFAULT_CONVERSION_MAX_ATTEMPTS),
            slippage: RetryPolicy::with_attempts(constants::DEFAULT_SLIPPAGE_MAX_ATTEMPTS),
        }
    }
}

/// Optional currency conversion for assets the treasury does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub enabled: bool,
    /// Maximum slippage in percent (e.g. `1` = 1%).
    pub max_slippage_percent: Decimal,
    /// Asset the treasury spends when converting.
    pub source_asset: Asset,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_slippage_percent: Decimal::from(constants::DEFAULT_MAX_SLIPPAGE_PERCENT),
            source_asset: Asset::native(),
        }
    }
}

/// Top-level settlement engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub network_passphrase: String,
    /// Timeout applied to every settlement-ledger call.
    pub ledger_timeout: Duration,
    pub record_cache_size: usize,
    pub retry: RetryConfig,
    pub conversion: ConversionConfig,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            network_passphrase: constants::DEFAULT_NETWORK_PASSPHRASE.to_string(),
            ledger_timeout: Duration::from_millis(constants::DEFAULT_LEDGER_TIMEOUT_MS),
            record_cache_size: constants::SETTLEMENT_RECORD_CACHE_SIZE,
            retry: RetryConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

impl SettlementConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load overrides from `POM_*` environment variables on top of the
    /// defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], with an injectable variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("POM_NETWORK_PASSPHRASE") {
            cfg.network_passphrase = v;
        }
        if let Some(v) = lookup("POM_LEDGER_TIMEOUT_MS") {
            cfg.ledger_timeout = Duration::from_millis(parse_var("POM_LEDGER_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("POM_MAX_SLIPPAGE_PERCENT") {
            cfg.conversion.max_slippage_percent = parse_var("POM_MAX_SLIPPAGE_PERCENT", &v)?;
        }
        if let Some(v) = lookup("POM_ENABLE_CONVERSION") {
            cfg.conversion.enabled = parse_var("POM_ENABLE_CONVERSION", &v)?;
        }
        if let Some(v) = lookup("POM_RETRY_MAX_ATTEMPTS") {
            cfg.retry.ledger_timeout.max_attempts = parse_var("POM_RETRY_MAX_ATTEMPTS", &v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would disable a safety property.
    pub fn validate(&self) -> Result<()> {
        if self.conversion.max_slippage_percent.is_sign_negative() {
            return Err(PomError::Configuration(
                "max_slippage_percent must be >= 0".into(),
            ));
        }
        if self.record_cache_size == 0 {
            return Err(PomError::Configuration("record_cache_size must be > 0".into()));
        }
        if self.ledger_timeout.is_zero() {
            return Err(PomError::Configuration("ledger_timeout must be > 0".into()));
        }
        for (name, p) in [
            ("ledger_timeout", &self.retry.ledger_timeout),
            ("conversion_path", &self.retry.conversion_path),
            ("slippage", &self.retry.slippage),
        ] {
            if p.max_attempts == 0 {
                return Err(PomError::Configuration(format!(
                    "retry.{name}.max_attempts must be > 0"
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PomError::Configuration(format!("{key}={value:?}: {e}")))
}
