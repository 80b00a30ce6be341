// 7.0 config.rs: all settings in one place. fees, payouts, stake limits, sweep cadence.
// 7.1 LedgerConfig has a single taker fee. no maker/taker split in a simulated book.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::types::{Leverage, Quote};

/// Spot and margin bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    // Cash the account is seeded with on first open
    pub initial_balance: Quote,
    // Taker fee applied to buy/sell/open/close (0.001 = 0.1%)
    pub fee_rate: Decimal,
    // Highest leverage open_position accepts
    pub max_leverage: Leverage,
    // Store key the ledger snapshot (account and bet book together) lives under
    pub snapshot_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: Quote::new(dec!(10000)),
            fee_rate: dec!(0.001),
            max_leverage: Leverage::new(dec!(20)).unwrap_or_else(Leverage::one),
            snapshot_key: "ledger".to_string(),
        }
    }
}

/** 7.2: margin position monitor. mark-to-market cadence and quote freshness. */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    // How often the host scheduler runs a monitor cycle
    pub interval_ms: u64,
    // Quotes older than this are treated as unavailable
    pub max_quote_age_ms: u64,
    // Close positions whose loss has eaten the whole margin
    pub liquidate_on_margin_exhaustion: bool,
    // Consecutive transient failures tolerated before a degraded warning
    pub max_transient_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_quote_age_ms: 60_000,
            liquidate_on_margin_exhaustion: true,
            max_transient_failures: 5,
        }
    }
}

/// What a bet resolves to when the exit price equals the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawPolicy {
    /// Stake is returned, status becomes `expired`.
    Refund,
    /// Stake is kept, status becomes `lost`.
    Lose,
    /// Paid out like a win.
    Win,
}

impl FromStr for DrawPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refund" => Ok(DrawPolicy::Refund),
            "lose" | "loss" => Ok(DrawPolicy::Lose),
            "win" => Ok(DrawPolicy::Win),
            other => Err(format!("unknown draw policy '{}'", other)),
        }
    }
}

/** 7.3: fixed-time bets. payout, stake floor, draw handling. */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    // Fractional bonus on a winning bet (0.85 = stake * 1.85 paid back)
    pub payout_rate: Decimal,
    // Smallest stake place_bet accepts
    pub min_stake: Quote,
    pub draw_policy: DrawPolicy,
    // Accepted bet durations in seconds. empty means any positive duration
    pub allowed_durations: Vec<u64>,
    // How often the host scheduler sweeps for expired bets
    pub sweep_interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            payout_rate: dec!(0.85),
            min_stake: Quote::new(dec!(100)),
            draw_policy: DrawPolicy::Lose,
            allowed_durations: Vec::new(),
            sweep_interval_ms: 1_000,
        }
    }
}

/// Standard fixed-time grid: 30s, 1m, 5m, 15m, 30m, 1h.
pub const STANDARD_DURATIONS: [u64; 6] = [30, 60, 300, 900, 1800, 3600];

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub monitor: MonitorConfig,
    pub settlement: SettlementConfig,
}

impl EngineConfig {
    /// Defaults used by the demo site.
    pub fn demo() -> Self {
        Self::default()
    }

    /// Fresh quotes only and the standard duration grid.
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.monitor.max_quote_age_ms = 10_000;
        config.monitor.max_transient_failures = 3;
        config.settlement.allowed_durations = STANDARD_DURATIONS.to_vec();
        config
    }

    /// Layer `TRADESIM_*` environment variables over the defaults.
    ///
    /// Unparseable values are logged and skipped rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = match env::var("TRADESIM_PROFILE").ok().as_deref() {
            Some("strict") => Environment::Strict.config(),
            _ => Environment::Demo.config(),
        };

        if let Some(v) = parse_env::<Decimal>("TRADESIM_INITIAL_BALANCE") {
            config.ledger.initial_balance = Quote::new(v);
        }
        if let Some(v) = parse_env::<Decimal>("TRADESIM_FEE_RATE") {
            config.ledger.fee_rate = v;
        }
        if let Some(v) = parse_env::<Decimal>("TRADESIM_MAX_LEVERAGE") {
            match Leverage::new(v) {
                Some(lev) => config.ledger.max_leverage = lev,
                None => warn!(value = %v, "Ignoring TRADESIM_MAX_LEVERAGE below 1"),
            }
        }
        if let Some(v) = parse_env::<u64>("TRADESIM_MONITOR_INTERVAL_MS") {
            config.monitor.interval_ms = v;
        }
        if let Some(v) = parse_env::<u64>("TRADESIM_MAX_QUOTE_AGE_MS") {
            config.monitor.max_quote_age_ms = v;
        }
        if let Some(v) = parse_env::<u32>("TRADESIM_MAX_TRANSIENT_FAILURES") {
            config.monitor.max_transient_failures = v;
        }
        if let Some(v) = parse_env::<Decimal>("TRADESIM_PAYOUT_RATE") {
            config.settlement.payout_rate = v;
        }
        if let Some(v) = parse_env::<Decimal>("TRADESIM_MIN_STAKE") {
            config.settlement.min_stake = Quote::new(v);
        }
        if let Some(v) = parse_env::<DrawPolicy>("TRADESIM_DRAW_POLICY") {
            config.settlement.draw_policy = v;
        }
        if let Some(v) = parse_env::<u64>("TRADESIM_SWEEP_INTERVAL_MS") {
            config.settlement.sweep_interval_ms = v;
        }

        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fee = self.ledger.fee_rate;
        if fee < Decimal::ZERO || fee >= dec!(0.1) {
            return Err(ConfigError::InvalidFees {
                reason: format!("fee rate {} outside [0, 0.1)", fee),
            });
        }

        if self.ledger.initial_balance.value() <= Decimal::ZERO {
            return Err(ConfigError::InvalidLedger {
                reason: "initial balance must be positive".to_string(),
            });
        }

        if self.ledger.snapshot_key.trim().is_empty() {
            return Err(ConfigError::InvalidLedger {
                reason: "snapshot key must not be empty".to_string(),
            });
        }

        if self.settlement.payout_rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidSettlement {
                reason: "payout rate must be positive".to_string(),
            });
        }

        if self.settlement.min_stake.value() <= Decimal::ZERO {
            return Err(ConfigError::InvalidSettlement {
                reason: "minimum stake must be positive".to_string(),
            });
        }

        if self.settlement.allowed_durations.iter().any(|d| *d == 0) {
            return Err(ConfigError::InvalidSettlement {
                reason: "durations must be positive".to_string(),
            });
        }

        if self.monitor.interval_ms == 0 || self.settlement.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidSchedule {
                reason: "intervals must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn fee_rate(&self) -> Decimal {
        self.ledger.fee_rate
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },
    #[error("invalid ledger settings: {reason}")]
    InvalidLedger { reason: String },
    #[error("invalid settlement settings: {reason}")]
    InvalidSettlement { reason: String },
    #[error("invalid schedule: {reason}")]
    InvalidSchedule { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Demo,
    Strict,
}

impl Environment {
    pub fn config(&self) -> EngineConfig {
        match self {
            Environment::Demo => EngineConfig::demo(),
            Environment::Strict => EngineConfig::strict(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_rate(), dec!(0.001));
        assert_eq!(config.settlement.payout_rate, dec!(0.85));
        assert_eq!(config.settlement.draw_policy, DrawPolicy::Lose);
    }

    #[test]
    fn strict_config_valid() {
        let config = EngineConfig::strict();
        assert!(config.validate().is_ok());
        assert_eq!(config.settlement.allowed_durations, STANDARD_DURATIONS.to_vec());
    }

    #[test]
    fn invalid_fee_rejected() {
        let mut config = EngineConfig::default();
        config.ledger.fee_rate = dec!(0.5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));

        config.ledger.fee_rate = dec!(-0.001);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn invalid_settlement_rejected() {
        let mut config = EngineConfig::default();
        config.settlement.payout_rate = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSettlement { .. })));

        let mut config = EngineConfig::default();
        config.settlement.allowed_durations = vec![60, 0];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSettlement { .. })));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = EngineConfig::default();
        config.settlement.sweep_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSchedule { .. })));
    }

    #[test]
    fn draw_policy_parsing() {
        assert_eq!("refund".parse::<DrawPolicy>(), Ok(DrawPolicy::Refund));
        assert_eq!(" LOSE ".parse::<DrawPolicy>(), Ok(DrawPolicy::Lose));
        assert_eq!("win".parse::<DrawPolicy>(), Ok(DrawPolicy::Win));
        assert!("tie".parse::<DrawPolicy>().is_err());
    }

    #[test]
    fn environment_presets() {
        assert!(Environment::Demo.config().validate().is_ok());
        assert!(Environment::Strict.config().validate().is_ok());
    }

    #[test]
    fn config_serialization() {
        let config = EngineConfig::strict();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ledger.fee_rate, config.ledger.fee_rate);
        assert_eq!(back.settlement.allowed_durations, config.settlement.allowed_durations);
    }
}
