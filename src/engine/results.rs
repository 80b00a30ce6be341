// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::position::CloseReason;
use crate::price_feed::OracleError;
use crate::settlement::{BetError, BetResolution};
use crate::store::StoreError;
use crate::types::{BetId, PositionId, Price, Quote, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub symbol: Symbol,
    pub price: Price,
    pub amount: Decimal,
    pub total: Quote,
    pub fee: Quote,
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub close_price: Price,
    pub realized_pnl: Quote,
    pub fee: Quote,
    pub credited: Quote,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DegradedWarning {
    // oracle kept failing for this symbol past the retry bound
    PriceFeed { symbol: Symbol, consecutive_failures: u32 },
    // snapshot saves kept failing past the retry bound
    Persistence { consecutive_failures: u32 },
}

/// What one monitor cycle did.
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub symbols_refreshed: Vec<Symbol>,
    pub symbols_failed: Vec<Symbol>,
    pub closed: Vec<CloseResult>,
    pub unrealized_pnl: Quote,
    pub persisted: bool,
    pub warnings: Vec<DegradedWarning>,
}

/// What one settlement sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub settled: Vec<BetResolution>,
    // due but left active because no fresh price was available
    pub deferred: Vec<BetId>,
    pub persisted: bool,
    pub warnings: Vec<DegradedWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub monitor: MonitorReport,
    pub sweep: SweepReport,
}

/// Valuation of holdings and open positions at their last observed prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub balance: Quote,
    pub holdings_value: Quote,
    pub holdings_cost: Quote,
    pub holdings_pnl: Quote,
    pub holdings_pnl_pct: Decimal,
    pub margin_in_use: Quote,
    pub positions_unrealized_pnl: Quote,
    pub active_stakes: Quote,
    // balance + holdings at market + margin + open pnl + active stakes
    pub total_equity: Quote,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Quote, available: Quote },

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("No holding of {0}")]
    AssetNotFound(Symbol),

    #[error("Insufficient {symbol}: requested {requested}, held {held}")]
    InsufficientAssetAmount {
        symbol: Symbol,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Position {0} not found or already closed")]
    PositionNotFound(PositionId),

    #[error("Bet {0} not found")]
    BetNotFound(BetId),

    #[error("Bet {0} already settled")]
    BetAlreadySettled(BetId),

    #[error("Invalid stake {stake}: {reason}")]
    InvalidStake { stake: Quote, reason: String },

    #[error("Invalid leverage {value}: must be between 1 and {max}")]
    InvalidLeverage { value: Decimal, max: Decimal },

    #[error("Invalid amount {0}: must be positive")]
    InvalidAmount(Decimal),

    #[error("Invalid price {0}: must be positive")]
    InvalidPrice(Decimal),

    #[error("Invalid duration {secs}s: {reason}")]
    InvalidDuration { secs: u64, reason: String },

    #[error("Invalid trigger {price}: {reason}")]
    InvalidTrigger { price: Price, reason: String },

    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: Symbol, reason: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Transient errors are retried by the periodic processes; everything
    /// else is the caller's input and is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::PriceUnavailable { .. } | EngineError::PersistenceFailure(_)
        )
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientBalance { requested, available } => {
                EngineError::InsufficientBalance {
                    required: requested,
                    available,
                }
            }
            AccountError::InsufficientMargin { required, available } => {
                EngineError::InsufficientMargin { required, available }
            }
        }
    }
}

impl From<BetError> for EngineError {
    fn from(err: BetError) -> Self {
        match err {
            BetError::NotFound(id) => EngineError::BetNotFound(id),
            BetError::AlreadySettled(id) => EngineError::BetAlreadySettled(id),
        }
    }
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        let symbol = match &err {
            OracleError::UnknownSymbol(s) => s.clone(),
            OracleError::Unavailable { symbol, .. } | OracleError::Stale { symbol, .. } => {
                symbol.clone()
            }
        };
        EngineError::PriceUnavailable {
            symbol,
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::PersistenceFailure(err.to_string())
    }
}
