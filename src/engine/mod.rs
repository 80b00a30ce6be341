// 8.0: ledger engine. coordinates spot trades, margin positions, the position monitor,
// and fixed-time bet settlement. deterministic given its oracle and clock.

mod core;
mod monitor;
mod positions;
mod results;
mod settlement;
mod spot;

pub use self::core::{Engine, SNAPSHOT_VERSION};
pub use positions::OpenPosition;
pub use results::{
    CloseResult, DegradedWarning, EngineError, MonitorReport, PortfolioSummary, SweepReport,
    TickReport, TradeResult,
};
