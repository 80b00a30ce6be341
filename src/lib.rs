// tradesim-core: simulated trading ledger and timed settlement engine.
// balance-first architecture: no operation may leave the cash balance below zero.
// all state transitions are deterministic given the injected oracle and clock.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, ids, Price, Quote, Leverage, Timestamp, Clock
//   3.x  spot.rs: spot holdings, weighted average cost
//   4.x  position.rs: margin positions, pnl, close math
//   4.1x conditional.rs: take profit / stop loss triggers
//   7.x  config.rs: fees, payouts, stake limits, env presets
//   8.x  engine/: core engine: spot, positions, monitor, settlement sweep
//   9.x  price_feed.rs: price oracle trait, static and random-walk oracles
//   9.1  settlement.rs: fixed-time bet book
//   9.2  store.rs: snapshot persistence (memory, json files, sqlite)
//   9.3  scheduler.rs: tokio loops driving the monitor and the sweep
//   10.x account.rs: account, cash movements, running totals
//   11.x history.rs: append-only trade log

// ledger modules
pub mod account;
pub mod engine;
pub mod history;
pub mod position;
pub mod spot;
pub mod types;

// triggers and settlement
pub mod conditional;
pub mod settlement;

// integration modules
pub mod config;
pub mod price_feed;
pub mod scheduler;
pub mod store;

// re exports for convenience
pub use account::{Account, AccountError};
pub use conditional::{evaluate_triggers, ConditionalType, TriggerCondition};
pub use config::{DrawPolicy, EngineConfig, Environment, STANDARD_DURATIONS};
pub use engine::*;
pub use history::{EntryKind, LedgerEntry};
pub use position::{CloseReason, MarginPosition, PositionStatus};
pub use price_feed::{OracleError, PriceOracle, PriceQuote, RandomWalkOracle, StaticOracle};
pub use scheduler::{shared, Scheduler, SharedEngine};
pub use settlement::{BetBook, BetResolution, BetStatus, FixedTimeBet, SettlementSource};
pub use spot::SpotHolding;
pub use store::{JsonFileStore, LedgerStore, MemoryStore, SqliteStore, StoreError};
pub use types::*;
