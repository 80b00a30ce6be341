// 8.0 engine/core.rs: main engine. owns the account, the bet book, and the injected
// oracle, store and clock. every mutation commits in memory first, then saves.

use super::results::{DegradedWarning, EngineError, PortfolioSummary, TickReport};
use crate::account::Account;
use crate::config::EngineConfig;
use crate::history::LedgerEntry;
use crate::price_feed::{OracleError, PriceOracle, PriceQuote};
use crate::settlement::{BetBook, FixedTimeBet};
use crate::store::{load_snapshot, save_snapshot, LedgerStore, StoreError};
use crate::types::{BetId, Clock, Price, Quote, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Bumped when a snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

// account and bet book travel in one body so a single save is all-or-nothing.
// a payout can never be persisted without the settled bet that produced it
#[derive(Debug, Deserialize)]
struct LedgerSnapshot {
    version: u32,
    account: Account,
    bets: BetBook,
}

#[derive(Serialize)]
struct LedgerSnapshotRef<'a> {
    version: u32,
    account: &'a Account,
    bets: &'a BetBook,
}

/** 8.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) account: Account,
    pub(super) bets: BetBook,
    pub(super) oracle: Box<dyn PriceOracle>,
    pub(super) store: Box<dyn LedgerStore>,
    pub(super) clock: Box<dyn Clock>,
    // in-memory state is ahead of the store
    pub(super) dirty: bool,
    pub(super) persist_failures: u32,
    pub(super) price_failures: HashMap<Symbol, u32>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("balance", &self.account.balance)
            .field("open_positions", &self.account.open_positions.len())
            .field("active_bets", &self.bets.active().count())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Engine {
    /// Restore the account and bet book from `store`, or start a fresh account
    /// funded with the configured initial balance.
    pub fn open(
        config: EngineConfig,
        oracle: impl PriceOracle + 'static,
        store: impl LedgerStore + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let snapshot: Option<LedgerSnapshot> = load_snapshot(&store, &config.ledger.snapshot_key)?;
        if let Some(version) = snapshot.as_ref().map(|s| s.version) {
            if version > SNAPSHOT_VERSION {
                return Err(EngineError::PersistenceFailure(format!(
                    "snapshot version {} is newer than supported {}",
                    version, SNAPSHOT_VERSION
                )));
            }
        }

        let now = clock.now();
        let restored = snapshot.is_some();
        let (account, bets) = match snapshot {
            Some(snapshot) => (snapshot.account, snapshot.bets),
            None => {
                let mut account = Account::new(now);
                let initial = config.ledger.initial_balance;
                account.deposit(initial);
                account.append(LedgerEntry::deposit(initial, now));
                (account, BetBook::new())
            }
        };

        let mut engine = Self {
            config,
            account,
            bets,
            oracle: Box::new(oracle),
            store: Box::new(store),
            clock: Box::new(clock),
            dirty: !restored,
            persist_failures: 0,
            price_failures: HashMap::new(),
        };

        if restored {
            info!(
                balance = %engine.account.balance,
                open_positions = engine.account.open_positions.len(),
                active_bets = engine.bets.active().count(),
                "Ledger restored from snapshot"
            );
        } else {
            info!(balance = %engine.account.balance, "New ledger opened");
            engine.persist();
        }

        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Owned copy of the account for display; never blocks later mutations.
    pub fn account_snapshot(&self) -> Account {
        self.account.clone()
    }

    pub fn balance(&self) -> Quote {
        self.account.balance
    }

    pub fn bet(&self, id: BetId) -> Option<&FixedTimeBet> {
        self.bets.get(id)
    }

    /// Active bets in ascending id order.
    pub fn active_bets(&self) -> Vec<FixedTimeBet> {
        self.bets.active().cloned().collect()
    }

    /// Bets that reached a terminal state at or after `since`.
    pub fn settled_bets(&self, since: Timestamp) -> Vec<FixedTimeBet> {
        self.bets.settled_since(since).cloned().collect()
    }

    pub fn bet_book(&self) -> &BetBook {
        &self.bets
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Run one monitor cycle and one settlement sweep back to back.
    pub fn tick(&mut self) -> TickReport {
        let monitor = self.run_monitor_cycle();
        let sweep = self.sweep_bets();
        TickReport { monitor, sweep }
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        let holdings_value = self.account.holdings_value();
        let holdings_cost = self.account.holdings_cost_basis();
        let holdings_pnl = holdings_value.sub(holdings_cost);
        let holdings_pnl_pct = if holdings_cost.is_zero() {
            Decimal::ZERO
        } else {
            holdings_pnl.value() / holdings_cost.value() * Decimal::ONE_HUNDRED
        };
        let margin_in_use = self.account.margin_in_use();
        let positions_unrealized_pnl: Quote =
            self.account.open_positions.iter().map(|p| p.current_pnl()).sum();
        let active_stakes = self.bets.active_stake();
        let total_equity = self
            .account
            .balance
            .add(holdings_value)
            .add(margin_in_use)
            .add(positions_unrealized_pnl)
            .add(active_stakes);

        PortfolioSummary {
            balance: self.account.balance,
            holdings_value,
            holdings_cost,
            holdings_pnl,
            holdings_pnl_pct,
            margin_in_use,
            positions_unrealized_pnl,
            active_stakes,
            total_equity,
        }
    }

    // 8.2: capital committed vs capital contributed. zero up to rounding of
    // weighted average costs. holdings count at cost, positions at margin
    pub fn conservation_gap(&self) -> Decimal {
        let a = &self.account;
        let committed = a
            .balance
            .add(a.holdings_cost_basis())
            .add(a.margin_in_use())
            .add(self.bets.active_stake());
        let contributed = a
            .total_deposited
            .sub(a.total_fees)
            .add(a.realized_pnl)
            .add(a.net_bet_payouts);
        committed.sub(contributed).value()
    }

    // 8.3: quote that is fresh enough to act on, or PriceUnavailable
    pub(super) fn fresh_quote(&self, symbol: &Symbol, now: Timestamp) -> Result<PriceQuote, EngineError> {
        let quote = self.oracle.get_price(symbol)?;
        if quote.is_stale(now, self.config.monitor.max_quote_age_ms) {
            return Err(OracleError::Stale {
                symbol: symbol.clone(),
                age_ms: quote.age_ms(now),
            }
            .into());
        }
        Ok(quote)
    }

    pub(super) fn note_price_success(&mut self, symbol: &Symbol) {
        self.price_failures.remove(symbol);
    }

    // returns a warning once failures for the symbol reach the retry bound
    pub(super) fn note_price_failure(&mut self, symbol: &Symbol, err: &EngineError) -> Option<DegradedWarning> {
        let count = self.price_failures.entry(symbol.clone()).or_insert(0);
        *count += 1;
        let consecutive_failures = *count;
        warn!(symbol = %symbol, consecutive_failures, error = %err, "Price lookup failed");

        (consecutive_failures >= self.config.monitor.max_transient_failures).then(|| {
            DegradedWarning::PriceFeed {
                symbol: symbol.clone(),
                consecutive_failures,
            }
        })
    }

    pub(super) fn persistence_warning(&self) -> Option<DegradedWarning> {
        (self.persist_failures >= self.config.monitor.max_transient_failures).then_some(
            DegradedWarning::Persistence {
                consecutive_failures: self.persist_failures,
            },
        )
    }

    fn save_all(&self) -> Result<(), StoreError> {
        save_snapshot(
            self.store.as_ref(),
            &self.config.ledger.snapshot_key,
            &LedgerSnapshotRef {
                version: SNAPSHOT_VERSION,
                account: &self.account,
                bets: &self.bets,
            },
        )
    }

    /// Write the ledger snapshot. A failure leaves the engine dirty for the
    /// next cycle to retry; the in-memory state stays authoritative.
    pub fn persist(&mut self) -> bool {
        match self.save_all() {
            Ok(()) => {
                if self.persist_failures > 0 {
                    info!(after_failures = self.persist_failures, "Snapshot save recovered");
                }
                self.dirty = false;
                self.persist_failures = 0;
                debug!("Snapshot saved");
                true
            }
            Err(e) => {
                self.dirty = true;
                self.persist_failures += 1;
                warn!(
                    error = %e,
                    consecutive_failures = self.persist_failures,
                    "Snapshot save failed, will retry"
                );
                false
            }
        }
    }

    // after a user operation: mark and save
    pub(super) fn commit(&mut self) {
        self.dirty = true;
        self.persist();
    }
}

pub(super) fn validate_price(value: Decimal) -> Result<Price, EngineError> {
    Price::new(value).ok_or(EngineError::InvalidPrice(value))
}

pub(super) fn validate_amount(value: Decimal) -> Result<Decimal, EngineError> {
    if value > Decimal::ZERO {
        Ok(value)
    } else {
        Err(EngineError::InvalidAmount(value))
    }
}

// 8.7: notional and fee for a fill. notional plus fee must be representable
// or the amount is rejected before anything moves
pub(super) fn checked_notional(price: Price, amount: Decimal, fee_rate: Decimal) -> Result<(Quote, Quote), EngineError> {
    let overflow = || EngineError::InvalidAmount(amount);
    let total = price.value().checked_mul(amount).ok_or_else(overflow)?;
    let fee = total.checked_mul(fee_rate).ok_or_else(overflow)?;
    total.checked_add(fee).ok_or_else(overflow)?;
    Ok((Quote::new(total), Quote::new(fee)))
}
