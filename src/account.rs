//! The single trading account: cash, spot portfolio, margin positions and the trade log.
//!
//! Cash only leaves through `reserve`/`reserve_margin`, which refuse to take the
//! balance below zero. Running totals (deposits, fees, realized pnl, net bet
//! results) are kept alongside so the books can be reconciled at any instant.

use crate::history::LedgerEntry;
use crate::position::MarginPosition;
use crate::spot::SpotHolding;
use crate::types::{EntryId, PositionId, Quote, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub balance: Quote,
    pub portfolio: BTreeMap<Symbol, SpotHolding>,
    // ascending id, which is also open order
    pub open_positions: Vec<MarginPosition>,
    // append-only, in close order
    pub closed_positions: Vec<MarginPosition>,
    // newest first
    pub history: VecDeque<LedgerEntry>,
    pub total_deposited: Quote,
    pub total_fees: Quote,
    pub realized_pnl: Quote,
    pub net_bet_payouts: Quote,
    pub created_at: Timestamp,
    next_position_id: u64,
    next_entry_id: u64,
}

impl Account {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            balance: Quote::zero(),
            portfolio: BTreeMap::new(),
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            history: VecDeque::new(),
            total_deposited: Quote::zero(),
            total_fees: Quote::zero(),
            realized_pnl: Quote::zero(),
            net_bet_payouts: Quote::zero(),
            created_at: timestamp,
            next_position_id: 1,
            next_entry_id: 1,
        }
    }

    pub fn deposit(&mut self, amount: Quote) {
        self.balance = self.balance.add(amount);
        self.total_deposited = self.total_deposited.add(amount);
    }

    /// Take cash out of the balance for a purchase or a stake.
    pub fn reserve(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.value() > self.balance.value() {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.sub(amount);
        Ok(())
    }

    /// Same as `reserve`, reported as a margin shortfall.
    pub fn reserve_margin(&mut self, amount: Quote) -> Result<(), AccountError> {
        self.reserve(amount).map_err(|_| AccountError::InsufficientMargin {
            required: amount,
            available: self.balance,
        })
    }

    pub fn credit(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative(), "credit must not be negative");
        self.balance = self.balance.add(amount);
    }

    pub fn record_fee(&mut self, fee: Quote) {
        self.total_fees = self.total_fees.add(fee);
    }

    pub fn record_realized(&mut self, pnl: Quote) {
        self.realized_pnl = self.realized_pnl.add(pnl);
    }

    // payout minus stake for a resolved bet. negative for a loss
    pub fn record_bet_result(&mut self, net: Quote) {
        self.net_bet_payouts = self.net_bet_payouts.add(net);
    }

    /// Stamp the entry with the next id and put it at the head of the log.
    pub fn append(&mut self, mut entry: LedgerEntry) -> EntryId {
        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        entry.id = id;
        self.history.push_front(entry);
        id
    }

    pub fn allocate_position_id(&mut self) -> PositionId {
        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        id
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<&SpotHolding> {
        self.portfolio.get(symbol)
    }

    pub fn open_position(&self, id: PositionId) -> Option<&MarginPosition> {
        self.open_positions.iter().find(|p| p.id == id)
    }

    pub fn take_open_position(&mut self, id: PositionId) -> Option<MarginPosition> {
        let idx = self.open_positions.iter().position(|p| p.id == id)?;
        Some(self.open_positions.remove(idx))
    }

    pub fn closed_position(&self, id: PositionId) -> Option<&MarginPosition> {
        self.closed_positions.iter().find(|p| p.id == id)
    }

    pub fn margin_in_use(&self) -> Quote {
        self.open_positions.iter().map(|p| p.margin_held).sum()
    }

    pub fn holdings_cost_basis(&self) -> Quote {
        self.portfolio.values().map(|h| h.cost_basis()).sum()
    }

    pub fn holdings_value(&self) -> Quote {
        self.portfolio.values().map(|h| h.value()).sum()
    }

    /// Every symbol the monitor has to price, sorted and deduplicated.
    pub fn tracked_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .portfolio
            .keys()
            .cloned()
            .chain(self.open_positions.iter().map(|p| p.symbol.clone()))
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn recent_history(&self, count: usize) -> impl Iterator<Item = &LedgerEntry> {
        self.history.iter().take(count)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },
}
