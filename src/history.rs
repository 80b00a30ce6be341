// 11.0: every committed balance movement appends one entry. entries are never edited,
// newest sits at the front. used for audit trails and the trade log view.

use crate::types::{BetId, EntryId, PositionId, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    // Spot
    Buy,
    Sell,

    // Margin
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,

    // Cash
    Deposit,

    // Fixed-time bets
    BetStake,
    BetSettle,
}

impl EntryKind {
    pub fn open(side: Side) -> Self {
        match side {
            Side::Long => EntryKind::OpenLong,
            Side::Short => EntryKind::OpenShort,
        }
    }

    pub fn close(side: Side) -> Self {
        match side {
            Side::Long => EntryKind::CloseLong,
            Side::Short => EntryKind::CloseShort,
        }
    }
}

/// One line of the audit trail.
///
/// `total` is the gross notional (price * amount), or the cash moved for
/// deposits and bets. `fee` is charged on top of or out of `total`
/// depending on direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub symbol: Option<Symbol>,
    pub price: Option<Price>,
    pub amount: Decimal,
    pub total: Quote,
    pub fee: Quote,
    pub timestamp: Timestamp,
    pub position_id: Option<PositionId>,
    pub bet_id: Option<BetId>,
}

impl LedgerEntry {
    pub fn trade(
        kind: EntryKind,
        symbol: Symbol,
        price: Price,
        amount: Decimal,
        fee: Quote,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: EntryId(0),
            kind,
            symbol: Some(symbol),
            price: Some(price),
            amount,
            total: Quote::new(price.value() * amount),
            fee,
            timestamp,
            position_id: None,
            bet_id: None,
        }
    }

    pub fn deposit(amount: Quote, timestamp: Timestamp) -> Self {
        Self {
            id: EntryId(0),
            kind: EntryKind::Deposit,
            symbol: None,
            price: None,
            amount: amount.value(),
            total: amount,
            fee: Quote::zero(),
            timestamp,
            position_id: None,
            bet_id: None,
        }
    }

    pub fn bet(
        kind: EntryKind,
        bet_id: BetId,
        symbol: Symbol,
        price: Price,
        cash: Quote,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: EntryId(0),
            kind,
            symbol: Some(symbol),
            price: Some(price),
            amount: cash.value(),
            total: cash,
            fee: Quote::zero(),
            timestamp,
            position_id: None,
            bet_id: Some(bet_id),
        }
    }

    pub fn with_position(mut self, position_id: PositionId) -> Self {
        self.position_id = Some(position_id);
        self
    }
}
