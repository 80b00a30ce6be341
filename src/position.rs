// 4.0: leveraged margin positions. pnl = (mark - entry) * size * leverage, sign flipped for shorts.
// 4.1 has the close math at the bottom. a position is never deleted, only moved to the closed list.

use crate::types::{Leverage, PositionId, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

// why a position left the open list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    TakeProfit,
    StopLoss,
    // loss consumed the whole margin
    Liquidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginPosition {
    pub id: PositionId,
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub leverage: Leverage,
    pub entry_price: Price,
    pub margin_held: Quote,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub opened_at: Timestamp,
    pub status: PositionStatus,
    // last mark seen by the monitor, entry price until the first refresh
    pub last_price: Price,
    pub close_price: Option<Price>,
    pub closed_at: Option<Timestamp>,
    pub realized_pnl: Option<Quote>,
    pub close_reason: Option<CloseReason>,
}

impl MarginPosition {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        leverage: Leverage,
        entry_price: Price,
        take_profit: Option<Price>,
        stop_loss: Option<Price>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            size,
            leverage,
            entry_price,
            margin_held: margin_required(entry_price, size, leverage),
            take_profit,
            stop_loss,
            opened_at: timestamp,
            status: PositionStatus::Open,
            last_price: entry_price,
            close_price: None,
            closed_at: None,
            realized_pnl: None,
            close_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn notional_value(&self, mark_price: Price) -> Quote {
        Quote::new(self.size.saturating_mul(mark_price.value()))
    }

    pub fn unrealized_pnl(&self, mark_price: Price) -> Quote {
        calculate_pnl(self.side, self.size, self.leverage, self.entry_price, mark_price)
    }

    pub fn current_pnl(&self) -> Quote {
        self.unrealized_pnl(self.last_price)
    }

    // 4.2: margin + pnl. zero or below means the margin is gone
    pub fn equity(&self, mark_price: Price) -> Quote {
        self.margin_held.add(self.unrealized_pnl(mark_price))
    }

    pub fn is_margin_exhausted(&self, mark_price: Price) -> bool {
        self.equity(mark_price).value() <= Decimal::ZERO
    }

    /// Freeze the position at its settlement values.
    pub fn mark_closed(
        &mut self,
        close_price: Price,
        realized_pnl: Quote,
        reason: CloseReason,
        timestamp: Timestamp,
    ) {
        self.status = PositionStatus::Closed;
        self.last_price = close_price;
        self.close_price = Some(close_price);
        self.closed_at = Some(timestamp);
        self.realized_pnl = Some(realized_pnl);
        self.close_reason = Some(reason);
    }
}

// 4.3: entry * size / leverage
pub fn margin_required(price: Price, size: Decimal, leverage: Leverage) -> Quote {
    Quote::new(price.value().saturating_mul(size) / leverage.value())
}

// 4.4: the pnl formula. leverage multiplies the move, size is base units
pub fn calculate_pnl(
    side: Side,
    size: Decimal,
    leverage: Leverage,
    entry_price: Price,
    mark_price: Price,
) -> Quote {
    let delta = mark_price.value() - entry_price.value();
    // a runaway mark saturates rather than panicking; the position is exhausted or capped
    Quote::new((side.sign() * delta).saturating_mul(size).saturating_mul(leverage.value()))
}

/// Balance movements of a full close.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSettlement {
    pub realized_pnl: Quote,
    pub fee: Quote,
    pub credit: Quote,
    pub exhausted: bool,
}

// 4.5: margin + pnl - fee, floored at zero. once the loss eats the margin the
// position is worth nothing, the extra loss is not charged and no fee is taken
pub fn settle_close(position: &MarginPosition, close_price: Price, fee_rate: Decimal) -> CloseSettlement {
    let pnl = position.unrealized_pnl(close_price);
    let available = position.margin_held.add(pnl);

    if available.value() <= Decimal::ZERO {
        return CloseSettlement {
            realized_pnl: position.margin_held.negate(),
            fee: Quote::zero(),
            credit: Quote::zero(),
            exhausted: true,
        };
    }

    let fee = position.notional_value(close_price).mul(fee_rate).min(available);
    CloseSettlement {
        realized_pnl: pnl,
        fee,
        credit: available.sub(fee),
        exhausted: false,
    }
}
