//! Opening and closing leveraged margin positions.

use super::core::{checked_notional, validate_amount, validate_price, Engine};
use super::results::{CloseResult, EngineError};
use crate::conditional::{validate_levels, ConditionalType};
use crate::history::{EntryKind, LedgerEntry};
use crate::position::{margin_required, settle_close, CloseReason, MarginPosition};
use crate::types::{Leverage, PositionId, Price, Side, Symbol};
use rust_decimal::Decimal;
use tracing::info;

/// Parameters for `Engine::open_position`.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub leverage: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

impl OpenPosition {
    pub fn new(symbol: impl Into<Symbol>, side: Side, price: Decimal, size: Decimal, leverage: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            size,
            leverage,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn long(symbol: impl Into<Symbol>, price: Decimal, size: Decimal, leverage: Decimal) -> Self {
        Self::new(symbol, Side::Long, price, size, leverage)
    }

    pub fn short(symbol: impl Into<Symbol>, price: Decimal, size: Decimal, leverage: Decimal) -> Self {
        Self::new(symbol, Side::Short, price, size, leverage)
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }
}

impl Engine {
    /// Open a position. Debits `price*size/leverage` margin plus a fee on the
    /// full notional.
    pub fn open_position(&mut self, request: OpenPosition) -> Result<MarginPosition, EngineError> {
        let OpenPosition {
            symbol,
            side,
            price,
            size,
            leverage,
            take_profit,
            stop_loss,
        } = request;

        let entry_price = validate_price(price)?;
        let size = validate_amount(size)?;
        let max = self.config.ledger.max_leverage;
        let leverage = Leverage::new(leverage)
            .filter(|l| l.value() <= max.value())
            .ok_or(EngineError::InvalidLeverage {
                value: leverage,
                max: max.value(),
            })?;
        let take_profit = take_profit.map(validate_price).transpose()?;
        let stop_loss = stop_loss.map(validate_price).transpose()?;

        validate_levels(side, entry_price, take_profit, stop_loss).map_err(|rejection| {
            let which = match rejection.kind {
                ConditionalType::TakeProfit => "take-profit",
                ConditionalType::StopLoss => "stop-loss",
            };
            EngineError::InvalidTrigger {
                price: rejection.trigger_price,
                reason: format!("{} on the wrong side of entry {} for a {:?}", which, entry_price, side),
            }
        })?;

        let (notional, fee) = checked_notional(entry_price, size, self.config.fee_rate())?;
        // pnl scales notional by leverage; it has to fit at entry scale too
        if notional.value().checked_mul(leverage.value()).is_none() {
            return Err(EngineError::InvalidAmount(size));
        }
        let margin = margin_required(entry_price, size, leverage);
        self.account.reserve_margin(margin.add(fee))?;
        self.account.record_fee(fee);

        let now = self.now();
        let id = self.account.allocate_position_id();
        let position = MarginPosition::open(
            id,
            symbol.clone(),
            side,
            size,
            leverage,
            entry_price,
            take_profit,
            stop_loss,
            now,
        );
        self.account.open_positions.push(position.clone());
        self.account.append(
            LedgerEntry::trade(EntryKind::open(side), symbol.clone(), entry_price, size, fee, now)
                .with_position(id),
        );

        info!(
            position_id = %id,
            symbol = %symbol,
            ?side,
            %entry_price,
            %size,
            %leverage,
            margin = %position.margin_held,
            %fee,
            "Position opened"
        );
        self.commit();

        Ok(position)
    }

    /// Close an open position at `close_price`, or at its last observed
    /// price when none is given.
    pub fn close_position(
        &mut self,
        id: PositionId,
        close_price: Option<Decimal>,
    ) -> Result<CloseResult, EngineError> {
        let close_price = match close_price {
            Some(p) => validate_price(p)?,
            None => self
                .account
                .open_position(id)
                .map(|p| p.last_price)
                .ok_or(EngineError::PositionNotFound(id))?,
        };

        let result = self.close_at(id, close_price, CloseReason::Manual)?;
        self.commit();
        Ok(result)
    }

    // 8.4: moves the position to the closed list. no save; callers decide when
    pub(super) fn close_at(
        &mut self,
        id: PositionId,
        close_price: Price,
        reason: CloseReason,
    ) -> Result<CloseResult, EngineError> {
        let mut position = self
            .account
            .take_open_position(id)
            .ok_or(EngineError::PositionNotFound(id))?;

        let settlement = settle_close(&position, close_price, self.config.fee_rate());
        let reason = if settlement.exhausted {
            CloseReason::Liquidated
        } else {
            reason
        };

        self.account.credit(settlement.credit);
        self.account.record_fee(settlement.fee);
        self.account.record_realized(settlement.realized_pnl);

        let now = self.now();
        position.mark_closed(close_price, settlement.realized_pnl, reason, now);
        self.account.append(
            LedgerEntry::trade(
                EntryKind::close(position.side),
                position.symbol.clone(),
                close_price,
                position.size,
                settlement.fee,
                now,
            )
            .with_position(id),
        );

        info!(
            position_id = %id,
            symbol = %position.symbol,
            %close_price,
            realized_pnl = %settlement.realized_pnl,
            credited = %settlement.credit,
            ?reason,
            "Position closed"
        );
        self.account.closed_positions.push(position);

        Ok(CloseResult {
            position_id: id,
            close_price,
            realized_pnl: settlement.realized_pnl,
            fee: settlement.fee,
            credited: settlement.credit,
            reason,
        })
    }
}
