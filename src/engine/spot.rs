//! Spot buys, sells and cash deposits.

use super::core::{checked_notional, validate_amount, validate_price, Engine};
use super::results::{EngineError, TradeResult};
use crate::history::{EntryKind, LedgerEntry};
use crate::spot::SpotHolding;
use crate::types::{Quote, Symbol};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Buy `amount` of `symbol` at `price`. Debits notional plus fee.
    pub fn buy(
        &mut self,
        symbol: impl Into<Symbol>,
        price: Decimal,
        amount: Decimal,
    ) -> Result<TradeResult, EngineError> {
        let symbol = symbol.into();
        let price = validate_price(price)?;
        let amount = validate_amount(amount)?;

        let (total, fee) = checked_notional(price, amount, self.config.fee_rate())?;

        // the last fallible step; nothing is touched before it
        self.account.reserve(total.add(fee))?;
        self.account.record_fee(fee);

        match self.account.portfolio.get_mut(&symbol) {
            Some(holding) => holding.apply_buy(amount, price),
            None => {
                self.account
                    .portfolio
                    .insert(symbol.clone(), SpotHolding::new(symbol.clone(), amount, price));
            }
        }

        let now = self.now();
        self.account.append(LedgerEntry::trade(
            EntryKind::Buy,
            symbol.clone(),
            price,
            amount,
            fee,
            now,
        ));

        info!(symbol = %symbol, %price, %amount, %total, %fee, "Spot buy");
        self.commit();

        Ok(TradeResult {
            symbol,
            price,
            amount,
            total,
            fee,
            balance: self.account.balance,
        })
    }

    /// Sell `amount` of an existing holding at `price`. Credits notional minus fee.
    pub fn sell(
        &mut self,
        symbol: impl Into<Symbol>,
        price: Decimal,
        amount: Decimal,
    ) -> Result<TradeResult, EngineError> {
        let symbol = symbol.into();
        let price = validate_price(price)?;
        let amount = validate_amount(amount)?;

        let held = self
            .account
            .holding(&symbol)
            .map(|h| h.amount)
            .ok_or_else(|| EngineError::AssetNotFound(symbol.clone()))?;
        if amount > held {
            return Err(EngineError::InsufficientAssetAmount {
                symbol,
                requested: amount,
                held,
            });
        }

        let (total, fee) = checked_notional(price, amount, self.config.fee_rate())?;
        if self.account.balance.value().checked_add(total.value()).is_none() {
            return Err(EngineError::InvalidAmount(amount));
        }

        let holding = self
            .account
            .portfolio
            .get_mut(&symbol)
            .ok_or_else(|| EngineError::AssetNotFound(symbol.clone()))?;
        let released = holding.apply_sell(amount, price);
        if holding.is_empty() {
            self.account.portfolio.remove(&symbol);
        }

        self.account.credit(total.sub(fee));
        self.account.record_fee(fee);
        self.account.record_realized(total.sub(released));

        let now = self.now();
        self.account.append(LedgerEntry::trade(
            EntryKind::Sell,
            symbol.clone(),
            price,
            amount,
            fee,
            now,
        ));

        info!(symbol = %symbol, %price, %amount, %total, %fee, realized = %total.sub(released), "Spot sell");
        self.commit();

        Ok(TradeResult {
            symbol,
            price,
            amount,
            total,
            fee,
            balance: self.account.balance,
        })
    }

    /// Demo top-up.
    pub fn deposit(&mut self, amount: Decimal) -> Result<Quote, EngineError> {
        let amount = Quote::new(validate_amount(amount)?);
        self.account.deposit(amount);
        let now = self.now();
        self.account.append(LedgerEntry::deposit(amount, now));

        info!(%amount, balance = %self.account.balance, "Deposit");
        self.commit();
        Ok(self.account.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::price_feed::StaticOracle;
    use crate::store::MemoryStore;
    use crate::types::{ManualClock, Timestamp};
    use rust_decimal_macros::dec;

    fn engine() -> Engine {
        let clock = ManualClock::new(Timestamp::from_secs(0));
        Engine::open(
            EngineConfig::default(),
            StaticOracle::new(clock.clone()),
            MemoryStore::new(),
            clock,
        )
        .unwrap()
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let mut engine = engine();

        let bought = engine.buy("BTC", dec!(50000), dec!(0.1)).unwrap();
        assert_eq!(bought.total.value(), dec!(5000));
        assert_eq!(bought.fee.value(), dec!(5));
        assert_eq!(engine.balance().value(), dec!(4995));

        let holding = engine.account().holding(&Symbol::new("BTC")).unwrap();
        assert_eq!(holding.amount, dec!(0.1));
        assert_eq!(holding.avg_cost.value(), dec!(50000));

        let sold = engine.sell("BTC", dec!(55000), dec!(0.1)).unwrap();
        assert_eq!(sold.total.value(), dec!(5500));
        assert_eq!(sold.fee.value(), dec!(5.5));
        assert_eq!(engine.balance().value(), dec!(10489.5));
        assert!(engine.account().holding(&Symbol::new("BTC")).is_none());
        assert_eq!(engine.account().realized_pnl.value(), dec!(500));
        assert_eq!(engine.conservation_gap(), Decimal::ZERO);
    }

    #[test]
    fn buy_with_insufficient_balance_changes_nothing() {
        let mut engine = engine();
        let before = engine.account_snapshot();

        let err = engine.buy("BTC", dec!(50000), dec!(1)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert_eq!(engine.balance(), before.balance);
        assert!(engine.account().portfolio.is_empty());
        assert_eq!(engine.account().history.len(), before.history.len());
    }

    #[test]
    fn buy_rejects_bad_input() {
        let mut engine = engine();
        assert_eq!(
            engine.buy("BTC", dec!(0), dec!(1)),
            Err(EngineError::InvalidPrice(dec!(0)))
        );
        assert_eq!(
            engine.buy("BTC", dec!(100), dec!(-1)),
            Err(EngineError::InvalidAmount(dec!(-1)))
        );
    }

    #[test]
    fn buy_rejects_unrepresentable_notional() {
        let mut engine = engine();
        let before = engine.account_snapshot();

        assert_eq!(
            engine.buy("BTC", Decimal::MAX, dec!(2)),
            Err(EngineError::InvalidAmount(dec!(2)))
        );
        // the fee pushes it over
        assert_eq!(
            engine.buy("BTC", Decimal::MAX, dec!(1)),
            Err(EngineError::InvalidAmount(dec!(1)))
        );

        assert_eq!(engine.balance(), before.balance);
        assert!(engine.account().portfolio.is_empty());
        assert_eq!(engine.account().history.len(), before.history.len());
    }

    #[test]
    fn sell_rejects_unrepresentable_notional() {
        let mut engine = engine();
        engine.buy("ETH", dec!(3000), dec!(1)).unwrap();
        let before = engine.account_snapshot();

        assert_eq!(
            engine.sell("ETH", Decimal::MAX, dec!(1)),
            Err(EngineError::InvalidAmount(dec!(1)))
        );
        assert_eq!(engine.balance(), before.balance);
        assert_eq!(engine.account().holding(&Symbol::new("ETH")).unwrap().amount, dec!(1));
    }

    #[test]
    fn sell_errors() {
        let mut engine = engine();
        assert_eq!(
            engine.sell("ETH", dec!(3000), dec!(1)),
            Err(EngineError::AssetNotFound(Symbol::new("ETH")))
        );

        engine.buy("ETH", dec!(3000), dec!(1)).unwrap();
        let err = engine.sell("ETH", dec!(3000), dec!(1.5)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientAssetAmount { .. }));
        assert_eq!(engine.account().holding(&Symbol::new("ETH")).unwrap().amount, dec!(1));
    }

    #[test]
    fn partial_sell_keeps_average_cost() {
        let mut engine = engine();
        engine.buy("SOL", dec!(100), dec!(10)).unwrap();
        engine.buy("SOL", dec!(200), dec!(10)).unwrap();
        engine.sell("SOL", dec!(180), dec!(5)).unwrap();

        let holding = engine.account().holding(&Symbol::new("SOL")).unwrap();
        assert_eq!(holding.amount, dec!(15));
        assert_eq!(holding.avg_cost.value(), dec!(150));
        // (180 - 150) * 5
        assert_eq!(engine.account().realized_pnl.value(), dec!(150));
    }

    #[test]
    fn deposit_is_logged() {
        let mut engine = engine();
        let balance = engine.deposit(dec!(500)).unwrap();

        assert_eq!(balance.value(), dec!(10500));
        assert_eq!(engine.account().total_deposited.value(), dec!(10500));
        assert_eq!(engine.account().history[0].kind, EntryKind::Deposit);
        assert!(engine.deposit(dec!(0)).is_err());
    }
}
