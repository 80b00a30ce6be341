// 3.0: spot holdings. one per symbol, cost basis tracked as a volume-weighted average.
// a holding never sits at zero amount: the sell that empties it removes it.

use crate::types::{Price, Quote, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotHolding {
    pub symbol: Symbol,
    pub amount: Decimal,
    pub avg_cost: Price,
    pub last_price: Price,
}

impl SpotHolding {
    pub fn new(symbol: Symbol, amount: Decimal, price: Price) -> Self {
        Self {
            symbol,
            amount,
            avg_cost: price,
            last_price: price,
        }
    }

    // 3.1: (a1*p1 + a2*p2) / (a1 + a2)
    pub fn apply_buy(&mut self, amount: Decimal, price: Price) {
        let total_amount = self.amount + amount;
        let weighted = self.amount * self.avg_cost.value() + amount * price.value();
        self.avg_cost = Price::new_unchecked(weighted / total_amount);
        self.amount = total_amount;
        self.last_price = price;
    }

    /// Reduce the holding and return the cost basis released by the sale.
    /// Caller checks `amount <= self.amount` first.
    pub fn apply_sell(&mut self, amount: Decimal, price: Price) -> Quote {
        debug_assert!(amount <= self.amount, "sell larger than holding");
        self.amount -= amount;
        self.last_price = price;
        Quote::new(amount * self.avg_cost.value())
    }

    pub fn is_empty(&self) -> bool {
        self.amount <= Decimal::ZERO
    }

    pub fn cost_basis(&self) -> Quote {
        Quote::new(self.amount * self.avg_cost.value())
    }

    // 3.2: valuation against the last observed price
    pub fn value(&self) -> Quote {
        Quote::new(self.amount.saturating_mul(self.last_price.value()))
    }

    pub fn profit_loss(&self) -> Quote {
        self.value().sub(self.cost_basis())
    }

    pub fn profit_loss_pct(&self) -> Decimal {
        let basis = self.cost_basis().value();
        if basis.is_zero() {
            return Decimal::ZERO;
        }
        self.profit_loss().value() / basis * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(v: Decimal) -> Price {
        Price::new(v).unwrap()
    }

    #[test]
    fn weighted_average_on_second_buy() {
        let mut h = SpotHolding::new(Symbol::new("BTC"), dec!(1), px(dec!(100)));
        h.apply_buy(dec!(3), px(dec!(200)));

        assert_eq!(h.amount, dec!(4));
        assert_eq!(h.avg_cost.value(), dec!(175));
        assert_eq!(h.last_price.value(), dec!(200));
    }

    #[test]
    fn sell_releases_cost_basis_at_avg() {
        let mut h = SpotHolding::new(Symbol::new("ETH"), dec!(2), px(dec!(3000)));
        let released = h.apply_sell(dec!(0.5), px(dec!(3500)));

        assert_eq!(released.value(), dec!(1500));
        assert_eq!(h.amount, dec!(1.5));
        // selling doesn't move the average
        assert_eq!(h.avg_cost.value(), dec!(3000));
        assert!(!h.is_empty());

        h.apply_sell(dec!(1.5), px(dec!(3500)));
        assert!(h.is_empty());
    }

    #[test]
    fn valuation_uses_last_price() {
        let mut h = SpotHolding::new(Symbol::new("SOL"), dec!(10), px(dec!(100)));
        h.last_price = px(dec!(110));

        assert_eq!(h.value().value(), dec!(1100));
        assert_eq!(h.profit_loss().value(), dec!(100));
        assert_eq!(h.profit_loss_pct(), dec!(10));
    }
}
