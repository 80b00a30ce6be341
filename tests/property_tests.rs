//! Property-based tests for the core ledger math.
//!
//! These tests verify invariants hold under random inputs.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradesim_core::conditional::validate_levels;
use tradesim_core::position::{calculate_pnl, margin_required, settle_close};
use tradesim_core::settlement::{payout_for, resolve_outcome};
use tradesim_core::*;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $1 to $100,000
}

fn size_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 10
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=20u32).prop_map(Decimal::from)
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn lev(value: Decimal) -> Leverage {
    Leverage::new(value).unwrap()
}

fn position(side: Side, entry: Decimal, size: Decimal, leverage: Decimal) -> MarginPosition {
    MarginPosition::open(
        PositionId(1),
        Symbol::new("BTC"),
        side,
        size,
        lev(leverage),
        px(entry),
        None,
        None,
        Timestamp::from_secs(0),
    )
}

proptest! {
    /// PnL is zero when mark = entry
    #[test]
    fn pnl_zero_at_entry(
        side in side_strategy(),
        size in size_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let pnl = calculate_pnl(side, size, lev(leverage), px(entry), px(entry));
        prop_assert_eq!(pnl.value(), Decimal::ZERO);
    }

    /// Longs profit on a rise, shorts on a fall, and the magnitude is |delta| * size * leverage
    #[test]
    fn pnl_sign_and_magnitude(
        side in side_strategy(),
        size in size_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
        delta in -5_000i64..=5_000i64,
    ) {
        let mark = entry + Decimal::new(delta, 2);
        prop_assume!(mark > Decimal::ZERO);

        let pnl = calculate_pnl(side, size, lev(leverage), px(entry), px(mark));
        let expected_magnitude = (mark - entry).abs() * size * leverage;
        prop_assert_eq!(pnl.abs().value(), expected_magnitude);

        let favourable = match side {
            Side::Long => mark > entry,
            Side::Short => mark < entry,
        };
        if mark != entry {
            prop_assert_eq!(pnl.value() > Decimal::ZERO, favourable);
        }
    }

    /// Long and short of the same size mirror each other
    #[test]
    fn long_and_short_pnl_are_opposite(
        size in size_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let long = calculate_pnl(Side::Long, size, lev(leverage), px(entry), px(mark));
        let short = calculate_pnl(Side::Short, size, lev(leverage), px(entry), px(mark));
        prop_assert_eq!(long.add(short), Quote::zero());
    }

    /// Margin times leverage recovers the entry notional
    #[test]
    fn margin_scales_inversely_with_leverage(
        size in size_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let margin = margin_required(px(entry), size, lev(leverage));
        let notional = entry * size;
        let diff = (margin.value() * leverage - notional).abs();
        prop_assert!(diff < dec!(0.000001), "margin {} x{} vs notional {}", margin, leverage, notional);
    }

    /// A close never credits less than zero and never more than margin + pnl
    #[test]
    fn close_credit_is_bounded(
        side in side_strategy(),
        size in size_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let pos = position(side, entry, size, leverage);
        let settlement = settle_close(&pos, px(mark), dec!(0.001));

        prop_assert!(settlement.credit.value() >= Decimal::ZERO);
        prop_assert!(settlement.fee.value() >= Decimal::ZERO);
        prop_assert!(settlement.realized_pnl >= pos.margin_held.negate());
        // what comes back is margin + realized - fee
        prop_assert_eq!(
            settlement.credit,
            pos.margin_held.add(settlement.realized_pnl).sub(settlement.fee)
        );
    }

    /// Weighted average cost lies between the lowest and highest fill
    #[test]
    fn average_cost_between_fills(
        fills in proptest::collection::vec((price_strategy(), size_strategy()), 1..10),
    ) {
        let (first_price, first_amount) = fills[0];
        let mut holding = SpotHolding::new(Symbol::new("ETH"), first_amount, px(first_price));
        for &(price, amount) in &fills[1..] {
            holding.apply_buy(amount, px(price));
        }

        let lo = fills.iter().map(|f| f.0).min().unwrap();
        let hi = fills.iter().map(|f| f.0).max().unwrap();
        let avg = holding.avg_cost.value();
        let tolerance = dec!(0.000001);
        prop_assert!(avg >= lo - tolerance && avg <= hi + tolerance, "avg {} outside [{}, {}]", avg, lo, hi);

        let total: Decimal = fills.iter().map(|f| f.1).sum();
        prop_assert_eq!(holding.amount, total);
    }

    /// Cost basis released by partial sells adds back up to the original basis
    #[test]
    fn sells_release_cost_basis_proportionally(
        price in price_strategy(),
        amount in 2i64..100_000i64,
        sell_fraction in 1i64..100i64,
    ) {
        let amount = Decimal::new(amount, 4);
        let mut holding = SpotHolding::new(Symbol::new("ETH"), amount, px(price));
        let before = holding.cost_basis();

        let sold = amount * Decimal::new(sell_fraction, 2);
        let released = holding.apply_sell(sold, px(price));

        prop_assert_eq!(released.add(holding.cost_basis()), before);
        prop_assert_eq!(holding.avg_cost.value(), price);
    }

    /// Stop-loss and take-profit fire exactly when the mark crosses their level
    #[test]
    fn triggers_fire_on_crossing(
        side in side_strategy(),
        entry in 1_000i64..100_000i64,
        offset in 1i64..500i64,
        mark in 1i64..200_000i64,
    ) {
        let entry = Decimal::from(entry);
        let offset = Decimal::from(offset);
        let (tp, sl) = match side {
            Side::Long => (entry + offset, entry - offset),
            Side::Short => (entry - offset, entry + offset),
        };
        prop_assume!(tp > Decimal::ZERO && sl > Decimal::ZERO);

        let mut pos = position(side, entry, dec!(1), dec!(2));
        pos.take_profit = Some(px(tp));
        pos.stop_loss = Some(px(sl));
        let mark = Decimal::from(mark);

        let fired = evaluate_triggers(&pos, px(mark));
        let sl_hit = match side {
            Side::Long => mark <= sl,
            Side::Short => mark >= sl,
        };
        let tp_hit = match side {
            Side::Long => mark >= tp,
            Side::Short => mark <= tp,
        };

        match fired {
            Some(f) if f.kind == ConditionalType::StopLoss => {
                prop_assert!(sl_hit);
                prop_assert_eq!(f.trigger_price.value(), sl);
            }
            Some(f) => {
                prop_assert!(tp_hit && !sl_hit);
                prop_assert_eq!(f.trigger_price.value(), tp);
            }
            None => prop_assert!(!sl_hit && !tp_hit),
        }
    }

    /// Levels on the correct side of entry are always accepted
    #[test]
    fn well_placed_levels_validate(
        side in side_strategy(),
        entry in 1_000i64..100_000i64,
        offset in 1i64..500i64,
    ) {
        let entry = Decimal::from(entry);
        let offset = Decimal::from(offset);
        let (tp, sl) = match side {
            Side::Long => (entry + offset, entry - offset),
            Side::Short => (entry - offset, entry + offset),
        };
        prop_assert!(validate_levels(side, px(entry), Some(px(tp)), Some(px(sl))).is_ok());
        // swapped levels are always on the wrong side
        prop_assert!(validate_levels(side, px(entry), Some(px(sl)), None).is_err());
    }

    /// A winning bet pays stake * (1 + rate); a loss pays nothing
    #[test]
    fn bet_payout_matches_outcome(
        up in any::<bool>(),
        entry in price_strategy(),
        exit in price_strategy(),
        stake in 100i64..10_000i64,
    ) {
        let direction = if up { Direction::Up } else { Direction::Down };
        let stake = Quote::new(Decimal::from(stake));
        let status = resolve_outcome(direction, px(entry), px(exit), DrawPolicy::Lose);
        let payout = payout_for(status, stake, dec!(0.85));

        let won = if up { exit > entry } else { exit < entry };
        if won {
            prop_assert_eq!(status, BetStatus::Won);
            prop_assert_eq!(payout, stake.mul(dec!(1.85)));
        } else {
            prop_assert_eq!(status, BetStatus::Lost);
            prop_assert_eq!(payout, Quote::zero());
        }
    }

    /// No sweep before expiry resolves a bet, whatever the price does
    #[test]
    fn no_resolution_before_expiry(
        duration in 1u64..3_600u64,
        steps in proptest::collection::vec((0i64..5_000i64, price_strategy()), 1..10),
    ) {
        let clock = ManualClock::new(Timestamp::from_secs(0));
        let oracle = StaticOracle::new(clock.clone());
        let mut engine =
            Engine::open(EngineConfig::default(), oracle.clone(), MemoryStore::new(), clock.clone()).unwrap();

        let bet = engine.place_bet("BTC", Direction::Up, dec!(100), duration, dec!(60000)).unwrap();
        let expiry_ms = bet.expiry_at.as_millis();

        for (ms, price) in steps {
            let at = ms.min(expiry_ms - 1);
            clock.set(Timestamp::from_millis(at));
            oracle.set_price("BTC", px(price));
            let report = engine.sweep_bets();
            prop_assert!(report.settled.is_empty());
            prop_assert_eq!(engine.bet(bet.id).unwrap().status, BetStatus::Active);
        }

        clock.set(bet.expiry_at);
        let report = engine.sweep_bets();
        prop_assert_eq!(report.settled.len(), 1);
    }
}
