//! Solvency invariant tests.
//!
//! These tests verify that no sequence of operations can overdraw the
//! account or create or destroy capital, and that every bet settles once.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tradesim_core::*;

const SYMBOLS: [&str; 3] = ["BTC", "ETH", "SOL"];

// weighted average cost divides; everything else is exact
fn tolerance() -> Decimal {
    dec!(0.000001)
}

#[derive(Debug, Clone)]
enum Op {
    Buy { symbol: usize, amount: i64 },
    Sell { symbol: usize, percent: i64 },
    Open { symbol: usize, long: bool, size: i64, leverage: u32 },
    Close { index: usize },
    Bet { symbol: usize, up: bool, stake: i64, duration: u64 },
    Move { symbol: usize, percent: i64 },
    Advance { secs: u64 },
    Monitor,
    Sweep,
    Deposit { amount: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1i64..5_000i64).prop_map(|(symbol, amount)| Op::Buy { symbol, amount }),
        (0..3usize, 1i64..=100i64).prop_map(|(symbol, percent)| Op::Sell { symbol, percent }),
        (0..3usize, any::<bool>(), 1i64..5_000i64, 1u32..=20u32)
            .prop_map(|(symbol, long, size, leverage)| Op::Open { symbol, long, size, leverage }),
        (0..8usize).prop_map(|index| Op::Close { index }),
        (0..3usize, any::<bool>(), 100i64..2_000i64, 1u64..120u64)
            .prop_map(|(symbol, up, stake, duration)| Op::Bet { symbol, up, stake, duration }),
        (0..3usize, -30i64..=30i64).prop_map(|(symbol, percent)| Op::Move { symbol, percent }),
        (1u64..90u64).prop_map(|secs| Op::Advance { secs }),
        Just(Op::Monitor),
        Just(Op::Sweep),
        (1i64..5_000i64).prop_map(|amount| Op::Deposit { amount }),
    ]
}

struct Sim {
    engine: Engine,
    oracle: StaticOracle,
    clock: ManualClock,
    prices: [Decimal; 3],
}

impl Sim {
    fn new() -> Self {
        let clock = ManualClock::new(Timestamp::from_secs(0));
        let oracle = StaticOracle::new(clock.clone());
        let prices = [dec!(60000), dec!(3000), dec!(150)];
        for (symbol, price) in SYMBOLS.iter().zip(prices) {
            oracle.set_price(*symbol, Price::new_unchecked(price));
        }
        let engine =
            Engine::open(EngineConfig::default(), oracle.clone(), MemoryStore::new(), clock.clone()).unwrap();
        Self {
            engine,
            oracle,
            clock,
            prices,
        }
    }

    // operations may be rejected; rejection must not change anything either
    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Buy { symbol, amount } => {
                let amount = Decimal::new(amount, 3);
                let _ = self.engine.buy(SYMBOLS[symbol], self.prices[symbol], amount);
            }
            Op::Sell { symbol, percent } => {
                let held = self
                    .engine
                    .account()
                    .holding(&Symbol::new(SYMBOLS[symbol]))
                    .map(|h| h.amount);
                if let Some(held) = held {
                    let amount = held * Decimal::new(percent, 2);
                    let _ = self.engine.sell(SYMBOLS[symbol], self.prices[symbol], amount);
                }
            }
            Op::Open { symbol, long, size, leverage } => {
                let size = Decimal::new(size, 3);
                let side = if long { Side::Long } else { Side::Short };
                let request =
                    OpenPosition::new(SYMBOLS[symbol], side, self.prices[symbol], size, Decimal::from(leverage));
                let _ = self.engine.open_position(request);
            }
            Op::Close { index } => {
                let open = &self.engine.account().open_positions;
                if !open.is_empty() {
                    let id = open[index % open.len()].id;
                    let _ = self.engine.close_position(id, None);
                }
            }
            Op::Bet { symbol, up, stake, duration } => {
                let direction = if up { Direction::Up } else { Direction::Down };
                let _ = self.engine.place_bet(
                    SYMBOLS[symbol],
                    direction,
                    Decimal::from(stake),
                    duration,
                    self.prices[symbol],
                );
            }
            Op::Move { symbol, percent } => {
                let next = (self.prices[symbol] * (Decimal::ONE + Decimal::new(percent, 2))).round_dp(2);
                self.prices[symbol] = next.max(dec!(0.01));
                self.oracle
                    .set_price(SYMBOLS[symbol], Price::new_unchecked(self.prices[symbol]));
            }
            Op::Advance { secs } => self.clock.advance_secs(secs),
            Op::Monitor => {
                self.engine.run_monitor_cycle();
            }
            Op::Sweep => {
                self.engine.sweep_bets();
            }
            Op::Deposit { amount } => {
                let _ = self.engine.deposit(Decimal::from(amount));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Balance never goes negative and capital is conserved after every step
    #[test]
    fn balance_non_negative_and_conserved(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut sim = Sim::new();

        for op in &ops {
            sim.apply(op);
            let balance = sim.engine.balance().value();
            prop_assert!(balance >= Decimal::ZERO, "negative balance {} after {:?}", balance, op);

            let gap = sim.engine.conservation_gap();
            prop_assert!(gap.abs() <= tolerance(), "conservation gap {} after {:?}", gap, op);
        }
    }

    /// Open positions never carry negative margin and closed ones never reopen
    #[test]
    fn position_lists_stay_consistent(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut sim = Sim::new();

        for op in &ops {
            sim.apply(op);
            let account = sim.engine.account();
            for pos in &account.open_positions {
                prop_assert!(pos.is_open());
                prop_assert!(pos.margin_held.value() > Decimal::ZERO);
            }
            for pos in &account.closed_positions {
                prop_assert!(!pos.is_open());
                prop_assert!(account.open_position(pos.id).is_none());
            }
        }
    }

    /// Each bet pays out once, no matter how many sweeps run
    #[test]
    fn bets_settle_exactly_once(
        bets in proptest::collection::vec((any::<bool>(), 100i64..500i64, 1u64..60u64), 1..10),
        sweeps in 1usize..6,
        exit in 2_900i64..3_100i64,
    ) {
        let mut sim = Sim::new();
        for &(up, stake, duration) in &bets {
            let direction = if up { Direction::Up } else { Direction::Down };
            sim.engine
                .place_bet("ETH", direction, Decimal::from(stake), duration, dec!(3000))
                .unwrap();
        }
        sim.oracle.set_price("ETH", Price::new_unchecked(Decimal::from(exit)));
        sim.clock.advance_secs(60);

        let mut settled = Vec::new();
        for _ in 0..sweeps {
            settled.extend(sim.engine.sweep_bets().settled);
        }
        let balance = sim.engine.balance();
        sim.engine.tick();

        prop_assert_eq!(settled.len(), bets.len());
        let mut ids: Vec<BetId> = settled.iter().map(|r| r.bet_id).collect();
        ids.dedup();
        prop_assert_eq!(ids.len(), bets.len());
        prop_assert_eq!(sim.engine.balance(), balance);
        prop_assert!(sim.engine.active_bets().is_empty());
        prop_assert_eq!(sim.engine.conservation_gap(), Decimal::ZERO);
    }

    /// A bet that cannot be priced stays active until a price arrives, then settles once
    #[test]
    fn deferred_bets_settle_once_price_returns(
        stake in 100i64..1_000i64,
        outages in 1usize..5,
    ) {
        let mut sim = Sim::new();
        let bet = sim.engine
            .place_bet("SOL", Direction::Down, Decimal::from(stake), 30, dec!(150))
            .unwrap();
        sim.oracle.fail("SOL");
        sim.clock.advance_secs(31);

        for _ in 0..outages {
            let report = sim.engine.sweep_bets();
            prop_assert!(report.settled.is_empty());
            prop_assert_eq!(report.deferred.clone(), vec![bet.id]);
        }

        sim.oracle.recover(&Symbol::new("SOL"));
        sim.oracle.set_price("SOL", Price::new_unchecked(dec!(140)));
        let report = sim.engine.sweep_bets();
        prop_assert_eq!(report.settled.len(), 1);
        prop_assert_eq!(report.settled[0].status, BetStatus::Won);
        prop_assert!(sim.engine.sweep_bets().settled.is_empty());
    }
}

#[test]
fn failed_operation_leaves_ledger_untouched() {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(Timestamp::from_secs(0));
    let mut engine = Engine::open(
        EngineConfig::default(),
        StaticOracle::new(clock.clone()),
        store.clone(),
        clock,
    )
    .unwrap();

    let before = engine.account_snapshot();
    let saves = store.save_count();

    assert!(engine.buy("BTC", dec!(60000), dec!(1)).is_err());
    assert!(engine.sell("BTC", dec!(60000), dec!(1)).is_err());
    assert!(engine
        .open_position(OpenPosition::long("BTC", dec!(60000), dec!(10), dec!(2)))
        .is_err());
    assert!(engine
        .place_bet("BTC", Direction::Up, dec!(50000), 60, dec!(60000))
        .is_err());

    let after = engine.account();
    assert_eq!(after.balance, before.balance);
    assert_eq!(after.history.len(), before.history.len());
    assert!(after.portfolio.is_empty());
    assert!(after.open_positions.is_empty());
    assert_eq!(store.save_count(), saves);
}
