// Price Oracle
//
// The engine never talks to a price provider directly. It asks a PriceOracle for
// the latest quote of a symbol and treats any error, or a quote older than the
// configured max age, as "no price right now". Real providers are expected to
// serve from their own refreshed cache so a lookup never blocks on the network.

use crate::types::{Clock, Price, Symbol, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A price observation and the instant it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Price,
    pub as_of: Timestamp,
}

impl PriceQuote {
    pub fn new(price: Price, as_of: Timestamp) -> Self {
        Self { price, as_of }
    }

    pub fn age_ms(&self, now: Timestamp) -> i64 {
        self.as_of.millis_until(&now)
    }

    pub fn is_stale(&self, now: Timestamp, max_age_ms: u64) -> bool {
        let max_age = i64::try_from(max_age_ms).unwrap_or(i64::MAX);
        self.age_ms(now) > max_age
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no price source for {0}")]
    UnknownSymbol(Symbol),

    #[error("price for {symbol} unavailable: {reason}")]
    Unavailable { symbol: Symbol, reason: String },

    #[error("price for {symbol} is {age_ms}ms old")]
    Stale { symbol: Symbol, age_ms: i64 },
}

/// Anything that can quote a symbol.
pub trait PriceOracle: Send + Sync {
    fn get_price(&self, symbol: &Symbol) -> Result<PriceQuote, OracleError>;
}

impl<T: PriceOracle + ?Sized> PriceOracle for Arc<T> {
    fn get_price(&self, symbol: &Symbol) -> Result<PriceQuote, OracleError> {
        (**self).get_price(symbol)
    }
}

// lock poisoning only means another thread panicked mid-update; the maps stay usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy)]
struct StaticEntry {
    price: Price,
    // pinned observation time; None means "fresh at lookup"
    as_of: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct StaticState {
    prices: HashMap<Symbol, StaticEntry>,
    failing: HashSet<Symbol>,
}

/// Settable oracle for tests and scripted demos.
///
/// Clones share the same price table, so a caller can keep a handle after
/// handing one to the engine and move prices between cycles.
#[derive(Clone)]
pub struct StaticOracle {
    state: Arc<Mutex<StaticState>>,
    clock: Arc<dyn Clock>,
}

impl StaticOracle {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(StaticState::default())),
            clock: Arc::new(clock),
        }
    }

    /// Quote `price`, stamped with the clock's time at each lookup.
    pub fn set_price(&self, symbol: impl Into<Symbol>, price: Price) {
        lock(&self.state)
            .prices
            .insert(symbol.into(), StaticEntry { price, as_of: None });
    }

    /// Quote `price` as observed at a fixed instant (lets tests age a quote).
    pub fn set_quote(&self, symbol: impl Into<Symbol>, quote: PriceQuote) {
        lock(&self.state).prices.insert(
            symbol.into(),
            StaticEntry {
                price: quote.price,
                as_of: Some(quote.as_of),
            },
        );
    }

    pub fn remove(&self, symbol: &Symbol) {
        lock(&self.state).prices.remove(symbol);
    }

    /// Make lookups for `symbol` fail until `recover` is called.
    pub fn fail(&self, symbol: impl Into<Symbol>) {
        lock(&self.state).failing.insert(symbol.into());
    }

    pub fn recover(&self, symbol: &Symbol) {
        lock(&self.state).failing.remove(symbol);
    }
}

impl PriceOracle for StaticOracle {
    fn get_price(&self, symbol: &Symbol) -> Result<PriceQuote, OracleError> {
        let state = lock(&self.state);
        if state.failing.contains(symbol) {
            return Err(OracleError::Unavailable {
                symbol: symbol.clone(),
                reason: "feed offline".to_string(),
            });
        }
        let entry = state
            .prices
            .get(symbol)
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.clone()))?;
        Ok(PriceQuote::new(
            entry.price,
            entry.as_of.unwrap_or_else(|| self.clock.now()),
        ))
    }
}

/// Seeded random walk around a set of base prices, for the live demo.
///
/// Every lookup moves the symbol's price by a uniform step of at most
/// `volatility` (as a fraction), rounded to cents.
pub struct RandomWalkOracle {
    prices: Mutex<HashMap<Symbol, Decimal>>,
    rng: Mutex<StdRng>,
    volatility: f64,
    clock: Arc<dyn Clock>,
}

impl RandomWalkOracle {
    pub fn new(
        base_prices: impl IntoIterator<Item = (Symbol, Price)>,
        volatility: f64,
        seed: u64,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            prices: Mutex::new(
                base_prices
                    .into_iter()
                    .map(|(symbol, price)| (symbol, price.value()))
                    .collect(),
            ),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            volatility: volatility.abs(),
            clock: Arc::new(clock),
        }
    }
}

impl PriceOracle for RandomWalkOracle {
    fn get_price(&self, symbol: &Symbol) -> Result<PriceQuote, OracleError> {
        let mut prices = lock(&self.prices);
        let current = prices
            .get_mut(symbol)
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.clone()))?;

        let step = if self.volatility > 0.0 {
            lock(&self.rng).gen_range(-self.volatility..=self.volatility)
        } else {
            0.0
        };
        let factor = Decimal::from_f64(1.0 + step).unwrap_or(Decimal::ONE);
        let floor = Decimal::new(1, 2);
        *current = (*current * factor).round_dp(2).max(floor);

        let price = Price::new(*current).ok_or_else(|| OracleError::Unavailable {
            symbol: symbol.clone(),
            reason: "walk produced a non-positive price".to_string(),
        })?;
        Ok(PriceQuote::new(price, self.clock.now()))
    }
}
