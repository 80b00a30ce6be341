// 9.1 settlement.rs: fixed-time bets. a bet is placed active, and moves to won/lost/expired
// exactly once. the book only tracks state; cash moves happen in the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::DrawPolicy;
use crate::types::{BetId, Direction, Price, Quote, Symbol, Timestamp};

// Lifecycle of a bet. Won/Lost/Expired are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Active,
    Won,
    Lost,
    // draw refunded under DrawPolicy::Refund
    Expired,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Active)
    }
}

// Who moved the bet to its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementSource {
    Sweep,
    // administrative override with a supplied price
    Forced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedTimeBet {
    pub id: BetId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub stake: Quote,
    // captured at placement, never re-derived
    pub entry_price: Price,
    pub created_at: Timestamp,
    pub duration_secs: u64,
    pub expiry_at: Timestamp,
    pub status: BetStatus,
    pub exit_price: Option<Price>,
    pub payout: Option<Quote>,
    pub settled_at: Option<Timestamp>,
    pub settled_by: Option<SettlementSource>,
}

impl FixedTimeBet {
    pub fn is_active(&self) -> bool {
        self.status == BetStatus::Active
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active() && now >= self.expiry_at
    }

    pub fn millis_remaining(&self, now: Timestamp) -> i64 {
        now.millis_until(&self.expiry_at).max(0)
    }
}

// up wins on a strictly higher exit, down on a strictly lower one. equal is a draw
pub fn resolve_outcome(
    direction: Direction,
    entry_price: Price,
    exit_price: Price,
    draw_policy: DrawPolicy,
) -> BetStatus {
    let (entry, exit) = (entry_price.value(), exit_price.value());
    if entry == exit {
        return match draw_policy {
            DrawPolicy::Refund => BetStatus::Expired,
            DrawPolicy::Lose => BetStatus::Lost,
            DrawPolicy::Win => BetStatus::Won,
        };
    }

    let won = match direction {
        Direction::Up => exit > entry,
        Direction::Down => exit < entry,
    };
    if won {
        BetStatus::Won
    } else {
        BetStatus::Lost
    }
}

// cash returned to the balance for a terminal status
pub fn payout_for(status: BetStatus, stake: Quote, payout_rate: Decimal) -> Quote {
    match status {
        BetStatus::Won => stake.mul(Decimal::ONE + payout_rate),
        BetStatus::Expired => stake,
        BetStatus::Lost | BetStatus::Active => Quote::zero(),
    }
}

/// Result of moving one bet to its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetResolution {
    pub bet_id: BetId,
    pub symbol: Symbol,
    pub status: BetStatus,
    pub stake: Quote,
    pub exit_price: Price,
    pub payout: Quote,
    pub source: SettlementSource,
    pub settled_at: Timestamp,
}

impl BetResolution {
    // payout minus stake; what the bet added to or took from the books
    pub fn net(&self) -> Quote {
        self.payout.sub(self.stake)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BetError {
    #[error("Bet {0} not found")]
    NotFound(BetId),

    #[error("Bet {0} already settled")]
    AlreadySettled(BetId),
}

/// All bets ever placed, ascending by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetBook {
    bets: Vec<FixedTimeBet>,
    next_id: u64,
}

impl Default for BetBook {
    fn default() -> Self {
        Self::new()
    }
}

impl BetBook {
    pub fn new() -> Self {
        Self {
            bets: Vec::new(),
            next_id: 1,
        }
    }

    pub fn place(
        &mut self,
        symbol: Symbol,
        direction: Direction,
        stake: Quote,
        entry_price: Price,
        duration_secs: u64,
        now: Timestamp,
    ) -> &FixedTimeBet {
        let id = BetId(self.next_id);
        self.next_id += 1;

        self.bets.push(FixedTimeBet {
            id,
            symbol,
            direction,
            stake,
            entry_price,
            created_at: now,
            duration_secs,
            expiry_at: now.plus_secs(duration_secs),
            status: BetStatus::Active,
            exit_price: None,
            payout: None,
            settled_at: None,
            settled_by: None,
        });
        &self.bets[self.bets.len() - 1]
    }

    pub fn get(&self, id: BetId) -> Option<&FixedTimeBet> {
        // ids are allocated in push order
        self.bets
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|idx| &self.bets[idx])
    }

    pub fn all(&self) -> &[FixedTimeBet] {
        &self.bets
    }

    pub fn active(&self) -> impl Iterator<Item = &FixedTimeBet> {
        self.bets.iter().filter(|b| b.is_active())
    }

    /// Active bets whose expiry has passed, ascending id.
    pub fn due(&self, now: Timestamp) -> Vec<BetId> {
        self.bets.iter().filter(|b| b.is_due(now)).map(|b| b.id).collect()
    }

    pub fn settled_since(&self, since: Timestamp) -> impl Iterator<Item = &FixedTimeBet> {
        self.bets
            .iter()
            .filter(move |b| b.status.is_terminal() && b.settled_at.is_some_and(|t| t >= since))
    }

    pub fn active_stake(&self) -> Quote {
        self.active().map(|b| b.stake).sum()
    }

    /// Move an active bet to its terminal state. The status check and the
    /// transition happen under the same `&mut`, so a bet settles once.
    #[allow(clippy::too_many_arguments)]
    pub fn settle(
        &mut self,
        id: BetId,
        exit_price: Price,
        now: Timestamp,
        source: SettlementSource,
        draw_policy: DrawPolicy,
        payout_rate: Decimal,
    ) -> Result<BetResolution, BetError> {
        let idx = self
            .bets
            .binary_search_by_key(&id, |b| b.id)
            .map_err(|_| BetError::NotFound(id))?;
        let bet = &mut self.bets[idx];

        if bet.status != BetStatus::Active {
            return Err(BetError::AlreadySettled(id));
        }

        let status = resolve_outcome(bet.direction, bet.entry_price, exit_price, draw_policy);
        let payout = payout_for(status, bet.stake, payout_rate);

        bet.status = status;
        bet.exit_price = Some(exit_price);
        bet.payout = Some(payout);
        bet.settled_at = Some(now);
        bet.settled_by = Some(source);

        Ok(BetResolution {
            bet_id: id,
            symbol: bet.symbol.clone(),
            status,
            stake: bet.stake,
            exit_price,
            payout,
            source,
            settled_at: now,
        })
    }
}
