// 8.6 engine/settlement.rs: fixed-time bets. placement debits the stake up front, the sweep
// resolves due bets with a fresh price, force_settle is the audited override.

use super::core::{validate_price, Engine};
use super::results::{EngineError, SweepReport};
use crate::history::{EntryKind, LedgerEntry};
use crate::settlement::{BetResolution, FixedTimeBet, SettlementSource};
use crate::types::{BetId, Direction, Price, Quote, Symbol, Timestamp};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl Engine {
    /// Place a fixed-time bet. The stake is debited now; expiry is
    /// `now + duration_secs`.
    pub fn place_bet(
        &mut self,
        symbol: impl Into<Symbol>,
        direction: Direction,
        stake: Decimal,
        duration_secs: u64,
        entry_price: Decimal,
    ) -> Result<FixedTimeBet, EngineError> {
        let symbol = symbol.into();
        let entry_price = validate_price(entry_price)?;
        let stake = Quote::new(stake);

        let min_stake = self.config.settlement.min_stake;
        if stake < min_stake {
            return Err(EngineError::InvalidStake {
                stake,
                reason: format!("below minimum {}", min_stake),
            });
        }
        if stake > self.account.balance {
            return Err(EngineError::InvalidStake {
                stake,
                reason: format!("exceeds balance {}", self.account.balance),
            });
        }

        if duration_secs == 0 {
            return Err(EngineError::InvalidDuration {
                secs: duration_secs,
                reason: "must be positive".to_string(),
            });
        }
        let allowed = &self.config.settlement.allowed_durations;
        if !allowed.is_empty() && !allowed.contains(&duration_secs) {
            return Err(EngineError::InvalidDuration {
                secs: duration_secs,
                reason: format!("not one of {:?}", allowed),
            });
        }

        self.account.reserve(stake)?;

        let now = self.now();
        let bet = self
            .bets
            .place(symbol.clone(), direction, stake, entry_price, duration_secs, now)
            .clone();
        self.account.append(LedgerEntry::bet(
            EntryKind::BetStake,
            bet.id,
            symbol,
            entry_price,
            stake,
            now,
        ));

        info!(
            bet_id = %bet.id,
            symbol = %bet.symbol,
            %direction,
            %stake,
            %entry_price,
            expiry_at = %bet.expiry_at,
            "Bet placed"
        );
        self.commit();

        Ok(bet)
    }

    /// Resolve every active bet whose expiry has passed, in ascending id order.
    ///
    /// A bet whose symbol has no fresh price stays active and is retried on
    /// the next sweep. Re-running a sweep is harmless: settled bets are no
    /// longer due.
    pub fn sweep_bets(&mut self) -> SweepReport {
        let now = self.now();
        let mut report = SweepReport::default();
        // one lookup per symbol per sweep
        let mut quotes: HashMap<Symbol, Option<Price>> = HashMap::new();

        for id in self.bets.due(now) {
            let Some(symbol) = self.bets.get(id).map(|b| b.symbol.clone()) else {
                continue;
            };

            let price = match quotes.get(&symbol) {
                Some(cached) => *cached,
                None => {
                    let fetched = match self.fresh_quote(&symbol, now) {
                        Ok(quote) => {
                            self.note_price_success(&symbol);
                            Some(quote.price)
                        }
                        Err(e) => {
                            if let Some(warning) = self.note_price_failure(&symbol, &e) {
                                report.warnings.push(warning);
                            }
                            None
                        }
                    };
                    quotes.insert(symbol.clone(), fetched);
                    fetched
                }
            };

            let Some(exit_price) = price else {
                debug!(bet_id = %id, symbol = %symbol, "Bet due but no price, deferring");
                report.deferred.push(id);
                continue;
            };

            match self.resolve_bet(id, exit_price, now, SettlementSource::Sweep) {
                Ok(resolution) => report.settled.push(resolution),
                Err(e) => warn!(bet_id = %id, error = %e, "Bet resolution skipped"),
            }
        }

        if !report.settled.is_empty() || self.dirty {
            self.dirty = true;
            report.persisted = self.persist();
        }
        if let Some(warning) = self.persistence_warning() {
            report.warnings.push(warning);
        }
        report
    }

    /// Administrative override: settle `id` now at `price`, even before expiry.
    /// For testing and recovery only.
    pub fn force_settle(&mut self, id: BetId, price: Decimal) -> Result<BetResolution, EngineError> {
        let exit_price = validate_price(price)?;
        let now = self.now();

        if let Some(bet) = self.bets.get(id) {
            warn!(
                bet_id = %id,
                symbol = %bet.symbol,
                %exit_price,
                early_by_ms = bet.millis_remaining(now),
                "Forced settlement"
            );
        }

        let resolution = self.resolve_bet(id, exit_price, now, SettlementSource::Forced)?;
        self.commit();
        Ok(resolution)
    }

    // 8.6.1: the status check and transition happen inside BetBook::settle under
    // &mut self, so the credit below runs at most once per bet
    fn resolve_bet(
        &mut self,
        id: BetId,
        exit_price: Price,
        now: Timestamp,
        source: SettlementSource,
    ) -> Result<BetResolution, EngineError> {
        let settlement = &self.config.settlement;
        let resolution = self.bets.settle(
            id,
            exit_price,
            now,
            source,
            settlement.draw_policy,
            settlement.payout_rate,
        )?;

        if !resolution.payout.is_zero() {
            self.account.credit(resolution.payout);
        }
        self.account.record_bet_result(resolution.net());
        self.account.append(LedgerEntry::bet(
            EntryKind::BetSettle,
            id,
            resolution.symbol.clone(),
            exit_price,
            resolution.payout,
            now,
        ));

        info!(
            bet_id = %id,
            symbol = %resolution.symbol,
            status = ?resolution.status,
            %exit_price,
            payout = %resolution.payout,
            ?source,
            "Bet settled"
        );
        Ok(resolution)
    }
}
