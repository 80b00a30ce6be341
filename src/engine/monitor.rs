// 8.5 engine/monitor.rs: one mark-to-market pass. refresh prices, re-mark holdings and
// positions, fire TP/SL and margin-exhaustion closes, save once.

use super::core::Engine;
use super::results::MonitorReport;
use crate::conditional::evaluate_triggers;
use crate::position::CloseReason;
use crate::types::{PositionId, Price, Symbol};
use std::collections::HashMap;
use tracing::{debug, warn};

impl Engine {
    /// Run one monitor cycle.
    ///
    /// A symbol whose lookup fails keeps its previous price; positions on it
    /// are still evaluated against that retained price.
    pub fn run_monitor_cycle(&mut self) -> MonitorReport {
        let now = self.now();
        let mut report = MonitorReport::default();
        let mut marks: HashMap<Symbol, Price> = HashMap::new();

        for symbol in self.account.tracked_symbols() {
            match self.fresh_quote(&symbol, now) {
                Ok(quote) => {
                    self.note_price_success(&symbol);
                    marks.insert(symbol.clone(), quote.price);
                    report.symbols_refreshed.push(symbol);
                }
                Err(e) => {
                    if let Some(warning) = self.note_price_failure(&symbol, &e) {
                        report.warnings.push(warning);
                    }
                    report.symbols_failed.push(symbol);
                }
            }
        }

        for holding in self.account.portfolio.values_mut() {
            if let Some(mark) = marks.get(&holding.symbol) {
                holding.last_price = *mark;
            }
        }
        for position in self.account.open_positions.iter_mut() {
            if let Some(mark) = marks.get(&position.symbol) {
                position.last_price = *mark;
            }
        }

        let liquidate = self.config.monitor.liquidate_on_margin_exhaustion;
        let mut ids: Vec<PositionId> = self.account.open_positions.iter().map(|p| p.id).collect();
        ids.sort();

        for id in ids {
            let Some(position) = self.account.open_position(id) else {
                continue;
            };
            let mark = position.last_price;

            // a fired trigger settles at its own level, not at the mark
            let action = match evaluate_triggers(position, mark) {
                Some(fired) => Some((fired.trigger_price, CloseReason::from(fired.kind))),
                None if liquidate && position.is_margin_exhausted(mark) => {
                    Some((mark, CloseReason::Liquidated))
                }
                None => None,
            };

            if let Some((price, reason)) = action {
                match self.close_at(id, price, reason) {
                    Ok(closed) => report.closed.push(closed),
                    Err(e) => warn!(position_id = %id, error = %e, "Auto-close failed"),
                }
            }
        }

        report.unrealized_pnl = self
            .account
            .open_positions
            .iter()
            .map(|p| p.current_pnl())
            .sum();

        let changed = !report.symbols_refreshed.is_empty() || !report.closed.is_empty();
        if changed || self.dirty {
            self.dirty = true;
            report.persisted = self.persist();
        }
        if let Some(warning) = self.persistence_warning() {
            report.warnings.push(warning);
        }

        debug!(
            refreshed = report.symbols_refreshed.len(),
            failed = report.symbols_failed.len(),
            closed = report.closed.len(),
            unrealized_pnl = %report.unrealized_pnl,
            "Monitor cycle complete"
        );
        report
    }
}
