//! Take-profit and stop-loss triggers attached to margin positions.
//!
//! Triggers live on the position itself and are evaluated by the monitor on
//! every refresh. A fired trigger settles at its own price, never at the
//! later observed mark.

use crate::position::{CloseReason, MarginPosition};
use crate::types::{Price, Side};
use serde::{Deserialize, Serialize};

/// Which attached level fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionalType {
    /// Price moved in favor of the position.
    TakeProfit,
    /// Price moved against the position.
    StopLoss,
}

impl From<ConditionalType> for CloseReason {
    fn from(kind: ConditionalType) -> Self {
        match kind {
            ConditionalType::TakeProfit => CloseReason::TakeProfit,
            ConditionalType::StopLoss => CloseReason::StopLoss,
        }
    }
}

/// How the trigger price should be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// Fires when price is at or above the trigger.
    Above,
    /// Fires when price is at or below the trigger.
    Below,
}

impl TriggerCondition {
    pub fn for_level(kind: ConditionalType, side: Side) -> Self {
        match (kind, side) {
            (ConditionalType::TakeProfit, Side::Long) => TriggerCondition::Above,
            (ConditionalType::TakeProfit, Side::Short) => TriggerCondition::Below,
            (ConditionalType::StopLoss, Side::Long) => TriggerCondition::Below,
            (ConditionalType::StopLoss, Side::Short) => TriggerCondition::Above,
        }
    }

    pub fn is_met(&self, mark_price: Price, trigger_price: Price) -> bool {
        match self {
            TriggerCondition::Above => mark_price.value() >= trigger_price.value(),
            TriggerCondition::Below => mark_price.value() <= trigger_price.value(),
        }
    }
}

/// A trigger that fired during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTrigger {
    pub kind: ConditionalType,
    pub trigger_price: Price,
}

/// Check a position's take-profit and stop-loss against the given mark.
///
/// If both levels are met at once (only possible with a gap through both),
/// the stop-loss wins.
pub fn evaluate_triggers(position: &MarginPosition, mark_price: Price) -> Option<FiredTrigger> {
    let check = |kind: ConditionalType, level: Option<Price>| {
        level.and_then(|trigger_price| {
            TriggerCondition::for_level(kind, position.side)
                .is_met(mark_price, trigger_price)
                .then_some(FiredTrigger { kind, trigger_price })
        })
    };

    check(ConditionalType::StopLoss, position.stop_loss)
        .or_else(|| check(ConditionalType::TakeProfit, position.take_profit))
}

/// Why a set of levels can't be attached at the given entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRejection {
    pub kind: ConditionalType,
    pub trigger_price: Price,
}

// a take-profit that is already met at entry would close the position on the
// first refresh. long: tp above entry, sl below. short: mirrored
pub fn validate_levels(
    side: Side,
    entry_price: Price,
    take_profit: Option<Price>,
    stop_loss: Option<Price>,
) -> Result<(), TriggerRejection> {
    let wrong_side = |kind: ConditionalType, level: Price| match TriggerCondition::for_level(kind, side) {
        TriggerCondition::Above => level <= entry_price,
        TriggerCondition::Below => level >= entry_price,
    };

    for (kind, level) in [
        (ConditionalType::TakeProfit, take_profit),
        (ConditionalType::StopLoss, stop_loss),
    ] {
        if let Some(trigger_price) = level {
            if wrong_side(kind, trigger_price) {
                return Err(TriggerRejection { kind, trigger_price });
            }
        }
    }

    Ok(())
}
