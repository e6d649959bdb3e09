//! Per-cycle decisions emitted by the strategy.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    DayRollover,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::DayRollover => "day_rollover",
        }
    }
}

/// Why an open position was dropped without booking P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// Day rolled over under the discard policy
    DayRollover,
    /// Day rolled over with no price to settle at
    NoMarkPrice,
    /// Bot stopped while in a position
    Shutdown,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::DayRollover => "day_rollover",
            DiscardReason::NoMarkPrice => "no_mark_price",
            DiscardReason::Shutdown => "shutdown",
        }
    }
}

/// Outcome of evaluating one closed candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    NoAction {
        reason: String,
    },
    Enter {
        side: Side,
        entry: Decimal,
        stop: Decimal,
        target: Decimal,
        quantity: Decimal,
    },
    Exit {
        side: Side,
        entry: Decimal,
        exit_price: Decimal,
        quantity: Decimal,
        pnl: Decimal,
        reason: ExitReason,
    },
    AdjustStop {
        side: Side,
        previous_trailing: Decimal,
        new_trailing: Decimal,
    },
    /// Position closed without a fill; the account is untouched.
    Discard {
        side: Side,
        entry: Decimal,
        quantity: Decimal,
        reason: DiscardReason,
    },
}

impl Decision {
    pub fn no_action(reason: impl Into<String>) -> Self {
        Decision::NoAction {
            reason: reason.into(),
        }
    }

    /// Short tag used in the trade journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::NoAction { .. } => "NO_ACTION",
            Decision::Enter { .. } => "ENTER",
            Decision::Exit { .. } => "EXIT",
            Decision::AdjustStop { .. } => "ADJUST_STOP",
            Decision::Discard { .. } => "DISCARD",
        }
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self, Decision::NoAction { .. })
    }

    /// Realized P&L, for exits only.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        match self {
            Decision::Exit { pnl, .. } => Some(*pnl),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoAction { reason } => write!(f, "no action ({})", reason),
            Decision::Enter {
                side,
                entry,
                stop,
                target,
                quantity,
            } => write!(
                f,
                "{} {} @ {} | SL: {} | TP: {}",
                side.as_str(),
                quantity,
                entry,
                stop,
                target
            ),
            Decision::Exit {
                side,
                entry,
                exit_price,
                pnl,
                reason,
                ..
            } => write!(
                f,
                "EXIT {} {} -> {} | PnL: {} ({})",
                side.as_str(),
                entry,
                exit_price,
                pnl,
                reason.as_str()
            ),
            Decision::AdjustStop {
                side,
                previous_trailing,
                new_trailing,
            } => write!(
                f,
                "TRAIL {} stop {} -> {}",
                side.as_str(),
                previous_trailing,
                new_trailing
            ),
            Decision::Discard {
                side,
                entry,
                quantity,
                reason,
            } => write!(
                f,
                "DISCARD {} {} @ {} ({})",
                side.as_str(),
                quantity,
                entry,
                reason.as_str()
            ),
        }
    }
}
