//! Position state for the single traded symbol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// Realized P&L of a round trip in this direction.
    pub fn pnl(&self, entry_price: Decimal, exit_price: Decimal, quantity: Decimal) -> Decimal {
        match self {
            Side::Long => (exit_price - entry_price) * quantity,
            Side::Short => (entry_price - exit_price) * quantity,
        }
    }
}

/// An open simulated position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,

    /// Fill price at entry (the breakout candle's close)
    pub entry_price: Decimal,

    /// Initial protective stop
    pub stop_loss: Decimal,

    /// Profit target
    pub take_profit: Decimal,

    /// Active stop level; starts at `stop_loss` and only moves in the profitable direction
    pub trailing_stop: Decimal,

    /// Units held, always positive
    pub quantity: Decimal,

    /// Close time of the candle that opened the position
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    /// Mark-to-market P&L at the given price.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.side.pnl(self.entry_price, price, self.quantity)
    }

    /// Whether the active stop has been moved away from the initial stop.
    pub fn is_trailing(&self) -> bool {
        self.trailing_stop != self.stop_loss
    }

    /// Whether `price` has reached the active stop.
    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.trailing_stop,
            Side::Short => price >= self.trailing_stop,
        }
    }

    /// Whether `price` has reached the profit target.
    pub fn target_hit(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }
}

/// Position state: flat, or exactly one open position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(pos) => Some(pos),
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.open_position().map(|p| p.side)
    }
}
