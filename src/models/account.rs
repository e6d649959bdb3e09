//! Paper account: balance and trade counters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Simulated account state, mutated only when a position is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Cash balance in quote currency
    pub balance: Decimal,

    /// Number of closed trades
    pub trades_count: u32,

    /// Closed trades with positive P&L
    pub wins: u32,

    /// Closed trades with zero or negative P&L
    pub losses: u32,
}

impl AccountState {
    /// Fresh account with no trade history.
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            trades_count: 0,
            wins: 0,
            losses: 0,
        }
    }

    /// Apply realized P&L from a closed trade.
    pub fn apply_realized(&mut self, pnl: Decimal) {
        self.balance += pnl;
        self.trades_count += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
    }

    /// Win rate (0.0 to 1.0).
    pub fn win_rate(&self) -> f64 {
        if self.trades_count == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades_count as f64
    }
}
