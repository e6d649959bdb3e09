//! Trade statistics: win rate, profit factor, drawdown, Sharpe-style ratio.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

/// Summary of a sequence of realized trade P&Ls.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub profit_factor: f64,
    pub expectancy: Decimal,

    /// Largest peak-to-trough drop of the balance curve, as a fraction of the peak
    pub max_drawdown: f64,
    pub max_drawdown_abs: Decimal,

    /// Mean over standard deviation of per-trade P&L (not annualized)
    pub sharpe_ratio: f64,
    pub final_balance: Decimal,
}

impl TradeStats {
    /// Compute statistics for `pnls` (oldest first) starting from `initial_balance`.
    pub fn from_pnls(initial_balance: Decimal, pnls: &[Decimal]) -> Self {
        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().partition(|&&p| p > Decimal::ZERO);

        let total_pnl: Decimal = pnls.iter().copied().sum();
        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();

        let mut stats = Self {
            total_trades: pnls.len() as u32,
            winning_trades: wins.len() as u32,
            losing_trades: losses.len() as u32,
            win_rate: 0.0,
            total_pnl,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            profit_factor: 0.0,
            expectancy: Decimal::ZERO,
            max_drawdown: 0.0,
            max_drawdown_abs: Decimal::ZERO,
            sharpe_ratio: 0.0,
            final_balance: initial_balance + total_pnl,
        };

        if pnls.is_empty() {
            return stats;
        }

        stats.win_rate = wins.len() as f64 / pnls.len() as f64;
        stats.expectancy = total_pnl / Decimal::from(pnls.len() as u32);

        if !wins.is_empty() {
            stats.avg_win = gross_profit / Decimal::from(wins.len() as u32);
        }
        if !losses.is_empty() {
            stats.avg_loss = gross_loss / Decimal::from(losses.len() as u32);
        }

        if gross_loss > Decimal::ZERO {
            stats.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        } else if gross_profit > Decimal::ZERO {
            stats.profit_factor = f64::INFINITY;
        }

        stats.calculate_drawdown(initial_balance, pnls);
        stats.calculate_sharpe(pnls);
        stats
    }

    fn calculate_drawdown(&mut self, initial_balance: Decimal, pnls: &[Decimal]) {
        let mut equity = initial_balance;
        let mut peak = initial_balance;

        for pnl in pnls {
            equity += pnl;
            peak = peak.max(equity);

            let dd = peak - equity;
            if dd > self.max_drawdown_abs {
                self.max_drawdown_abs = dd;
            }
            if peak > Decimal::ZERO {
                let dd_pct = dd.to_f64().unwrap_or(0.0) / peak.to_f64().unwrap_or(1.0);
                self.max_drawdown = self.max_drawdown.max(dd_pct);
            }
        }
    }

    fn calculate_sharpe(&mut self, pnls: &[Decimal]) {
        if pnls.len() < 2 {
            return;
        }

        let returns: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
        let mean = returns.iter().mean();
        let std_dev = returns.iter().std_dev();

        if std_dev > 0.0 {
            self.sharpe_ratio = mean / std_dev;
        }
    }
}

impl fmt::Display for TradeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trades:         {} ({} W / {} L)", self.total_trades, self.winning_trades, self.losing_trades)?;
        writeln!(f, "Win rate:       {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Total P&L:      {:.2}", self.total_pnl)?;
        writeln!(f, "Avg win/loss:   {:.2} / {:.2}", self.avg_win, self.avg_loss)?;
        writeln!(f, "Profit factor:  {:.2}", self.profit_factor)?;
        writeln!(f, "Expectancy:     {:.2}", self.expectancy)?;
        writeln!(
            f,
            "Max drawdown:   {:.2} ({:.1}%)",
            self.max_drawdown_abs,
            self.max_drawdown * 100.0
        )?;
        writeln!(f, "Sharpe (trade): {:.2}", self.sharpe_ratio)?;
        write!(f, "Balance:        {:.2}", self.final_balance)
    }
}
