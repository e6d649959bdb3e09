//! Position state machine: entry, trailing stop, exit and day rollover.
//!
//! Each closed execution candle is evaluated once, in a fixed order:
//! - an open position is checked for exit, then for a trailing-stop ratchet
//! - a position that is still open blocks any new entry
//! - when flat, the configured entry policy is evaluated against the range

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::models::{
    AccountState, Candle, Decision, DiscardReason, ExitReason, OpenPosition, PositionState, Side,
};

use super::{
    DailyRange, DayRolloverPolicy, EntryPolicy, ExitPolicy, Indicators, RiskSizer,
    StrategyConfig, StrategyError,
};

/// Market inputs for one evaluation cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    /// Latest closed execution candle
    pub candle: &'a Candle,
    /// Today's range, if established
    pub range: Option<&'a DailyRange>,
    /// Indicators over the recent window, if enough data was available
    pub indicators: Option<&'a Indicators>,
}

/// Decision plus the state snapshot taken right after the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub decision: Decision,
    pub position: PositionState,
    pub account: AccountState,
}

/// Entry levels proposed by an entry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySignal {
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Breakout through the range, confirmed by both averages and volume.
pub fn breakout_signal(
    candle: &Candle,
    range: &DailyRange,
    indicators: &Indicators,
    config: &StrategyConfig,
) -> Result<Option<EntrySignal>, StrategyError> {
    let close = candle.close;
    let atr = indicators.atr;
    let buffer = config.breakout_buffer_atr * atr;
    let volume_ok = candle.volume > indicators.avg_volume;

    let long = close > range.high + buffer
        && close > indicators.fast_avg
        && close > indicators.slow_avg
        && volume_ok;
    let short = close < range.low - buffer
        && close < indicators.fast_avg
        && close < indicators.slow_avg
        && volume_ok;

    let signal = match (long, short) {
        (true, true) => return Err(StrategyError::InconsistentSignal { close }),
        (false, false) => None,
        (true, false) => Some(EntrySignal {
            side: Side::Long,
            entry_price: close,
            stop_loss: close - config.stop_atr * atr,
            take_profit: close + config.target_atr * atr,
        }),
        (false, true) => Some(EntrySignal {
            side: Side::Short,
            entry_price: close,
            stop_loss: close + config.stop_atr * atr,
            take_profit: close - config.target_atr * atr,
        }),
    };
    Ok(signal)
}

/// Wick outside the range that closes back inside it.
///
/// A poke above the high is faded short with the stop at the high; a poke
/// below the low is faded long with the stop at the low. The target sits
/// `reward_ratio` stop distances away.
pub fn reversal_signal(
    candle: &Candle,
    range: &DailyRange,
    reward_ratio: Decimal,
) -> Result<Option<EntrySignal>, StrategyError> {
    let close = candle.close;
    let short = candle.high > range.high && close < range.high && close >= range.low;
    let long = candle.low < range.low && close > range.low && close <= range.high;

    let signal = match (long, short) {
        (true, true) => return Err(StrategyError::InconsistentSignal { close }),
        (false, false) => None,
        (true, false) => Some(EntrySignal {
            side: Side::Long,
            entry_price: close,
            stop_loss: range.low,
            take_profit: close + reward_ratio * (close - range.low),
        }),
        (false, true) => Some(EntrySignal {
            side: Side::Short,
            entry_price: close,
            stop_loss: range.high,
            take_profit: close - reward_ratio * (range.high - close),
        }),
    };
    Ok(signal)
}

/// New trailing level if price has run more than one ATR past the current one.
pub fn ratchet(position: &OpenPosition, close: Decimal, atr: Decimal) -> Option<Decimal> {
    match position.side {
        Side::Long if close - position.trailing_stop > atr => {
            Some(close - atr).filter(|level| *level > position.trailing_stop)
        }
        Side::Short if position.trailing_stop - close > atr => {
            Some(close + atr).filter(|level| *level < position.trailing_stop)
        }
        _ => None,
    }
}

/// Owns the position and account state for one symbol.
pub struct PositionStateMachine {
    config: StrategyConfig,
    sizer: RiskSizer,
    position: PositionState,
    account: AccountState,
    last_evaluated: Option<DateTime<Utc>>,
}

impl PositionStateMachine {
    pub fn new(config: StrategyConfig, account: AccountState) -> Self {
        let sizer = RiskSizer::from_config(&config);
        Self {
            config,
            sizer,
            position: PositionState::Flat,
            account,
            last_evaluated: None,
        }
    }

    /// Start from an existing position.
    pub fn with_position(mut self, position: PositionState) -> Self {
        self.position = position;
        self
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    fn snapshot(&self, decision: Decision) -> Cycle {
        Cycle {
            decision,
            position: self.position.clone(),
            account: self.account.clone(),
        }
    }

    /// Evaluate one closed candle.
    pub fn on_candle(&mut self, input: CycleInput<'_>) -> Cycle {
        let candle = input.candle;
        if self.last_evaluated.is_some_and(|last| candle.close_time <= last) {
            debug!(close_time = %candle.close_time, "Candle already evaluated");
            return self.snapshot(Decision::no_action("candle already evaluated"));
        }
        self.last_evaluated = Some(candle.close_time);

        let decision = match self.position.clone() {
            PositionState::Open(position) => self.manage_open(position, input),
            PositionState::Flat => self.try_enter(input),
        };
        self.snapshot(decision)
    }

    fn manage_open(&mut self, mut position: OpenPosition, input: CycleInput<'_>) -> Decision {
        let close = input.candle.close;

        if position.stop_hit(close) {
            let reason = if position.is_trailing() {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            // Stops fill at the stop level, not at the candle close.
            let fill = position.trailing_stop;
            return self.close_position(&position, fill, reason);
        }

        if position.target_hit(close) {
            return self.close_position(&position, close, ExitReason::TakeProfit);
        }

        if self.config.exit_policy == ExitPolicy::TrailingStop {
            if let Some(indicators) = input.indicators {
                if let Some(new_trailing) = ratchet(&position, close, indicators.atr) {
                    let previous_trailing = position.trailing_stop;
                    position.trailing_stop = new_trailing;
                    self.position = PositionState::Open(position.clone());
                    info!(
                        side = position.side.as_str(),
                        previous = %previous_trailing,
                        trailing = %new_trailing,
                        close = %close,
                        "Trailing stop raised"
                    );
                    return Decision::AdjustStop {
                        side: position.side,
                        previous_trailing,
                        new_trailing,
                    };
                }
            } else {
                debug!("No indicators this cycle, trailing stop unchanged");
            }
        }

        debug!(
            side = position.side.as_str(),
            close = %close,
            unrealized = %position.unrealized_pnl(close),
            "Holding position"
        );
        Decision::no_action("holding position")
    }

    fn signal(&self, input: CycleInput<'_>, range: &DailyRange) -> Result<Option<EntrySignal>, StrategyError> {
        match self.config.entry_policy {
            EntryPolicy::BreakoutConfirmed => {
                let indicators = input.indicators.ok_or_else(|| {
                    StrategyError::DataUnavailable("indicators not available".to_string())
                })?;
                breakout_signal(input.candle, range, indicators, &self.config)
            }
            EntryPolicy::ReversalIntoRange => {
                reversal_signal(input.candle, range, self.config.reward_ratio)
            }
        }
    }

    fn try_enter(&mut self, input: CycleInput<'_>) -> Decision {
        let Some(range) = input.range else {
            return Decision::no_action("daily range pending");
        };

        let signal = match self.signal(input, range) {
            Ok(Some(signal)) => signal,
            Ok(None) => return Decision::no_action("no entry signal"),
            Err(e) if e.is_data_shortage() => {
                debug!(error = %e, "Skipping entry evaluation");
                return Decision::no_action(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "Entry rejected");
                return Decision::no_action(e.to_string());
            }
        };

        let quantity = match self.sizer.size_for_levels(
            self.account.balance,
            signal.entry_price,
            signal.stop_loss,
        ) {
            Ok(quantity) => quantity,
            Err(e) => {
                warn!(error = %e, side = signal.side.as_str(), "Entry rejected by risk sizing");
                return Decision::no_action(e.to_string());
            }
        };

        self.position = PositionState::Open(OpenPosition {
            side: signal.side,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            trailing_stop: signal.stop_loss,
            quantity,
            opened_at: input.candle.close_time,
        });

        info!(
            side = signal.side.as_str(),
            entry = %signal.entry_price,
            stop = %signal.stop_loss,
            target = %signal.take_profit,
            quantity = %quantity,
            policy = self.config.entry_policy.as_str(),
            "Entered position"
        );

        Decision::Enter {
            side: signal.side,
            entry: signal.entry_price,
            stop: signal.stop_loss,
            target: signal.take_profit,
            quantity,
        }
    }

    fn close_position(
        &mut self,
        position: &OpenPosition,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> Decision {
        let pnl = position
            .side
            .pnl(position.entry_price, exit_price, position.quantity);
        self.account.apply_realized(pnl);
        self.position = PositionState::Flat;

        info!(
            side = position.side.as_str(),
            entry = %position.entry_price,
            exit = %exit_price,
            pnl = %pnl,
            reason = reason.as_str(),
            balance = %self.account.balance,
            "Exited position"
        );

        Decision::Exit {
            side: position.side,
            entry: position.entry_price,
            exit_price,
            quantity: position.quantity,
            pnl,
            reason,
        }
    }

    /// Force the machine flat because the trading day changed.
    ///
    /// `mark_price` is the latest known close; without one a settle policy
    /// falls back to discarding the position.
    pub fn roll_over(&mut self, mark_price: Option<Decimal>) -> Cycle {
        let PositionState::Open(position) = self.position.clone() else {
            return self.snapshot(Decision::no_action("flat at day rollover"));
        };

        match (self.config.rollover_policy, mark_price) {
            (DayRolloverPolicy::SettleAtMarket, Some(mark)) => {
                let decision = self.close_position(&position, mark, ExitReason::DayRollover);
                self.snapshot(decision)
            }
            (DayRolloverPolicy::SettleAtMarket, None) => {
                warn!("No mark price at day rollover");
                self.discard(DiscardReason::NoMarkPrice)
            }
            (DayRolloverPolicy::Discard, _) => self.discard(DiscardReason::DayRollover),
        }
    }

    /// Drop the open position without booking P&L.
    pub fn discard(&mut self, reason: DiscardReason) -> Cycle {
        let PositionState::Open(position) = std::mem::replace(&mut self.position, PositionState::Flat)
        else {
            return self.snapshot(Decision::no_action("nothing to discard"));
        };

        warn!(
            side = position.side.as_str(),
            entry = %position.entry_price,
            quantity = %position.quantity,
            reason = reason.as_str(),
            "Open position discarded"
        );
        self.snapshot(Decision::Discard {
            side: position.side,
            entry: position.entry_price,
            quantity: position.quantity,
            reason,
        })
    }
}
