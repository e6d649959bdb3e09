//! Bot runner: polling loop around the decision engine.
//!
//! Each cycle:
//! - Rolls the trading day, settling or discarding a position left open
//! - Skips evaluation outside the trading window
//! - Fetches closed execution candles and today's range
//! - Feeds the latest candle through the position state machine
//! - Journals the decision and persists the account

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::{BinanceClient, CandleSource};
use crate::db::Database;
use crate::models::{Decision, DiscardReason, PositionState};
use crate::schedule::{Clock, RetryPolicy, SystemClock, TradingWindow};
use crate::trading::{
    Cycle, CycleInput, DayChange, IndicatorSet, PositionStateMachine, RangeStatus, RangeTracker,
    StrategyConfig,
};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Traded symbol, e.g. BTCUSDT
    pub symbol: String,

    /// Paper balance used when no account is stored yet
    pub initial_balance: Decimal,

    /// Seconds between cycles
    pub poll_interval_secs: u64,

    /// Seconds between heartbeat log lines
    pub heartbeat_secs: u64,

    /// Execution candles fetched per cycle (raised to what the indicators need)
    pub lookback_candles: usize,

    /// Backoff after a failed cycle
    pub retry: RetryPolicy,

    /// Time of day during which candles are evaluated
    pub window: TradingWindow,

    /// Database URL
    pub database_url: String,

    /// Market data REST base URL
    pub api_url: String,

    /// Strategy configuration
    pub strategy: StrategyConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            initial_balance: dec!(10000),
            poll_interval_secs: 300,
            heartbeat_secs: 900,
            lookback_candles: 100,
            retry: RetryPolicy::default(),
            window: TradingWindow::default(),
            database_url: "sqlite:breakout.db?mode=rwc".to_string(),
            api_url: crate::api::BINANCE_API_BASE.to_string(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl BotConfig {
    /// Candles to request per cycle: at least one more than the indicators need.
    pub fn candles_per_cycle(&self) -> usize {
        self.lookback_candles.max(self.strategy.required_candles() + 1)
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Outside the trading window; `wait` until it opens
    Outside { wait: Option<Duration> },
    /// Nothing to evaluate this cycle
    Skipped { reason: String },
    /// The latest candle went through the state machine
    Evaluated(Cycle),
}

/// Main bot runner.
pub struct Bot<S, C = SystemClock> {
    config: BotConfig,
    db: Database,
    source: S,
    clock: C,
    tracker: RangeTracker,
    indicators: IndicatorSet,
    machine: PositionStateMachine,

    // Runtime state
    last_close: Option<Decimal>,
    last_heartbeat: Option<DateTime<Utc>>,
    /// Cycles whose decision is not in the journal yet, oldest first
    unpersisted: VecDeque<(Cycle, Option<DateTime<Utc>>)>,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot<BinanceClient, SystemClock> {
    /// Connect to the database and the exchange described by `config`.
    pub async fn connect(config: BotConfig) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;
        let source = BinanceClient::with_base_url(config.api_url.clone())?;
        Self::new(config, db, source, SystemClock).await
    }
}

impl<S: CandleSource, C: Clock> Bot<S, C> {
    /// Build a bot, restoring the account for the configured symbol.
    pub async fn new(config: BotConfig, db: Database, source: S, clock: C) -> Result<Self> {
        config
            .strategy
            .validate()
            .context("Invalid strategy configuration")?;

        let account = db
            .load_account(&config.symbol, config.initial_balance)
            .await
            .context("Failed to restore account")?;

        if account.trades_count > 0 {
            info!(
                balance = %account.balance,
                trades = account.trades_count,
                wins = account.wins,
                losses = account.losses,
                "Resuming from previous session"
            );
        }

        let strategy = config.strategy.clone();
        Ok(Self {
            tracker: RangeTracker::new(strategy.reference_interval, strategy.reference_timezone),
            indicators: IndicatorSet::from_config(&strategy),
            machine: PositionStateMachine::new(strategy, account),
            config,
            db,
            source,
            clock,
            last_close: None,
            last_heartbeat: None,
            unpersisted: VecDeque::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn machine(&self) -> &PositionStateMachine {
        &self.machine
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            symbol = %self.config.symbol,
            poll_interval = self.config.poll_interval_secs,
            entry_policy = %self.config.strategy.entry_policy,
            exit_policy = %self.config.strategy.exit_policy,
            timezone = %self.config.strategy.reference_timezone,
            "Starting bot run loop"
        );

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        let poll = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut retry = self.config.retry.to_backoff();

        while !self.shutdown.load(Ordering::SeqCst) {
            let wait = match self.tick().await {
                Ok(TickOutcome::Outside { wait }) => {
                    retry.reset();
                    debug!(wait = ?wait, "Outside trading window");
                    wait.map_or(poll, |w| w.min(poll))
                }
                Ok(_) => {
                    retry.reset();
                    poll
                }
                Err(e) => {
                    let delay = retry.next_backoff().unwrap_or(poll);
                    error!(error = %format!("{:#}", e), retry_in = ?delay, "Error in bot cycle");
                    delay
                }
            };
            self.sleep(wait).await;
        }

        // Graceful shutdown
        self.shutdown().await?;

        Ok(())
    }

    /// Sleep in short steps so a shutdown request is noticed promptly.
    async fn sleep(&self, total: Duration) {
        let step = Duration::from_secs(1);
        let mut remaining = total;
        while !remaining.is_zero() && !self.shutdown.load(Ordering::SeqCst) {
            let chunk = remaining.min(step);
            tokio::time::sleep(chunk).await;
            remaining -= chunk;
        }
    }

    /// Single iteration of the main loop.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let now = self.clock.now();
        let tz = self.config.strategy.reference_timezone;
        let today = tz.trading_day(now);

        // 0. Journal writes left over from a failed cycle
        self.flush_journal().await?;

        // 1. Day rollover
        match self.tracker.roll_day(today) {
            Ok(DayChange::NewDay { previous }) => self.settle_day(previous).await?,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Keeping current trading day"),
        }

        // 2. Trading window gate
        if !self.config.window.is_open(&tz, now) {
            let wait = self.config.window.until_open(&tz, now);
            self.heartbeat(now);
            return Ok(TickOutcome::Outside { wait });
        }

        // 3. Closed execution candles
        let symbol = self.config.symbol.clone();
        let candles = self
            .source
            .fetch_candles(
                &symbol,
                self.config.strategy.execution_interval,
                self.config.candles_per_cycle(),
            )
            .await
            .context("Failed to fetch execution candles")?;

        let Some(latest) = candles.last() else {
            return Ok(TickOutcome::Skipped {
                reason: "no closed candles".to_string(),
            });
        };
        self.last_close = Some(latest.close);

        // 4. Today's range
        let range = match self.tracker.ensure_range(&self.source, &symbol).await {
            Ok(RangeStatus::Ready(range)) => Some(range),
            Ok(RangeStatus::Pending) => None,
            Err(e) => {
                warn!(error = %e, "Daily range unavailable");
                None
            }
        };

        // 5. Indicators
        let indicators = match self.indicators.compute(&candles) {
            Ok(indicators) => Some(indicators),
            Err(e) => {
                if self.config.strategy.needs_indicators() {
                    warn!(error = %e, candles = candles.len(), "Indicators unavailable");
                } else {
                    debug!(error = %e, "Indicators unavailable");
                }
                None
            }
        };

        // 6. Transition
        let cycle = self.machine.on_candle(CycleInput {
            candle: latest,
            range: range.as_ref(),
            indicators: indicators.as_ref(),
        });
        debug!(
            close = %latest.close,
            close_time = %latest.close_time,
            decision = %cycle.decision,
            "Cycle evaluated"
        );

        // 7. Persist
        let candle_time = latest.close_time;
        self.persist(&cycle, Some(candle_time)).await?;

        self.heartbeat(now);
        Ok(TickOutcome::Evaluated(cycle))
    }

    /// Close out whatever the previous trading day left open.
    async fn settle_day(&mut self, previous: chrono::NaiveDate) -> Result<()> {
        if self.machine.position().is_flat() {
            return Ok(());
        }

        let mark = match self
            .source
            .fetch_candles(
                &self.config.symbol,
                self.config.strategy.execution_interval,
                1,
            )
            .await
        {
            Ok(candles) => candles.last().map(|c| c.close).or(self.last_close),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "No fresh mark price, using last known close");
                self.last_close
            }
        };

        info!(day = %previous, mark = ?mark, "Trading day ended with an open position");
        let cycle = self.machine.roll_over(mark);
        self.persist(&cycle, None).await
    }

    /// Queue the cycle's decision for the journal and write everything queued.
    async fn persist(&mut self, cycle: &Cycle, candle_time: Option<DateTime<Utc>>) -> Result<()> {
        if !cycle.decision.is_no_action() {
            self.unpersisted.push_back((cycle.clone(), candle_time));
        }
        self.flush_journal().await
    }

    /// Write queued decisions in order. A failed write stays queued for the next cycle.
    async fn flush_journal(&mut self) -> Result<()> {
        while let Some((cycle, candle_time)) = self.unpersisted.front() {
            // Account first: the upsert is safe to repeat, the journal insert is not
            if matches!(cycle.decision, Decision::Exit { .. }) {
                self.db
                    .save_account(&self.config.symbol, &cycle.account)
                    .await
                    .context("Failed to save account")?;
            }

            self.db
                .record_decision(
                    &self.config.symbol,
                    &cycle.decision,
                    cycle.account.balance,
                    *candle_time,
                )
                .await?;

            self.unpersisted.pop_front();
        }
        Ok(())
    }

    fn heartbeat(&mut self, now: DateTime<Utc>) {
        let due = self.last_heartbeat.map_or(true, |last| {
            (now - last).num_seconds() >= self.config.heartbeat_secs as i64
        });
        if !due {
            return;
        }
        self.last_heartbeat = Some(now);

        let account = self.machine.account();
        match self.machine.position() {
            PositionState::Flat => info!(
                balance = %account.balance,
                trades = account.trades_count,
                range = ?self.tracker.range().map(|r| (r.low, r.high)),
                "Heartbeat: flat"
            ),
            PositionState::Open(pos) => info!(
                balance = %account.balance,
                trades = account.trades_count,
                side = pos.side.as_str(),
                entry = %pos.entry_price,
                trailing = %pos.trailing_stop,
                target = %pos.take_profit,
                unrealized = %self.last_close.map(|c| pos.unrealized_pnl(c)).unwrap_or_default(),
                "Heartbeat: in position"
            ),
        }
    }

    /// Graceful shutdown: journal the dropped position and persist the account.
    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down bot...");

        if !self.machine.position().is_flat() {
            let cycle = self.machine.discard(DiscardReason::Shutdown);
            self.persist(&cycle, None).await?;
        } else {
            self.flush_journal().await?;
        }

        let account = self.machine.account().clone();
        self.db.save_account(&self.config.symbol, &account).await?;

        info!(
            balance = %account.balance,
            trades = account.trades_count,
            win_rate = %format!("{:.1}%", account.win_rate() * 100.0),
            "Bot shutdown complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedSource;
    use crate::models::{Candle, ExitReason, Interval, Side};
    use crate::schedule::ReferenceTimezone;
    use crate::trading::{DailyRange, DayRolloverPolicy, ExitPolicy};
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(t: DateTime<Utc>) -> Self {
            Self(Mutex::new(t))
        }

        fn set(&self, t: DateTime<Utc>) {
            *self.0.lock().unwrap() = t;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn utc(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, s).unwrap()
    }

    fn exec(open: DateTime<Utc>, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Candle {
        Candle {
            open: close,
            high,
            low,
            close,
            volume,
            open_time: open,
            close_time: open + ChronoDuration::minutes(5) - ChronoDuration::milliseconds(1),
        }
    }

    fn reference(open: DateTime<Utc>, high: Decimal, low: Decimal) -> Candle {
        Candle {
            open: low,
            high,
            low,
            close: high,
            volume: dec!(100),
            open_time: open,
            close_time: open + ChronoDuration::hours(4) - ChronoDuration::milliseconds(1),
        }
    }

    fn config() -> BotConfig {
        BotConfig {
            lookback_candles: 4,
            window: TradingWindow::always(),
            strategy: StrategyConfig {
                reference_timezone: ReferenceTimezone::Fixed { offset_hours: 0 },
                exit_policy: ExitPolicy::FixedStops,
                atr_period: 2,
                fast_period: 2,
                slow_period: 3,
                volume_period: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Range 95..105 from the 00:00-04:00 candle, then a quiet tape and a breakout bar.
    fn breakout_day(source: &ScriptedSource) -> Vec<Candle> {
        source.push(Interval::Hour4, vec![reference(utc(10, 0, 0, 0), dec!(105), dec!(95))]);
        let tape = vec![
            exec(utc(10, 5, 0, 0), dec!(101), dec!(99), dec!(100), dec!(10)),
            exec(utc(10, 5, 5, 0), dec!(101.5), dec!(99.5), dec!(100.5), dec!(10)),
            exec(utc(10, 5, 10, 0), dec!(102), dec!(100), dec!(101), dec!(10)),
            // TRs 2 and 8: ATR 5, buffer 2.5
            exec(utc(10, 5, 15, 0), dec!(109), dec!(106), dec!(108.5), dec!(50)),
        ];
        source.push(Interval::Min5, tape.clone());
        tape
    }

    async fn bot(config: BotConfig, now: DateTime<Utc>) -> Bot<ScriptedSource, ManualClock> {
        let db = Database::new("sqlite::memory:").await.unwrap();
        Bot::new(config, db, ScriptedSource::default(), ManualClock::at(now))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_breakout_enter_then_take_profit() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        let mut tape = breakout_day(&bot.source);

        let outcome = bot.tick().await.unwrap();
        let TickOutcome::Evaluated(cycle) = outcome else {
            panic!("expected evaluation, got {:?}", outcome);
        };
        // risk 100 over a 5.0 stop
        assert_eq!(
            cycle.decision,
            Decision::Enter {
                side: Side::Long,
                entry: dec!(108.5),
                stop: dec!(103.5),
                target: dec!(118.5),
                quantity: dec!(20),
            }
        );
        assert_eq!(
            bot.tracker.range(),
            Some(&DailyRange::new(dec!(105), dec!(95), NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()).unwrap())
        );

        tape.push(exec(utc(10, 5, 20, 0), dec!(119.5), dec!(118), dec!(119), dec!(10)));
        bot.source.push(Interval::Min5, tape);
        bot.clock.set(utc(10, 5, 25, 30));

        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        match &cycle.decision {
            Decision::Exit { pnl, reason, .. } => {
                assert_eq!(*pnl, dec!(210)); // (119 - 108.5) * 20
                assert_eq!(*reason, ExitReason::TakeProfit);
            }
            other => panic!("expected exit, got {:?}", other),
        }

        let stored = bot.db.load_account("BTCUSDT", dec!(1)).await.unwrap();
        assert_eq!(stored.balance, dec!(10210));
        assert_eq!(stored.wins, 1);

        let journal = bot.db.recent_journal("BTCUSDT", 10).await.unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(bot.db.exit_pnls("BTCUSDT").await.unwrap(), vec![dec!(210)]);
    }

    #[tokio::test]
    async fn test_same_candle_twice_is_not_reevaluated() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);

        bot.tick().await.unwrap();
        bot.clock.set(utc(10, 5, 22, 0));
        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert!(cycle.decision.is_no_action());
        assert_eq!(bot.db.recent_journal("BTCUSDT", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outside_window_fetches_nothing() {
        // Default window opens 03:55 local; UTC here
        let config = BotConfig {
            window: TradingWindow::default(),
            ..config()
        };
        let mut bot = bot(config, utc(10, 2, 0, 0)).await;

        let outcome = bot.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Outside {
                wait: Some(Duration::from_secs(115 * 60))
            }
        );
        assert_eq!(bot.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_cycle_without_state_change() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);

        bot.source.fail_next("HTTP 503");
        tokio_test::assert_err!(bot.tick().await);
        assert!(bot.machine().position().is_flat());

        // Next cycle succeeds with the same data
        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert!(matches!(cycle.decision, Decision::Enter { .. }));
    }

    #[tokio::test]
    async fn test_range_pending_blocks_entry() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);
        // Only yesterday's reference candle is available
        bot.source
            .push(Interval::Hour4, vec![reference(utc(9, 20, 0, 0), dec!(105), dec!(95))]);

        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert_eq!(cycle.decision, Decision::no_action("daily range pending"));
    }

    #[tokio::test]
    async fn test_day_rollover_settles_open_position() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        let mut tape = breakout_day(&bot.source);
        bot.tick().await.unwrap();
        assert!(!bot.machine().position().is_flat());

        // Next day, before any reference candle has closed
        tape.push(exec(utc(11, 0, 25, 0), dec!(108), dec!(106.5), dec!(107), dec!(10)));
        bot.source.push(Interval::Min5, tape);
        bot.clock.set(utc(11, 0, 30, 30));

        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert!(cycle.position.is_flat());
        assert_eq!(cycle.decision, Decision::no_action("daily range pending"));
        assert_eq!(cycle.account.balance, dec!(9970)); // (107 - 108.5) * 20

        let journal = bot.db.recent_journal("BTCUSDT", 10).await.unwrap();
        assert_eq!(journal[0].reason.as_deref(), Some(ExitReason::DayRollover.as_str()));
        assert!(bot.tracker.range().is_none());
    }

    #[tokio::test]
    async fn test_discarded_rollover_is_journaled() {
        let mut config = config();
        config.strategy.rollover_policy = DayRolloverPolicy::Discard;
        let mut bot = bot(config, utc(10, 5, 20, 30)).await;
        let mut tape = breakout_day(&bot.source);
        bot.tick().await.unwrap();

        tape.push(exec(utc(11, 0, 25, 0), dec!(108), dec!(106.5), dec!(107), dec!(10)));
        bot.source.push(Interval::Min5, tape);
        bot.clock.set(utc(11, 0, 30, 30));

        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert!(cycle.position.is_flat());
        assert_eq!(cycle.account.balance, dec!(10000));

        let journal = bot.db.recent_journal("BTCUSDT", 10).await.unwrap();
        let kinds: Vec<_> = journal.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["DISCARD", "ENTER"]);
        assert_eq!(journal[0].reason.as_deref(), Some("day_rollover"));
        let quantity: Option<Decimal> = journal[0].quantity.as_deref().map(|q| q.parse().unwrap());
        assert_eq!(quantity, Some(dec!(20)));
        assert!(journal[0].pnl.is_none());
        assert!(bot.db.exit_pnls("BTCUSDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_journals_open_position() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);
        bot.tick().await.unwrap();

        bot.shutdown().await.unwrap();

        assert!(bot.machine().position().is_flat());
        let journal = bot.db.recent_journal("BTCUSDT", 10).await.unwrap();
        assert_eq!(journal[0].kind, "DISCARD");
        assert_eq!(journal[0].reason.as_deref(), Some("shutdown"));
        assert_eq!(journal[0].side.as_deref(), Some("LONG"));
        assert_eq!(journal[0].entry_price.as_deref(), Some("108.5"));
    }

    #[tokio::test]
    async fn test_failed_journal_write_is_retried() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);

        sqlx::query("ALTER TABLE trade_journal RENAME TO trade_journal_offline")
            .execute(bot.db.pool())
            .await
            .unwrap();
        tokio_test::assert_err!(bot.tick().await);
        assert!(!bot.machine().position().is_flat());

        sqlx::query("ALTER TABLE trade_journal_offline RENAME TO trade_journal")
            .execute(bot.db.pool())
            .await
            .unwrap();
        bot.clock.set(utc(10, 5, 22, 0));
        let TickOutcome::Evaluated(cycle) = bot.tick().await.unwrap() else {
            panic!("expected evaluation");
        };
        assert_eq!(cycle.decision, Decision::no_action("candle already evaluated"));

        let journal = bot.db.recent_journal("BTCUSDT", 10).await.unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].kind, "ENTER");
        assert!(journal[0].candle_time.is_some());
    }

    #[tokio::test]
    async fn test_clock_going_backwards_keeps_the_day() {
        let mut bot = bot(config(), utc(10, 5, 20, 30)).await;
        breakout_day(&bot.source);
        bot.tick().await.unwrap();

        bot.clock.set(utc(9, 23, 0, 0));
        let outcome = tokio_test::assert_ok!(bot.tick().await);
        let TickOutcome::Evaluated(cycle) = outcome else {
            panic!("expected evaluation, got {:?}", outcome);
        };
        // No rollover, no re-evaluation, range kept
        assert_eq!(cycle.decision, Decision::no_action("candle already evaluated"));
        assert!(!cycle.position.is_flat());
        assert_eq!(bot.tracker.current_day(), NaiveDate::from_ymd_opt(2024, 5, 10));
        assert!(bot.tracker.range().is_some());
    }

    #[test]
    fn test_candles_per_cycle_covers_indicators() {
        let config = BotConfig {
            lookback_candles: 10,
            ..Default::default()
        };
        // slow average of 50 needs 50 candles, plus one
        assert_eq!(config.candles_per_cycle(), 51);
    }
}
