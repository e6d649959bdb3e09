//! Daily Range Breakout Bot
//!
//! Paper-trades one symbol against the range of the first reference candle
//! of each trading day, with ATR-based stops and fixed-fractional sizing.

mod api;
mod bot;
mod db;
mod metrics;
mod models;
mod schedule;
mod trading;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::bot::{Bot, BotConfig};
use crate::db::Database;
use crate::metrics::TradeStats;
use crate::models::Interval;
use crate::schedule::{ReferenceTimezone, TradingWindow};
use crate::trading::{DayRolloverPolicy, EntryPolicy, ExitPolicy, StrategyConfig};

/// Daily range breakout bot CLI.
#[derive(Parser)]
#[command(name = "breakout")]
#[command(about = "Paper-trade breakouts of the first 4h candle of the day", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "BREAKOUT_DATABASE", default_value = "sqlite:./breakout.db?mode=rwc")]
    database: String,

    /// Log level or filter directives (e.g. debug, info,sqlx=warn); RUST_LOG wins when set
    #[arg(short, long, env = "BREAKOUT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Traded symbol
    #[arg(short, long, env = "BREAKOUT_SYMBOL", default_value = "BTCUSDT")]
    symbol: String,

    /// Market data REST base URL
    #[arg(long, env = "BINANCE_API_URL", default_value = api::BINANCE_API_BASE)]
    api_url: String,

    /// JSON file overriding strategy settings
    #[arg(long, env = "BREAKOUT_STRATEGY")]
    strategy: Option<PathBuf>,

    /// Reference timezone (e.g. new_york, utc-4, fixed:-5)
    #[arg(long, env = "BREAKOUT_TIMEZONE")]
    timezone: Option<ReferenceTimezone>,

    /// Interval of the candle that sets the daily range (e.g. 4h)
    #[arg(long)]
    reference_interval: Option<Interval>,

    /// Interval of the candles evaluated each cycle (e.g. 5m)
    #[arg(long)]
    execution_interval: Option<Interval>,

    /// Entry policy (breakout_confirmed, reversal_into_range)
    #[arg(long)]
    entry_policy: Option<EntryPolicy>,

    /// Exit policy (fixed_stops, trailing_stop)
    #[arg(long)]
    exit_policy: Option<ExitPolicy>,

    /// Day rollover policy (settle_at_market, discard)
    #[arg(long)]
    rollover_policy: Option<DayRolloverPolicy>,

    /// Starting paper balance, used when no account is stored yet
    #[arg(short, long, env = "BREAKOUT_BALANCE", default_value = "10000")]
    balance: Decimal,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Heartbeat interval in seconds
        #[arg(long, default_value = "900")]
        heartbeat: u64,

        /// Evaluate at any time of day instead of waiting for the first range candle
        #[arg(long)]
        all_day: bool,
    },

    /// Show account status and trade statistics
    Status,

    /// Show recent journal entries
    Journal {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Show effective configuration
    Config,
}

impl Cli {
    /// Strategy settings: defaults, then the JSON file, then flags.
    fn strategy_config(&self) -> Result<StrategyConfig> {
        let mut config = match &self.strategy {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid strategy file {}", path.display()))?
            }
            None => StrategyConfig::default(),
        };

        if let Some(tz) = self.timezone {
            config.reference_timezone = tz;
        }
        if let Some(interval) = self.reference_interval {
            config.reference_interval = interval;
        }
        if let Some(interval) = self.execution_interval {
            config.execution_interval = interval;
        }
        if let Some(policy) = self.entry_policy {
            config.entry_policy = policy;
        }
        if let Some(policy) = self.exit_policy {
            config.exit_policy = policy;
        }
        if let Some(policy) = self.rollover_policy {
            config.rollover_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }

    fn bot_config(&self) -> Result<BotConfig> {
        let strategy = self.strategy_config()?;
        Ok(BotConfig {
            symbol: self.symbol.to_uppercase(),
            initial_balance: self.balance,
            window: TradingWindow::before_first_close(
                strategy.reference_interval,
                chrono::Duration::minutes(5),
            ),
            database_url: self.database.clone(),
            api_url: self.api_url.clone(),
            strategy,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut bot_config = cli.bot_config()?;

    match cli.command {
        Commands::Run {
            interval,
            heartbeat,
            all_day,
        } => {
            bot_config.poll_interval_secs = interval;
            bot_config.heartbeat_secs = heartbeat;
            if all_day {
                bot_config.window = TradingWindow::always();
            }

            info!(
                symbol = %bot_config.symbol,
                interval = interval,
                "Starting breakout bot"
            );

            let mut bot = Bot::connect(bot_config.clone()).await?;
            let account = bot.machine().account().clone();

            println!("\n=== Daily Range Breakout Bot ===");
            println!("Symbol:           {}", bot_config.symbol);
            println!("Balance:          ${:.2}", account.balance);
            println!("Entry / exit:     {} / {}", bot_config.strategy.entry_policy, bot_config.strategy.exit_policy);
            println!("Timezone:         {}", bot_config.strategy.reference_timezone);
            println!(
                "Window:           {} - {}",
                bot_config.window.opens_at, bot_config.window.closes_at
            );
            println!("Polling interval: {}s", interval);
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            let account = bot.machine().account();
            println!("\nFinal balance: ${:.2} after {} trades", account.balance, account.trades_count);
        }

        Commands::Status => {
            let db = Database::new(&bot_config.database_url).await?;
            let account = db
                .load_account(&bot_config.symbol, bot_config.initial_balance)
                .await?;
            let pnls = db.exit_pnls(&bot_config.symbol).await?;
            let realized: Decimal = pnls.iter().copied().sum();
            let stats = TradeStats::from_pnls(account.balance - realized, &pnls);

            println!("\n=== Account: {} ===", bot_config.symbol);
            println!("Balance:          ${:.2}", account.balance);
            println!("Trades:           {}", account.trades_count);
            println!("Wins / Losses:    {} / {}", account.wins, account.losses);
            println!("Win Rate:         {:.1}%", account.win_rate() * 100.0);

            println!("\n=== Journaled Exits ===");
            println!("{}", stats);
        }

        Commands::Journal { limit } => {
            let db = Database::new(&bot_config.database_url).await?;
            let entries = db.recent_journal(&bot_config.symbol, limit).await?;

            if entries.is_empty() {
                println!("No journal entries. Run 'breakout run' to start the bot.");
                return Ok(());
            }

            println!("\n=== Journal: {} (latest {}) ===\n", bot_config.symbol, entries.len());
            println!(
                "{:<10} {:<20} {:<12} {:<6} {:>12} {:>12} {:>12} {:>10}  {}",
                "ID", "Recorded", "Kind", "Side", "Entry", "Exit/Stop", "Quantity", "P&L", "Reason"
            );
            for entry in &entries {
                let dash = || "-".to_string();
                println!(
                    "{:<10} {:<20} {:<12} {:<6} {:>12} {:>12} {:>12} {:>10}  {}",
                    truncate(&entry.id, 10),
                    truncate(&entry.recorded_at, 20),
                    entry.kind,
                    entry.side.as_deref().unwrap_or("-"),
                    entry.entry_price.clone().unwrap_or_else(dash),
                    entry
                        .exit_price
                        .clone()
                        .or_else(|| entry.stop_price.clone())
                        .unwrap_or_else(dash),
                    entry.quantity.as_deref().map(|q| truncate(q, 12)).unwrap_or_else(dash),
                    entry.pnl.clone().unwrap_or_else(dash),
                    entry.reason.as_deref().unwrap_or(""),
                );
            }
        }

        Commands::Config => {
            println!("\n=== Effective Configuration ===\n");
            println!("{}", serde_json::to_string_pretty(&bot_config)?);
            println!(
                "\nCandles per cycle: {} x {}",
                bot_config.candles_per_cycle(),
                bot_config.strategy.execution_interval
            );
        }
    }

    Ok(())
}

/// Filter for `--log-level`, falling back to `info` when it does not parse.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
