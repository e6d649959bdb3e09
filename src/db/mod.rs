//! SQLite persistence for the paper account and the decision journal.
//!
//! Stores what is needed to resume after restart and to audit past cycles:
//! - Account balance and trade counters, one row per symbol
//! - Every decision other than `NoAction`, with the balance after it

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use crate::models::{AccountState, Decision};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored account row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountRow {
    balance: String,
    trades_count: i64,
    wins: i64,
    losses: i64,
}

/// Stored journal entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalEntry {
    pub id: String,
    pub symbol: String,
    pub kind: String,
    pub side: Option<String>,
    pub entry_price: Option<String>,
    pub exit_price: Option<String>,
    pub stop_price: Option<String>,
    pub previous_stop: Option<String>,
    pub target_price: Option<String>,
    pub quantity: Option<String>,
    pub pnl: Option<String>,
    pub reason: Option<String>,
    pub balance_after: String,
    pub candle_time: Option<String>,
    pub recorded_at: String,
}

/// Columns of one journal row, filled per decision kind.
#[derive(Default)]
struct JournalFields {
    side: Option<&'static str>,
    entry: Option<Decimal>,
    exit: Option<Decimal>,
    stop: Option<Decimal>,
    previous_stop: Option<Decimal>,
    target: Option<Decimal>,
    quantity: Option<Decimal>,
    pnl: Option<Decimal>,
    reason: Option<&'static str>,
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Corrupted {} value: {:?}", column, value))
}

fn parse_count(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("Corrupted {} value: {}", column, value))
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Decimals are stored as TEXT to keep them exact
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_state (
                symbol TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                trades_count INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_journal (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                side TEXT,
                entry_price TEXT,
                exit_price TEXT,
                stop_price TEXT,
                previous_stop TEXT,
                target_price TEXT,
                quantity TEXT,
                pnl TEXT,
                reason TEXT,
                balance_after TEXT NOT NULL,
                candle_time TEXT,
                recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_journal_symbol ON trade_journal(symbol, recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Account ====================

    /// Load the account for `symbol`, creating it with `initial_balance` on first run.
    pub async fn load_account(&self, symbol: &str, initial_balance: Decimal) -> Result<AccountState> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO account_state (symbol, balance)
            VALUES (?, ?)
            "#,
        )
        .bind(symbol)
        .bind(initial_balance.to_string())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT balance, trades_count, wins, losses FROM account_state WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch account state")?;

        Ok(AccountState {
            balance: parse_decimal("balance", &row.balance)?,
            trades_count: parse_count("trades_count", row.trades_count)?,
            wins: parse_count("wins", row.wins)?,
            losses: parse_count("losses", row.losses)?,
        })
    }

    /// Persist the account snapshot for `symbol`.
    pub async fn save_account(&self, symbol: &str, account: &AccountState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account_state (symbol, balance, trades_count, wins, losses)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                balance = excluded.balance,
                trades_count = excluded.trades_count,
                wins = excluded.wins,
                losses = excluded.losses,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(symbol)
        .bind(account.balance.to_string())
        .bind(account.trades_count as i64)
        .bind(account.wins as i64)
        .bind(account.losses as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Journal ====================

    /// Append a decision to the journal. `NoAction` is not recorded.
    ///
    /// Returns the new entry id, or `None` when nothing was written.
    pub async fn record_decision(
        &self,
        symbol: &str,
        decision: &Decision,
        balance_after: Decimal,
        candle_time: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let mut row = JournalFields::default();
        match decision {
            Decision::NoAction { .. } => return Ok(None),
            Decision::Enter {
                side,
                entry,
                stop,
                target,
                quantity,
            } => {
                row.side = Some(side.as_str());
                row.entry = Some(*entry);
                row.stop = Some(*stop);
                row.target = Some(*target);
                row.quantity = Some(*quantity);
            }
            Decision::Exit {
                side,
                entry,
                exit_price,
                quantity,
                pnl,
                reason,
            } => {
                row.side = Some(side.as_str());
                row.entry = Some(*entry);
                row.exit = Some(*exit_price);
                row.quantity = Some(*quantity);
                row.pnl = Some(*pnl);
                row.reason = Some(reason.as_str());
            }
            Decision::AdjustStop {
                side,
                previous_trailing,
                new_trailing,
            } => {
                row.side = Some(side.as_str());
                row.previous_stop = Some(*previous_trailing);
                row.stop = Some(*new_trailing);
            }
            Decision::Discard {
                side,
                entry,
                quantity,
                reason,
            } => {
                row.side = Some(side.as_str());
                row.entry = Some(*entry);
                row.quantity = Some(*quantity);
                row.reason = Some(reason.as_str());
            }
        }

        let id = Uuid::new_v4().to_string();
        let text = |v: Option<Decimal>| v.map(|d| d.to_string());

        sqlx::query(
            r#"
            INSERT INTO trade_journal
                (id, symbol, kind, side, entry_price, exit_price, stop_price, previous_stop,
                 target_price, quantity, pnl, reason, balance_after, candle_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(symbol)
        .bind(decision.kind())
        .bind(row.side)
        .bind(text(row.entry))
        .bind(text(row.exit))
        .bind(text(row.stop))
        .bind(text(row.previous_stop))
        .bind(text(row.target))
        .bind(text(row.quantity))
        .bind(text(row.pnl))
        .bind(row.reason)
        .bind(balance_after.to_string())
        .bind(candle_time.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to record decision")?;

        Ok(Some(id))
    }

    /// Most recent journal entries, newest first.
    pub async fn recent_journal(&self, symbol: &str, limit: i64) -> Result<Vec<JournalEntry>> {
        sqlx::query_as::<_, JournalEntry>(
            "SELECT * FROM trade_journal WHERE symbol = ? ORDER BY recorded_at DESC, rowid DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch journal")
    }

    /// Realized P&L of every journaled exit, oldest first.
    pub async fn exit_pnls(&self, symbol: &str) -> Result<Vec<Decimal>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT pnl FROM trade_journal WHERE symbol = ? AND kind = 'EXIT' AND pnl IS NOT NULL ORDER BY recorded_at, rowid",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch exit P&L")?;

        rows.iter().map(|(pnl,)| parse_decimal("pnl", pnl)).collect()
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscardReason, ExitReason, Side};
    use rust_decimal_macros::dec;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_account_created_then_restored() {
        let db = memory_db().await;
        let account = db.load_account("BTCUSDT", dec!(10000)).await.unwrap();
        assert_eq!(account, AccountState::new(dec!(10000)));

        let mut updated = account.clone();
        updated.apply_realized(dec!(-12.34));
        db.save_account("BTCUSDT", &updated).await.unwrap();

        // The initial balance only applies on first load
        let restored = db.load_account("BTCUSDT", dec!(500)).await.unwrap();
        assert_eq!(restored, updated);
        assert_eq!(restored.balance, dec!(9987.66));

        let other = db.load_account("ETHUSDT", dec!(500)).await.unwrap();
        assert_eq!(other.balance, dec!(500));
    }

    #[tokio::test]
    async fn test_corrupted_balance_is_reported() {
        let db = memory_db().await;
        sqlx::query("INSERT INTO account_state (symbol, balance) VALUES ('BTCUSDT', 'lots')")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(db.load_account("BTCUSDT", dec!(10000)).await.is_err());
    }

    #[tokio::test]
    async fn test_journal_round_trip() {
        let db = memory_db().await;
        let enter = Decision::Enter {
            side: Side::Long,
            entry: dec!(108.5),
            stop: dec!(106.5),
            target: dec!(112.5),
            quantity: dec!(50),
        };
        let adjust = Decision::AdjustStop {
            side: Side::Long,
            previous_trailing: dec!(106.5),
            new_trailing: dec!(109),
        };
        let discard = Decision::Discard {
            side: Side::Short,
            entry: dec!(91.5),
            quantity: dec!(50),
            reason: DiscardReason::DayRollover,
        };
        let exit = Decision::Exit {
            side: Side::Long,
            entry: dec!(108.5),
            exit_price: dec!(112.7),
            quantity: dec!(50),
            pnl: dec!(210),
            reason: ExitReason::TakeProfit,
        };

        assert!(db.record_decision("BTCUSDT", &enter, dec!(10000), None).await.unwrap().is_some());
        db.record_decision("BTCUSDT", &adjust, dec!(10000), None).await.unwrap();
        db.record_decision("BTCUSDT", &exit, dec!(10210), Some(Utc::now())).await.unwrap();
        db.record_decision("BTCUSDT", &discard, dec!(10210), None).await.unwrap();
        let skipped = db
            .record_decision("BTCUSDT", &Decision::no_action("holding"), dec!(10210), None)
            .await
            .unwrap();
        assert!(skipped.is_none());

        let journal = db.recent_journal("BTCUSDT", 10).await.unwrap();
        assert_eq!(journal.len(), 4);
        assert_eq!(journal[0].kind, "DISCARD");
        assert_eq!(journal[0].reason.as_deref(), Some("day_rollover"));
        assert_eq!(journal[0].entry_price.as_deref(), Some("91.5"));
        assert!(journal[0].pnl.is_none());
        assert_eq!(journal[1].kind, "EXIT");
        assert_eq!(journal[1].reason.as_deref(), Some("take_profit"));
        assert_eq!(journal[1].balance_after, "10210");
        assert_eq!(journal[2].kind, "ADJUST_STOP");
        assert_eq!(journal[2].previous_stop.as_deref(), Some("106.5"));
        assert_eq!(journal[3].side.as_deref(), Some("LONG"));

        assert_eq!(db.exit_pnls("BTCUSDT").await.unwrap(), vec![dec!(210)]);
        assert!(db.exit_pnls("ETHUSDT").await.unwrap().is_empty());
    }
}
