//! Database persistence for configuration, session history and access.
//!
//! Stores:
//! - Per-user trade configuration and the last selected trade mode
//! - Saved sessions and their individual operations
//! - Subscription records mirrored from billing

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool};

use crate::history::{HistoryFilter, HistoryStore, SessionRecord};
use crate::models::{Operation, Subscription, SubscriptionStatus, TradeMode};
use crate::trading::{decode_rule, TradeConfig};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored configuration row; rules are JSON text.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredConfig {
    payout: String,
    initial_bankroll: String,
    entry: String,
    daily_goal: String,
    stop_loss: String,
}

/// Saved session summary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSession {
    pub id: String,
    pub user_id: String,
    pub session_date: String,
    pub label: String,
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub total_profit: f64,
    pub status: String,
    pub mode: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Saved operation of a session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredOperation {
    pub id: i64,
    pub history_id: String,
    pub sequence_id: i64,
    pub entry_value: f64,
    pub result: String,
    pub profit_loss: f64,
    pub bankroll_after: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredSubscription {
    user_id: String,
    status: String,
    current_period_end: Option<String>,
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("Invalid {} '{}'", column, raw))
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database.
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_configs (
                user_id TEXT PRIMARY KEY,
                payout TEXT NOT NULL,
                initial_bankroll TEXT NOT NULL,
                entry TEXT NOT NULL,
                daily_goal TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                trade_mode TEXT NOT NULL DEFAULT 'real',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_history (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_date TEXT NOT NULL,
                label TEXT NOT NULL,
                initial_bankroll REAL NOT NULL,
                final_bankroll REAL NOT NULL,
                total_profit REAL NOT NULL,
                status TEXT NOT NULL,
                mode TEXT NOT NULL DEFAULT 'real',
                notes TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                history_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                sequence_id INTEGER NOT NULL,
                entry_value REAL NOT NULL,
                result TEXT NOT NULL,
                profit_loss REAL NOT NULL,
                bankroll_after REAL NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (history_id) REFERENCES session_history(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                current_period_end TEXT,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_session_history_user_date ON session_history(user_id, session_date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_session_operations_history ON session_operations(history_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Trade Config ====================

    /// Insert or replace a user's trade configuration.
    pub async fn save_config(&self, user_id: &str, config: &TradeConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_configs (user_id, payout, initial_bankroll, entry, daily_goal, stop_loss, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                payout = excluded.payout,
                initial_bankroll = excluded.initial_bankroll,
                entry = excluded.entry,
                daily_goal = excluded.daily_goal,
                stop_loss = excluded.stop_loss,
                updated_at = datetime('now')
            "#,
        )
        .bind(user_id)
        .bind(config.payout_percent.to_string())
        .bind(config.initial_bankroll.to_string())
        .bind(serde_json::to_string(&config.entry)?)
        .bind(serde_json::to_string(&config.daily_goal)?)
        .bind(serde_json::to_string(&config.stop_loss)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load a user's trade configuration, if one was saved.
    pub async fn load_config(&self, user_id: &str) -> Result<Option<TradeConfig>> {
        let row = sqlx::query_as::<_, StoredConfig>(
            "SELECT payout, initial_bankroll, entry, daily_goal, stop_loss FROM user_configs WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load trade configuration")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TradeConfig {
            payout_percent: parse_decimal(&row.payout, "payout")?,
            initial_bankroll: parse_decimal(&row.initial_bankroll, "initial bankroll")?,
            entry: decode_rule(&row.entry).context("Invalid entry rule")?,
            daily_goal: decode_rule(&row.daily_goal).context("Invalid daily goal rule")?,
            stop_loss: decode_rule(&row.stop_loss).context("Invalid stop loss rule")?,
        }))
    }

    // ==================== Preferences ====================

    /// Last trade mode selected by the user (real when never set).
    pub async fn get_trade_mode(&self, user_id: &str) -> Result<TradeMode> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT trade_mode FROM preferences WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((mode,)) => Ok(mode.parse()?),
            None => Ok(TradeMode::default()),
        }
    }

    pub async fn set_trade_mode(&self, user_id: &str, mode: TradeMode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preferences (user_id, trade_mode, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                trade_mode = excluded.trade_mode,
                updated_at = datetime('now')
            "#,
        )
        .bind(user_id)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Session History ====================

    /// List a user's sessions, newest first.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<StoredSession>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM session_history WHERE user_id = ");
        query.push_bind(user_id);

        match (filter.from, filter.to) {
            (Some(from), None) => {
                query.push(" AND session_date = ").push_bind(from.to_string());
            }
            (Some(from), Some(to)) => {
                query.push(" AND session_date >= ").push_bind(from.to_string());
                query.push(" AND session_date <= ").push_bind(to.to_string());
            }
            (None, Some(to)) => {
                query.push(" AND session_date <= ").push_bind(to.to_string());
            }
            (None, None) => {}
        }

        if let Some(mode) = filter.mode.mode() {
            query.push(" AND mode = ").push_bind(mode.as_str());
        }

        query.push(" ORDER BY session_date DESC, created_at DESC, rowid DESC");

        query
            .build_query_as::<StoredSession>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch session history")
    }

    /// One of the user's sessions by id.
    pub async fn get_session(&self, user_id: &str, id: &str) -> Result<Option<StoredSession>> {
        sqlx::query_as::<_, StoredSession>(
            "SELECT * FROM session_history WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")
    }

    /// Operations of a session, oldest first.
    pub async fn get_operations(&self, history_id: &str) -> Result<Vec<StoredOperation>> {
        sqlx::query_as::<_, StoredOperation>(
            r#"
            SELECT id, history_id, sequence_id, entry_value, result, profit_loss, bankroll_after, created_at
            FROM session_operations
            WHERE history_id = ?
            ORDER BY sequence_id ASC, id ASC
            "#,
        )
        .bind(history_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch session operations")
    }

    /// Replace the note attached to a session. Returns false if not found.
    pub async fn update_notes(&self, user_id: &str, id: &str, notes: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE session_history SET notes = ? WHERE id = ? AND user_id = ?")
            .bind(notes)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session and its operations. Returns false if not found.
    pub async fn delete_session(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM session_operations WHERE history_id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete session operations")?;

        let result = sqlx::query("DELETE FROM session_history WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete session")?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Subscriptions ====================

    pub async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, StoredSubscription>(
            "SELECT user_id, status, current_period_end FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch subscription")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let current_period_end = row
            .current_period_end
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("Invalid period end '{}'", raw))
            })
            .transpose()?;

        Ok(Some(Subscription {
            user_id: row.user_id,
            status: row.status.parse::<SubscriptionStatus>()?,
            current_period_end,
        }))
    }

    /// Insert or update a subscription record.
    pub async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, status, current_period_end, updated_at)
            VALUES (?, ?, ?, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                status = excluded.status,
                current_period_end = excluded.current_period_end,
                updated_at = datetime('now')
            "#,
        )
        .bind(&subscription.user_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl HistoryStore for Database {
    async fn count_sessions_on(&self, user_id: &str, date: NaiveDate) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM session_history WHERE user_id = ? AND session_date = ?",
        )
        .bind(user_id)
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO session_history (
                id, user_id, session_date, label, initial_bankroll,
                final_bankroll, total_profit, status, mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.user_id)
        .bind(record.date.to_string())
        .bind(&record.label)
        .bind(to_f64(record.initial_bankroll))
        .bind(to_f64(record.final_bankroll))
        .bind(to_f64(record.total_profit))
        .bind(record.status.as_str())
        .bind(record.mode.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert session")?;

        Ok(id)
    }

    async fn insert_operations(
        &self,
        history_id: &str,
        user_id: &str,
        operations: &[Operation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for op in operations {
            sqlx::query(
                r#"
                INSERT INTO session_operations (
                    history_id, user_id, sequence_id, entry_value, result,
                    profit_loss, bankroll_after, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(history_id)
            .bind(user_id)
            .bind(op.sequence_id as i64)
            .bind(to_f64(op.entry_value))
            .bind(op.outcome.as_str())
            .bind(to_f64(op.profit_loss))
            .bind(to_f64(op.bankroll_after))
            .bind(op.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("Failed to insert operation")?;
        }

        tx.commit().await?;

        Ok(())
    }
}
