//! Saves finished sessions to the history store.
//!
//! A save is two linked writes: the session summary, then its operation
//! rows referencing the returned id. Writes are retried with exponential
//! backoff before a failure is reported.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{Operation, SessionStatus, TradeMode};
use crate::trading::{SessionState, TradeConfig};

/// Persistence collaborator for session history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Sessions already stored for `user_id` on `date`, across both modes.
    async fn count_sessions_on(&self, user_id: &str, date: NaiveDate) -> Result<i64>;

    /// Insert a session summary and return its id.
    async fn insert_session(&self, record: &SessionRecord) -> Result<String>;

    /// Insert the ordered operation rows of a stored session.
    async fn insert_operations(
        &self,
        history_id: &str,
        user_id: &str,
        operations: &[Operation],
    ) -> Result<()>;
}

/// Owned copy of a session taken when its save is dispatched.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub mode: TradeMode,
    pub status: SessionStatus,
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_profit: Decimal,
    pub operations: Vec<Operation>,
    pub captured_at: DateTime<Local>,
}

impl SessionSnapshot {
    pub fn capture(
        user_id: &str,
        mode: TradeMode,
        status: SessionStatus,
        config: &TradeConfig,
        state: &SessionState,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            mode,
            status,
            initial_bankroll: config.initial_bankroll,
            final_bankroll: state.bankroll(),
            total_profit: state.cumulative_profit(),
            operations: state.operations().to_vec(),
            captured_at: Local::now(),
        }
    }

    /// Local calendar day the session is filed under.
    pub fn session_date(&self) -> NaiveDate {
        self.captured_at.date_naive()
    }
}

/// Session summary row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub label: String,
    pub mode: TradeMode,
    pub status: SessionStatus,
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_profit: Decimal,
}

/// Result of a save whose session row was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub history_id: String,
    pub label: String,
    pub status: SessionStatus,
    pub operation_count: usize,
    /// Set when the session row was written but its operations were not
    pub operations_error: Option<String>,
}

impl SavedSession {
    pub fn is_complete(&self) -> bool {
        self.operations_error.is_none()
    }
}

/// Labels and writes sessions through a `HistoryStore`.
///
/// Clones share one label lock, so saves running in separate tasks never
/// number two sessions alike.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    retry_budget: Duration,
    label_lock: Arc<Mutex<()>>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            retry_budget: Duration::from_secs(10),
            label_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Total time spent retrying a failing write. Zero disables retries.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// `"Session N"` for the Nth session of the user's day.
    pub async fn next_label(&self, user_id: &str, date: NaiveDate) -> String {
        let existing = match self.store.count_sessions_on(user_id, date).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to count today's sessions, numbering from 1");
                0
            }
        };
        format!("Session {}", existing + 1)
    }

    /// Write `snapshot` as a session row followed by its operations.
    pub async fn save(&self, snapshot: SessionSnapshot) -> Result<SavedSession> {
        anyhow::ensure!(!snapshot.operations.is_empty(), "Session has no operations to save");

        let date = snapshot.session_date();

        // count and insert must not interleave with another save
        let guard = self.label_lock.lock().await;
        let label = self.next_label(&snapshot.user_id, date).await;

        let record = SessionRecord {
            user_id: snapshot.user_id.clone(),
            date,
            label: label.clone(),
            mode: snapshot.mode,
            status: snapshot.status,
            initial_bankroll: snapshot.initial_bankroll,
            final_bankroll: snapshot.final_bankroll,
            total_profit: snapshot.total_profit,
        };

        let history_id = self
            .with_retry("insert session", || self.store.insert_session(&record))
            .await
            .context("Failed to save session to history")?;
        drop(guard);

        debug!(history_id = %history_id, label = %label, "Session row written");

        let operations_error = self
            .with_retry("insert operations", || {
                self.store
                    .insert_operations(&history_id, &snapshot.user_id, &snapshot.operations)
            })
            .await
            .err()
            .map(|e| {
                warn!(history_id = %history_id, error = %e, "Session saved but its operations were not");
                format!("{:#}", e)
            });

        info!(
            user = %snapshot.user_id,
            label = %label,
            status = %snapshot.status,
            mode = %snapshot.mode,
            operations = snapshot.operations.len(),
            "Session saved to history"
        );

        Ok(SavedSession {
            history_id,
            label,
            status: snapshot.status,
            operation_count: snapshot.operations.len(),
            operations_error,
        })
    }

    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.retry_budget.is_zero() {
            return op().await;
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(self.retry_budget))
            .build();

        backoff::future::retry(policy, || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    debug!(what, error = %e, "History write failed, retrying");
                    backoff::Error::transient(e)
                })
            }
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::Outcome;

    /// In-memory store with switchable failures.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub sessions: Mutex<Vec<(String, SessionRecord)>>,
        pub operations: Mutex<Vec<(String, Operation)>>,
        pub fail_count: bool,
        pub fail_sessions: bool,
        pub fail_operations: bool,
        /// Yield to the scheduler before touching the data
        pub yield_first: bool,
        pub session_attempts: AtomicUsize,
    }

    impl MemoryStore {
        async fn maybe_yield(&self) {
            if self.yield_first {
                tokio::task::yield_now().await;
            }
        }

        pub fn labels(&self) -> Vec<String> {
            let mut labels: Vec<String> = self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.label.clone())
                .collect();
            labels.sort();
            labels
        }
    }

    #[async_trait]
    impl HistoryStore for MemoryStore {
        async fn count_sessions_on(&self, user_id: &str, date: NaiveDate) -> Result<i64> {
            anyhow::ensure!(!self.fail_count, "count unavailable");
            self.maybe_yield().await;
            let sessions = self.sessions.lock().unwrap();
            Ok(sessions
                .iter()
                .filter(|(_, r)| r.user_id == user_id && r.date == date)
                .count() as i64)
        }

        async fn insert_session(&self, record: &SessionRecord) -> Result<String> {
            self.session_attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.fail_sessions, "store offline");
            self.maybe_yield().await;
            let mut sessions = self.sessions.lock().unwrap();
            let id = format!("h{}", sessions.len() + 1);
            sessions.push((id.clone(), record.clone()));
            Ok(id)
        }

        async fn insert_operations(
            &self,
            history_id: &str,
            _user_id: &str,
            operations: &[Operation],
        ) -> Result<()> {
            anyhow::ensure!(!self.fail_operations, "operations table locked");
            let mut stored = self.operations.lock().unwrap();
            stored.extend(operations.iter().map(|op| (history_id.to_string(), op.clone())));
            Ok(())
        }
    }

    pub(crate) fn snapshot(user: &str, ops: usize) -> SessionSnapshot {
        let operations = (1..=ops as u32)
            .map(|i| Operation {
                sequence_id: i,
                entry_value: dec!(20),
                outcome: Outcome::Win,
                profit_loss: dec!(16),
                bankroll_after: dec!(1000) + dec!(16) * Decimal::from(i),
                timestamp: Utc::now(),
            })
            .collect::<Vec<_>>();
        SessionSnapshot {
            user_id: user.to_string(),
            mode: TradeMode::Real,
            status: SessionStatus::Open,
            initial_bankroll: dec!(1000),
            final_bankroll: dec!(1000) + dec!(16) * Decimal::from(ops as u32),
            total_profit: dec!(16) * Decimal::from(ops as u32),
            operations,
            captured_at: Local::now(),
        }
    }

    fn recorder(store: Arc<MemoryStore>) -> HistoryRecorder {
        HistoryRecorder::new(store).with_retry_budget(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_labels_count_per_user_and_day() {
        let store = Arc::new(MemoryStore::default());
        let rec = recorder(store.clone());

        let first = rec.save(snapshot("ana", 2)).await.unwrap();
        let second = rec.save(snapshot("ana", 1)).await.unwrap();
        let other_user = rec.save(snapshot("bia", 1)).await.unwrap();

        assert_eq!(first.label, "Session 1");
        assert_eq!(second.label, "Session 2");
        assert_eq!(other_user.label, "Session 1");
        assert!(first.is_complete());

        let ops = store.operations.lock().unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].0, first.history_id);
        assert_eq!(ops[1].1.sequence_id, 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_get_distinct_labels() {
        let store = Arc::new(MemoryStore {
            yield_first: true,
            ..Default::default()
        });
        let rec = recorder(store.clone());

        let (a, b, c) = tokio::join!(
            rec.save(snapshot("ana", 1)),
            rec.save(snapshot("ana", 2)),
            rec.save(snapshot("ana", 3)),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(store.labels(), vec!["Session 1", "Session 2", "Session 3"]);
    }

    #[tokio::test]
    async fn test_count_failure_falls_back_to_one() {
        let store = Arc::new(MemoryStore {
            fail_count: true,
            ..Default::default()
        });
        let saved = recorder(store).save(snapshot("ana", 1)).await.unwrap();
        assert_eq!(saved.label, "Session 1");
    }

    #[tokio::test]
    async fn test_operations_failure_is_reported_separately() {
        let store = Arc::new(MemoryStore {
            fail_operations: true,
            ..Default::default()
        });
        let saved = recorder(store.clone()).save(snapshot("ana", 3)).await.unwrap();

        assert!(!saved.is_complete());
        assert!(saved.operations_error.unwrap().contains("locked"));
        assert_eq!(store.sessions.lock().unwrap().len(), 1);
        assert!(store.operations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_failure_writes_nothing() {
        let store = Arc::new(MemoryStore {
            fail_sessions: true,
            ..Default::default()
        });
        let err = recorder(store.clone()).save(snapshot("ana", 1)).await.unwrap_err();

        assert!(format!("{:#}", err).contains("store offline"));
        assert_eq!(store.session_attempts.load(Ordering::SeqCst), 1);
        assert!(store.operations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_within_budget() {
        let store = Arc::new(MemoryStore {
            fail_sessions: true,
            ..Default::default()
        });
        let rec = HistoryRecorder::new(store.clone()).with_retry_budget(Duration::from_millis(500));
        assert!(rec.save(snapshot("ana", 1)).await.is_err());
        assert!(store.session_attempts.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_empty_session_is_not_saved() {
        let store = Arc::new(MemoryStore::default());
        assert!(recorder(store.clone()).save(snapshot("ana", 0)).await.is_err());
        assert!(store.sessions.lock().unwrap().is_empty());
    }
}
