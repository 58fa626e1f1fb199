//! Trading desk: dispatches user actions to the session and hands finished
//! sessions to the history recorder.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::DeskError;
use crate::history::{HistoryRecorder, SavedSession, SessionSnapshot};
use crate::models::{SessionStatus, TradeMode};

use super::{PositionSizer, SessionState, TradeAction, TradeConfig, Transition};

/// A save running in the background.
struct PendingSave {
    /// Session the save belongs to; bumped on every reset
    generation: u64,
    handle: JoinHandle<Result<SavedSession>>,
}

/// One user's running session.
pub struct TradingDesk {
    user_id: String,
    sizer: PositionSizer,
    state: SessionState,
    mode: TradeMode,
    saved: bool,
    generation: u64,
    recorder: HistoryRecorder,
    pending: Vec<PendingSave>,
}

impl TradingDesk {
    pub fn new(
        user_id: impl Into<String>,
        config: TradeConfig,
        mode: TradeMode,
        recorder: HistoryRecorder,
    ) -> Self {
        let state = SessionState::new(&config);
        Self {
            user_id: user_id.into(),
            sizer: PositionSizer::new(config),
            state,
            mode,
            saved: false,
            generation: 0,
            recorder,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &TradeConfig {
        self.sizer.config()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> TradeMode {
        self.mode
    }

    /// Whether the current session has been handed to the recorder.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn pending_saves(&self) -> usize {
        self.pending.len()
    }

    pub fn win(&mut self) -> Result<Transition, DeskError> {
        self.act(TradeAction::Win)
    }

    pub fn loss(&mut self) -> Result<Transition, DeskError> {
        self.act(TradeAction::Loss)
    }

    pub fn conservative_loss(&mut self) -> Result<Transition, DeskError> {
        self.act(TradeAction::ConservativeLoss)
    }

    fn act(&mut self, action: TradeAction) -> Result<Transition, DeskError> {
        if self.state.is_terminal() {
            return Err(DeskError::SessionClosed(self.state.status()));
        }

        let transition = self.state.apply(&self.sizer, action, Utc::now());
        self.saved = false;

        debug!(
            user = %self.user_id,
            action = ?action,
            stake = %transition.operation.entry_value,
            profit_loss = %transition.operation.profit_loss,
            bankroll = %self.state.bankroll(),
            next_entry = %transition.next_entry,
            "Operation recorded"
        );

        if let Some(event) = transition.threshold {
            info!(
                user = %self.user_id,
                status = %event.status(),
                profit = %self.state.cumulative_profit(),
                "Session closed"
            );
            self.dispatch_save(event.status());
        }

        Ok(transition)
    }

    /// Start a new session with the same configuration. With `save`, an
    /// unsaved non-empty session is recorded first. Returns whether a save
    /// was dispatched.
    pub fn reset(&mut self, save: bool) -> bool {
        let dispatched = save && self.save_current();
        self.restart();
        info!(user = %self.user_id, saved = dispatched, "Session reset");
        dispatched
    }

    /// Switch between the real and training books. The outgoing session is
    /// recorded under its old mode before the desk starts over.
    pub fn toggle_mode(&mut self) -> TradeMode {
        self.save_current();
        self.mode = self.mode.toggled();
        self.restart();
        info!(user = %self.user_id, mode = %self.mode, "Trade mode changed");
        self.mode
    }

    pub fn status(&self) -> DeskStatus {
        let config = self.config();
        DeskStatus {
            mode: self.mode,
            status: self.state.status(),
            bankroll: self.state.bankroll(),
            cumulative_profit: self.state.cumulative_profit(),
            goal: config.goal_value(),
            loss_limit: config.loss_limit(),
            progress_pct: self.state.progress_pct(config),
            next_entry: self.state.current_entry(),
            operations: self.state.operations().len(),
            saved: self.saved,
        }
    }

    /// Results of saves that have already finished.
    pub async fn drain_completed(&mut self) -> Vec<Result<SavedSession>> {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.handle.is_finished());
        self.pending = running;

        let mut results = Vec::with_capacity(done.len());
        for save in done {
            let result = flatten(save.handle.await);
            self.note_result(save.generation, &result);
            results.push(result);
        }
        results
    }

    /// Wait for every pending save.
    pub async fn settle(&mut self) -> Vec<Result<SavedSession>> {
        let pending = std::mem::take(&mut self.pending);
        let generations: Vec<u64> = pending.iter().map(|p| p.generation).collect();
        let joined =
            futures::future::join_all(pending.into_iter().map(|p| p.handle)).await;

        let mut results = Vec::with_capacity(joined.len());
        for (generation, joined) in generations.into_iter().zip(joined) {
            let result = flatten(joined);
            self.note_result(generation, &result);
            results.push(result);
        }
        results
    }

    /// Leave the desk: record the session if needed and wait for every save.
    pub async fn finish(mut self) -> Vec<Result<SavedSession>> {
        self.save_current();
        self.settle().await
    }

    /// Dispatch a save for a non-empty session that is not yet saved.
    fn save_current(&mut self) -> bool {
        if self.state.is_empty() || self.saved {
            return false;
        }
        self.dispatch_save(self.state.status());
        true
    }

    fn dispatch_save(&mut self, status: SessionStatus) {
        let snapshot = SessionSnapshot::capture(
            &self.user_id,
            self.mode,
            status,
            self.sizer.config(),
            &self.state,
        );
        self.saved = true;

        let recorder = self.recorder.clone();
        let handle = tokio::spawn(async move { recorder.save(snapshot).await });
        self.pending.push(PendingSave {
            generation: self.generation,
            handle,
        });
    }

    fn restart(&mut self) {
        self.state.reset(self.sizer.config());
        self.saved = false;
        self.generation += 1;
    }

    fn note_result(&mut self, generation: u64, result: &Result<SavedSession>) {
        if let Err(e) = result {
            error!(user = %self.user_id, error = %format!("{:#}", e), "Failed to save session");
            // the current session can be saved again by the next reset or exit
            if generation == self.generation {
                self.saved = false;
            }
        }
    }
}

fn flatten(joined: Result<Result<SavedSession>, tokio::task::JoinError>) -> Result<SavedSession> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow!("save task failed: {}", e)),
    }
}

/// Snapshot of the desk for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DeskStatus {
    pub mode: TradeMode,
    pub status: SessionStatus,
    pub bankroll: Decimal,
    pub cumulative_profit: Decimal,
    pub goal: Decimal,
    pub loss_limit: Decimal,
    pub progress_pct: Decimal,
    pub next_entry: Decimal,
    pub operations: usize,
    pub saved: bool,
}

impl DeskStatus {
    /// Progress bar value, never above 100.
    pub fn display_progress(&self) -> Decimal {
        self.progress_pct.min(Decimal::ONE_HUNDRED)
    }

    pub fn encouragement(&self) -> Option<&'static str> {
        let halfway = Decimal::from(50);
        if self.status == SessionStatus::Open
            && self.progress_pct >= halfway
            && self.progress_pct < Decimal::ONE_HUNDRED
        {
            Some("You're doing great, keep it up!")
        } else {
            None
        }
    }
}

impl fmt::Display for DeskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.mode.label())?;
        writeln!(f, "Bankroll:    {:.2}", self.bankroll)?;
        writeln!(f, "Profit:      {:+.2}", self.cumulative_profit)?;
        writeln!(f, "Daily Goal:  {:.2}", self.goal)?;
        writeln!(f, "Stop Loss:   {:.2}", self.loss_limit)?;
        writeln!(f, "Progress:    {:.1}%", self.display_progress())?;
        writeln!(f, "Next Entry:  {:.2}", self.next_entry)?;
        write!(f, "Operations:  {}", self.operations)?;

        match self.status {
            SessionStatus::Meta => write!(f, "\nDaily goal reached! Reset to start a new session.")?,
            SessionStatus::Stop => {
                write!(f, "\nStop loss reached. Review your operations before continuing.")?
            }
            SessionStatus::Open => {}
        }
        if let Some(line) = self.encouragement() {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}
