//! Session bookkeeping: bankroll, operation log and the goal/stop-loss
//! thresholds.
//!
//! The state never refuses an action. Whether a closed session may keep
//! trading is decided by the caller (see `TradingDesk`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Operation, SessionStatus};

use super::{PositionSizer, TradeAction, TradeConfig};

/// Threshold crossed by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdEvent {
    GoalReached {
        profit: Decimal,
        goal: Decimal,
    },
    StopLossReached {
        limit: Decimal,
        /// Amount lost beyond the limit by the triggering operation
        overshoot: Decimal,
    },
}

impl ThresholdEvent {
    pub fn status(&self) -> SessionStatus {
        match self {
            ThresholdEvent::GoalReached { .. } => SessionStatus::Meta,
            ThresholdEvent::StopLossReached { .. } => SessionStatus::Stop,
        }
    }
}

/// What a single action did.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub operation: Operation,
    pub next_entry: Decimal,
    pub threshold: Option<ThresholdEvent>,
}

/// In-memory state of the running session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    bankroll: Decimal,
    current_entry: Decimal,
    operations: Vec<Operation>,
    cumulative_profit: Decimal,
    goal_reached: bool,
    stop_loss_reached: bool,
}

impl SessionState {
    pub fn new(config: &TradeConfig) -> Self {
        Self {
            bankroll: config.initial_bankroll,
            current_entry: config.base_entry(),
            operations: Vec::new(),
            cumulative_profit: Decimal::ZERO,
            goal_reached: false,
            stop_loss_reached: false,
        }
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    pub fn current_entry(&self) -> Decimal {
        self.current_entry
    }

    /// Operations in chronological order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn cumulative_profit(&self) -> Decimal {
        self.cumulative_profit
    }

    pub fn goal_reached(&self) -> bool {
        self.goal_reached
    }

    pub fn stop_loss_reached(&self) -> bool {
        self.stop_loss_reached
    }

    pub fn is_terminal(&self) -> bool {
        self.goal_reached || self.stop_loss_reached
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn status(&self) -> SessionStatus {
        if self.goal_reached {
            SessionStatus::Meta
        } else if self.stop_loss_reached {
            SessionStatus::Stop
        } else {
            SessionStatus::Open
        }
    }

    /// Settle the current stake, append the operation and re-evaluate the
    /// thresholds in one step.
    pub fn apply(
        &mut self,
        sizer: &PositionSizer,
        action: TradeAction,
        at: DateTime<Utc>,
    ) -> Transition {
        let step = sizer.step(action, self.current_entry, self.bankroll);

        let operation = Operation {
            sequence_id: self.operations.len() as u32 + 1,
            entry_value: step.stake,
            outcome: step.outcome,
            profit_loss: step.profit_loss,
            bankroll_after: step.bankroll_after,
            timestamp: at,
        };
        self.operations.push(operation.clone());
        self.bankroll = step.bankroll_after;
        self.current_entry = step.next_entry;

        let threshold = self.evaluate_thresholds(sizer.config());

        Transition {
            operation,
            next_entry: self.current_entry,
            threshold,
        }
    }

    /// Recompute the cumulative profit and close the session if a threshold
    /// was crossed. Goal is checked before stop-loss.
    ///
    /// Fires at most once per session: a closed session only has its profit
    /// recomputed. Does nothing before the first operation.
    pub fn evaluate_thresholds(&mut self, config: &TradeConfig) -> Option<ThresholdEvent> {
        if self.operations.is_empty() {
            return None;
        }

        let profit = self.bankroll.saturating_sub(config.initial_bankroll);
        if self.is_terminal() {
            self.cumulative_profit = profit;
            return None;
        }

        let goal = config.goal_value();
        if profit >= goal {
            self.goal_reached = true;
            self.cumulative_profit = profit;
            return Some(ThresholdEvent::GoalReached { profit, goal });
        }

        let limit = config.loss_limit();
        if profit <= -limit {
            let floor = config.initial_bankroll - limit;
            let overshoot = floor.saturating_sub(self.bankroll);

            // Result is reported exactly at the limit even if the last loss
            // went past it.
            self.stop_loss_reached = true;
            self.bankroll = floor;
            self.cumulative_profit = -limit;
            return Some(ThresholdEvent::StopLossReached { limit, overshoot });
        }

        self.cumulative_profit = profit;
        None
    }

    /// Back to the values derived from `config`.
    pub fn reset(&mut self, config: &TradeConfig) {
        *self = Self::new(config);
    }

    /// Share of the daily goal achieved, in percent. Zero when the goal is
    /// not positive.
    pub fn progress_pct(&self, config: &TradeConfig) -> Decimal {
        let goal = config.goal_value();
        if goal <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        match self.cumulative_profit.checked_div(goal) {
            Some(ratio) => ratio.saturating_mul(Decimal::ONE_HUNDRED),
            None if self.cumulative_profit.is_sign_negative() => Decimal::MIN,
            None => Decimal::MAX,
        }
    }
}
