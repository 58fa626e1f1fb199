//! Position sizing: flat base stake, Martingale recovery ladder and the
//! conservative reset.

use rust_decimal::Decimal;

use crate::models::Outcome;

use super::TradeConfig;

/// User action that settles the current stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Win,
    /// Loss followed by a Martingale recovery stake
    Loss,
    /// Loss followed by a return to the base stake
    ConservativeLoss,
}

impl TradeAction {
    pub fn outcome(&self) -> Outcome {
        match self {
            TradeAction::Win => Outcome::Win,
            TradeAction::Loss | TradeAction::ConservativeLoss => Outcome::Loss,
        }
    }
}

/// Arithmetic result of settling one stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingStep {
    pub outcome: Outcome,
    pub stake: Decimal,
    pub profit_loss: Decimal,
    pub bankroll_after: Decimal,
    pub next_entry: Decimal,
}

/// One rung of a projected losing streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderRung {
    /// 1-based rung number
    pub rung: usize,
    pub stake: Decimal,
    /// Sum of every stake lost up to and including this rung
    pub cumulative_loss: Decimal,
    /// Profit if this rung wins after all previous rungs lost
    pub net_if_win: Decimal,
}

/// Calculator for stakes, independent of session bookkeeping.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: TradeConfig,
}

impl PositionSizer {
    pub fn new(config: TradeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    /// Stake used at session start, after a win and after a conservative loss.
    pub fn base_entry(&self) -> Decimal {
        self.config.base_entry()
    }

    /// Payout as a fraction (80% -> 0.8).
    pub fn payout_ratio(&self) -> Decimal {
        self.config.payout_percent / Decimal::ONE_HUNDRED
    }

    /// Stake that, if it wins, recovers `lost_stake` and still nets one base
    /// entry of profit: `(lost + base) / payout`.
    ///
    /// Saturates at `Decimal::MAX` when the payout is zero or the stake does
    /// not fit, so the next loss closes the session at the stop loss.
    pub fn recovery_entry(&self, lost_stake: Decimal) -> Decimal {
        lost_stake
            .saturating_add(self.base_entry())
            .checked_div(self.payout_ratio())
            .unwrap_or(Decimal::MAX)
    }

    /// Settle `current_entry` against `bankroll`.
    pub fn step(&self, action: TradeAction, current_entry: Decimal, bankroll: Decimal) -> SizingStep {
        match action {
            TradeAction::Win => {
                let profit = current_entry.saturating_mul(self.payout_ratio());
                SizingStep {
                    outcome: Outcome::Win,
                    stake: current_entry,
                    profit_loss: profit,
                    bankroll_after: bankroll.saturating_add(profit),
                    next_entry: self.base_entry(),
                }
            }
            TradeAction::Loss => SizingStep {
                outcome: Outcome::Loss,
                stake: current_entry,
                profit_loss: -current_entry,
                bankroll_after: bankroll.saturating_sub(current_entry),
                next_entry: self.recovery_entry(current_entry),
            },
            TradeAction::ConservativeLoss => SizingStep {
                outcome: Outcome::Loss,
                stake: current_entry,
                profit_loss: -current_entry,
                bankroll_after: bankroll.saturating_sub(current_entry),
                next_entry: self.base_entry(),
            },
        }
    }

    /// Project `rungs` consecutive Martingale losses from the base stake.
    ///
    /// Stops early if the stakes overflow.
    pub fn ladder(&self, rungs: usize) -> Vec<LadderRung> {
        let mut ladder = Vec::with_capacity(rungs);
        let mut stake = self.base_entry();
        let mut cumulative_loss = Decimal::ZERO;

        for rung in 1..=rungs {
            let Some(total) = cumulative_loss.checked_add(stake) else {
                break;
            };
            let Some(payout) = stake.checked_mul(self.payout_ratio()) else {
                break;
            };

            ladder.push(LadderRung {
                rung,
                stake,
                cumulative_loss: total,
                net_if_win: payout - cumulative_loss,
            });

            cumulative_loss = total;
            let Some(next) = stake
                .checked_add(self.base_entry())
                .and_then(|s| s.checked_div(self.payout_ratio()))
            else {
                break;
            };
            stake = next;
        }

        ladder
    }
}
