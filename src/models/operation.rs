//! A single recorded trade within a session.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result of one binary option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

impl FromStr for Outcome {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" => Ok(Self::Win),
            "loss" => Ok(Self::Loss),
            other => Err(ConfigError::InvalidOutcome(other.to_string())),
        }
    }
}

/// Immutable record appended to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// 1-based position within the session
    pub sequence_id: u32,

    /// Stake placed on this operation
    pub entry_value: Decimal,

    pub outcome: Outcome,

    /// Signed result: payout on a win, minus the stake on a loss
    pub profit_loss: Decimal,

    /// Bankroll right after this operation, before any stop-loss clamp
    pub bankroll_after: Decimal,

    pub timestamp: DateTime<Utc>,
}

impl Operation {
    pub fn is_win(&self) -> bool {
        self.outcome == Outcome::Win
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parse() {
        assert_eq!("win".parse::<Outcome>(), Ok(Outcome::Win));
        assert_eq!(" LOSS ".parse::<Outcome>(), Ok(Outcome::Loss));
        assert_eq!(Outcome::Win.as_str().parse::<Outcome>(), Ok(Outcome::Win));
    }

    #[test]
    fn test_outcome_rejects_unknown_values() {
        assert_eq!(
            "draw".parse::<Outcome>(),
            Err(ConfigError::InvalidOutcome("draw".to_string()))
        );
        assert!("".parse::<Outcome>().is_err());
    }
}
