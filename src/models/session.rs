//! Session tags: which book a session belongs to and how it ended.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Logical book a session is recorded under. Does not affect arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    #[default]
    Real,
    Training,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Real => "real",
            TradeMode::Training => "training",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TradeMode::Real => TradeMode::Training,
            TradeMode::Training => TradeMode::Real,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradeMode::Real => "Real account",
            TradeMode::Training => "Training account",
        }
    }
}

impl FromStr for TradeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "real" => Ok(Self::Real),
            "training" | "train" | "demo" => Ok(Self::Training),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status stored with a saved session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Daily goal reached
    Meta,
    /// Stop-loss reached
    Stop,
    /// Saved before reaching either threshold
    Open,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Meta => "Meta",
            SessionStatus::Stop => "Stop",
            SessionStatus::Open => "Open",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Open)
    }
}

impl FromStr for SessionStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meta" | "goal" => Ok(Self::Meta),
            "stop" => Ok(Self::Stop),
            "open" => Ok(Self::Open),
            other => Err(ConfigError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_toggle_and_parse() {
        assert_eq!(TradeMode::Real.toggled(), TradeMode::Training);
        assert_eq!(TradeMode::Training.toggled(), TradeMode::Real);
        assert_eq!("Training".parse::<TradeMode>().unwrap(), TradeMode::Training);
        assert!("paper".parse::<TradeMode>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [SessionStatus::Meta, SessionStatus::Stop, SessionStatus::Open] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!(SessionStatus::Meta.is_terminal());
        assert!(!SessionStatus::Open.is_terminal());
    }
}
