//! Session history: recording finished sessions and browsing them.

mod recorder;
mod summary;

use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::ConfigError;
use crate::models::TradeMode;

pub use recorder::{HistoryRecorder, HistoryStore, SavedSession, SessionRecord, SessionSnapshot};
pub use summary::HistorySummary;

#[cfg(test)]
pub(crate) use recorder::tests::MemoryStore;

/// Which book(s) to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeFilter {
    #[default]
    Real,
    Training,
    All,
}

impl FromStr for ModeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "both" => Ok(Self::All),
            other => match other.parse::<TradeMode>() {
                Ok(TradeMode::Real) => Ok(Self::Real),
                Ok(TradeMode::Training) => Ok(Self::Training),
                Err(_) => Err(ConfigError::InvalidModeFilter(s.to_string())),
            },
        }
    }
}

impl ModeFilter {
    pub fn mode(&self) -> Option<TradeMode> {
        match self {
            ModeFilter::Real => Some(TradeMode::Real),
            ModeFilter::Training => Some(TradeMode::Training),
            ModeFilter::All => None,
        }
    }
}

/// Date and mode filter for listing sessions.
///
/// Only `from` selects a single day; `from` and `to` select an inclusive
/// range.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub mode: ModeFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_filter_parse() {
        assert_eq!("real".parse::<ModeFilter>().unwrap(), ModeFilter::Real);
        assert_eq!("Training".parse::<ModeFilter>().unwrap(), ModeFilter::Training);
        assert_eq!("all".parse::<ModeFilter>().unwrap(), ModeFilter::All);
        assert_eq!(ModeFilter::All.mode(), None);
    }

    #[test]
    fn test_mode_filter_rejects_typos() {
        assert_eq!(
            "trainig".parse::<ModeFilter>(),
            Err(ConfigError::InvalidModeFilter("trainig".to_string()))
        );
    }
}
