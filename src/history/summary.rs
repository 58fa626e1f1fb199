//! Aggregate statistics over stored sessions.

use std::fmt;

use statrs::statistics::Statistics;

use crate::db::StoredSession;
use crate::models::SessionStatus;

/// Summary of a filtered set of sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub sessions: usize,
    pub goals: usize,
    pub stops: usize,
    pub open: usize,
    pub total_profit: f64,
    pub mean_profit: f64,
    pub profit_std_dev: f64,
    pub best_profit: f64,
    pub worst_profit: f64,
}

impl HistorySummary {
    pub fn from_sessions(sessions: &[StoredSession]) -> Self {
        let mut summary = Self {
            sessions: sessions.len(),
            ..Default::default()
        };

        if sessions.is_empty() {
            return summary;
        }

        for session in sessions {
            match session.status.parse::<SessionStatus>() {
                Ok(SessionStatus::Meta) => summary.goals += 1,
                Ok(SessionStatus::Stop) => summary.stops += 1,
                _ => summary.open += 1,
            }
        }

        let profits: Vec<f64> = sessions.iter().map(|s| s.total_profit).collect();

        summary.total_profit = profits.iter().sum();
        summary.mean_profit = Statistics::mean(&profits);
        // sample deviation is undefined for a single session
        if profits.len() > 1 {
            summary.profit_std_dev = Statistics::std_dev(&profits);
        }
        summary.best_profit = Statistics::max(&profits);
        summary.worst_profit = Statistics::min(&profits);

        summary
    }

    /// Share of sessions closed at the daily goal (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.sessions == 0 {
            return 0.0;
        }
        self.goals as f64 / self.sessions as f64
    }
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== History Summary ===")?;
        writeln!(f, "Sessions:       {}", self.sessions)?;
        writeln!(f, "  Goal reached: {}", self.goals)?;
        writeln!(f, "  Stop loss:    {}", self.stops)?;
        writeln!(f, "  Open:         {}", self.open)?;
        writeln!(f, "Success Rate:   {:.1}%", self.success_rate() * 100.0)?;
        writeln!(f, "Total Profit:   {:+.2}", self.total_profit)?;
        writeln!(f, "Mean / Session: {:+.2}", self.mean_profit)?;
        writeln!(f, "Std Deviation:  {:.2}", self.profit_std_dev)?;
        writeln!(f, "Best Session:   {:+.2}", self.best_profit)?;
        write!(f, "Worst Session:  {:+.2}", self.worst_profit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(status: &str, profit: f64) -> StoredSession {
        StoredSession {
            id: format!("{}-{}", status, profit),
            user_id: "ana".to_string(),
            session_date: "2026-10-19".to_string(),
            label: "Session 1".to_string(),
            initial_bankroll: 1000.0,
            final_bankroll: 1000.0 + profit,
            total_profit: profit,
            status: status.to_string(),
            mode: "real".to_string(),
            notes: None,
            created_at: "2026-10-19 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_summary() {
        let sessions = vec![
            stored("Meta", 100.0),
            stored("Stop", -50.0),
            stored("Open", 10.0),
            stored("Meta", 120.0),
        ];
        let summary = HistorySummary::from_sessions(&sessions);

        assert_eq!(summary.sessions, 4);
        assert_eq!(summary.goals, 2);
        assert_eq!(summary.stops, 1);
        assert_eq!(summary.open, 1);
        assert!((summary.total_profit - 180.0).abs() < 1e-9);
        assert!((summary.mean_profit - 45.0).abs() < 1e-9);
        assert!(summary.profit_std_dev > 0.0);
        assert_eq!(summary.best_profit, 120.0);
        assert_eq!(summary.worst_profit, -50.0);
        assert!((summary.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_and_empty() {
        let summary = HistorySummary::from_sessions(&[stored("Open", 5.0)]);
        assert_eq!(summary.profit_std_dev, 0.0);
        assert_eq!(summary.mean_profit, 5.0);

        let empty = HistorySummary::from_sessions(&[]);
        assert_eq!(empty, HistorySummary::default());
        assert_eq!(empty.success_rate(), 0.0);
    }
}
