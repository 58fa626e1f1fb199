//! Subscription record mirrored from the billing processor.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
        }
    }

    /// Only trialing and active plans unlock the desk.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "incomplete" => Ok(Self::Incomplete),
            "incomplete_expired" => Ok(Self::IncompleteExpired),
            "unpaid" => Ok(Self::Unpaid),
            "paused" => Ok(Self::Paused),
            other => Err(ConfigError::InvalidSubscriptionStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status.grants_access()
    }

    /// Whole days left in the current billing period, never negative.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> i64 {
        self.current_period_end
            .map(|end| (end - now).num_days().max(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_access_statuses() {
        assert!(SubscriptionStatus::Trialing.grants_access());
        assert!(SubscriptionStatus::Active.grants_access());
        assert!(!SubscriptionStatus::PastDue.grants_access());
        assert!(!SubscriptionStatus::Canceled.grants_access());
        assert_eq!(
            "cancelled".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn test_remaining_days() {
        let now = Utc::now();
        let mut sub = Subscription {
            user_id: "ana@example.com".to_string(),
            status: SubscriptionStatus::Active,
            current_period_end: Some(now + Duration::days(12) + Duration::hours(3)),
        };
        assert_eq!(sub.remaining_days(now), 12);

        sub.current_period_end = Some(now - Duration::days(2));
        assert_eq!(sub.remaining_days(now), 0);

        sub.current_period_end = None;
        assert_eq!(sub.remaining_days(now), 0);
    }
}
