//! Subscription gate in front of the desk and the history.

use anyhow::Result;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::AccessError;
use crate::models::Subscription;

/// Decide whether `user` may use the desk given their subscription record.
/// Returns the user id on success.
pub fn evaluate(user: Option<&str>, subscription: Option<&Subscription>) -> Result<String, AccessError> {
    let user = user
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AccessError::NoIdentity)?;

    match subscription {
        Some(sub) if sub.is_active() => Ok(user.to_string()),
        other => Err(AccessError::NoActivePlan {
            user: user.to_string(),
            status: other.map(|s| s.status),
        }),
    }
}

/// Look up the user's subscription and apply `evaluate`.
pub async fn require_active(db: &Database, user: Option<&str>) -> Result<String> {
    let Some(user_id) = user.map(str::trim).filter(|u| !u.is_empty()) else {
        return Err(AccessError::NoIdentity.into());
    };

    let subscription = db.get_subscription(user_id).await?;
    match evaluate(Some(user_id), subscription.as_ref()) {
        Ok(user_id) => {
            debug!(user = %user_id, "Access granted");
            Ok(user_id)
        }
        Err(e) => {
            warn!(user = %user_id, error = %e, "Access denied");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionStatus;

    fn sub(status: SubscriptionStatus) -> Subscription {
        Subscription {
            user_id: "ana".to_string(),
            status,
            current_period_end: None,
        }
    }

    #[test]
    fn test_trialing_and_active_grant_access() {
        assert_eq!(evaluate(Some("ana"), Some(&sub(SubscriptionStatus::Trialing))), Ok("ana".to_string()));
        assert_eq!(evaluate(Some(" ana "), Some(&sub(SubscriptionStatus::Active))), Ok("ana".to_string()));
    }

    #[test]
    fn test_other_statuses_are_denied() {
        for status in [
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Paused,
        ] {
            assert_eq!(
                evaluate(Some("ana"), Some(&sub(status))),
                Err(AccessError::NoActivePlan {
                    user: "ana".to_string(),
                    status: Some(status)
                })
            );
        }
        assert_eq!(
            evaluate(Some("ana"), None),
            Err(AccessError::NoActivePlan {
                user: "ana".to_string(),
                status: None
            })
        );
    }

    #[test]
    fn test_missing_identity() {
        assert_eq!(evaluate(None, None), Err(AccessError::NoIdentity));
        assert_eq!(evaluate(Some("  "), Some(&sub(SubscriptionStatus::Active))), Err(AccessError::NoIdentity));
    }

    #[tokio::test]
    async fn test_require_active_reads_database() {
        let db = tokio_test::assert_ok!(Database::new("sqlite::memory:").await);
        assert!(require_active(&db, Some("ana")).await.is_err());

        db.upsert_subscription(&sub(SubscriptionStatus::Active)).await.unwrap();
        assert_eq!(require_active(&db, Some("ana")).await.unwrap(), "ana");

        let err = require_active(&db, None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<AccessError>(), Some(&AccessError::NoIdentity));
    }
}
