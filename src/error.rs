//! Typed errors for the seams whose callers branch on the cause.
//!
//! Plumbing (database, recorder, CLI) stays on `anyhow`; these are the
//! errors a caller is expected to match on.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{SessionStatus, SubscriptionStatus};

/// Rejected user input, raised before a `TradeConfig` is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("payout must be between {min}% and {max}%, got {value}%")]
    InvalidPayout {
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("initial bankroll must be greater than zero and at most {max}, got {value}")]
    InvalidBankroll { value: Decimal, max: Decimal },

    #[error("{field} must be greater than zero, got {value}")]
    NonPositiveRule { field: &'static str, value: Decimal },

    #[error("{field} cannot exceed {max}% of the bankroll, got {value}%")]
    PercentageTooLarge {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    #[error("{field} cannot exceed {max}, got {value}")]
    AmountTooLarge {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    #[error("invalid amount '{0}': expected a number like 20 or a percentage like 2%")]
    InvalidRule(String),

    #[error("unknown trade mode '{0}' (expected real or training)")]
    InvalidMode(String),

    #[error("unknown history mode '{0}' (expected real, training or all)")]
    InvalidModeFilter(String),

    #[error("unknown operation result '{0}'")]
    InvalidOutcome(String),

    #[error("unknown session status '{0}'")]
    InvalidStatus(String),

    #[error("unknown subscription status '{0}'")]
    InvalidSubscriptionStatus(String),
}

/// An action the desk refused to dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeskError {
    #[error("session closed ({0}); reset to start a new one")]
    SessionClosed(SessionStatus),

    #[error("no trade configuration saved; run `bankroll config set` or `bankroll config defaults` first")]
    NoConfiguration,
}

/// Why the calculator and history are not available to a user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("no user identity; pass --user or set BANKROLL_USER")]
    NoIdentity,

    #[error("no active plan for {user}{}", describe_status(.status))]
    NoActivePlan {
        user: String,
        status: Option<SubscriptionStatus>,
    },
}

fn describe_status(status: &Option<SubscriptionStatus>) -> String {
    match status {
        Some(s) => format!(" (subscription is {})", s.as_str()),
        None => String::new(),
    }
}
