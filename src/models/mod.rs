//! Data models for sizing rules, operations, sessions and subscriptions.

mod operation;
mod session;
mod sizing_rule;
mod subscription;

pub use operation::{Operation, Outcome};
pub use session::{SessionStatus, TradeMode};
pub use sizing_rule::{SizingKind, SizingRule};
pub use subscription::{Subscription, SubscriptionStatus};
