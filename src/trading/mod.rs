//! Trading logic: configuration, position sizing, session state and the desk.

mod config;
mod desk;
mod position_sizer;
mod session;

pub use config::{decode_rule, StoredRule, TradeConfig};
pub use desk::{DeskStatus, TradingDesk};
pub use position_sizer::{LadderRung, PositionSizer, SizingStep, TradeAction};
pub use session::{SessionState, ThresholdEvent, Transition};
