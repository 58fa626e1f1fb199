//! Trade configuration: payout, starting bankroll and the three sizing rules.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{SizingKind, SizingRule};

/// Lowest payout accepted, in percent.
pub const MIN_PAYOUT_PERCENT: Decimal = dec!(0.01);

/// Highest payout accepted, in percent.
pub const MAX_PAYOUT_PERCENT: Decimal = dec!(1000);

/// Largest bankroll or fixed rule amount accepted.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// Largest daily goal accepted as a share of the bankroll, in percent.
pub const MAX_GOAL_PERCENT: Decimal = dec!(10000);

/// Immutable for the duration of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeConfig {
    /// Payout paid on a win, in percent of the stake (e.g. 80)
    #[serde(alias = "payout")]
    pub payout_percent: Decimal,

    /// Bankroll at the start of every session
    pub initial_bankroll: Decimal,

    /// Base stake per operation
    pub entry: SizingRule,

    /// Profit that closes the session as a win
    pub daily_goal: SizingRule,

    /// Loss that closes the session as a stop
    pub stop_loss: SizingRule,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            payout_percent: dec!(80),
            initial_bankroll: dec!(1000),
            entry: SizingRule::percentage(dec!(2)),
            daily_goal: SizingRule::percentage(dec!(10)),
            stop_loss: SizingRule::percentage(dec!(5)),
        }
    }
}

impl TradeConfig {
    /// Build a config from raw input, rejecting anything the engine should
    /// never see.
    pub fn new(
        payout_percent: Decimal,
        initial_bankroll: Decimal,
        entry: SizingRule,
        daily_goal: SizingRule,
        stop_loss: SizingRule,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            payout_percent,
            initial_bankroll,
            entry,
            daily_goal,
            stop_loss,
        };
        config.validate()?;
        Ok(config)
    }

    /// Bounds keep every stake, goal and limit of an accepted config well
    /// inside the `Decimal` range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payout_percent < MIN_PAYOUT_PERCENT || self.payout_percent > MAX_PAYOUT_PERCENT {
            return Err(ConfigError::InvalidPayout {
                value: self.payout_percent,
                min: MIN_PAYOUT_PERCENT,
                max: MAX_PAYOUT_PERCENT,
            });
        }
        if self.initial_bankroll <= Decimal::ZERO || self.initial_bankroll > MAX_AMOUNT {
            return Err(ConfigError::InvalidBankroll {
                value: self.initial_bankroll,
                max: MAX_AMOUNT,
            });
        }

        // A goal may exceed the bankroll; a stake or a loss limit cannot.
        for (field, rule, max_percent) in [
            ("entry", &self.entry, Decimal::ONE_HUNDRED),
            ("daily goal", &self.daily_goal, MAX_GOAL_PERCENT),
            ("stop loss", &self.stop_loss, Decimal::ONE_HUNDRED),
        ] {
            if rule.value <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveRule {
                    field,
                    value: rule.value,
                });
            }

            match rule.kind {
                SizingKind::Percentage if rule.value > max_percent => {
                    return Err(ConfigError::PercentageTooLarge {
                        field,
                        value: rule.value,
                        max: max_percent,
                    });
                }
                SizingKind::Absolute if rule.value > MAX_AMOUNT => {
                    return Err(ConfigError::AmountTooLarge {
                        field,
                        value: rule.value,
                        max: MAX_AMOUNT,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Stake of the first rung, also the flat profit targeted per cycle.
    pub fn base_entry(&self) -> Decimal {
        self.entry.resolve(self.initial_bankroll)
    }

    pub fn goal_value(&self) -> Decimal {
        self.daily_goal.resolve(self.initial_bankroll)
    }

    pub fn loss_limit(&self) -> Decimal {
        self.stop_loss.resolve(self.initial_bankroll)
    }
}

/// A stored rule: the current `{value, type}` shape, or a bare number
/// written by the old percentage-only layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredRule {
    Rule(SizingRule),
    LegacyPercent(Decimal),
}

impl From<StoredRule> for SizingRule {
    fn from(stored: StoredRule) -> Self {
        match stored {
            StoredRule::Rule(rule) => rule,
            StoredRule::LegacyPercent(value) => SizingRule::percentage(value),
        }
    }
}

/// Decode a rule column, accepting the legacy layout.
pub fn decode_rule(raw: &str) -> serde_json::Result<SizingRule> {
    serde_json::from_str::<StoredRule>(raw).map(SizingRule::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = TradeConfig::default();
        assert_eq!(config.base_entry(), dec!(20));
        assert_eq!(config.goal_value(), dec!(100));
        assert_eq!(config.loss_limit(), dec!(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_input() {
        let rule = SizingRule::percentage(dec!(2));

        let err = TradeConfig::new(dec!(0), dec!(1000), rule, rule, rule).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPayout { .. }));

        let err = TradeConfig::new(dec!(80), dec!(-5), rule, rule, rule).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidBankroll {
                value: dec!(-5),
                max: MAX_AMOUNT
            }
        );

        let err = TradeConfig::new(
            dec!(80),
            dec!(1000),
            SizingRule::absolute(dec!(0)),
            rule,
            rule,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveRule { field: "entry", .. }));

        let err = TradeConfig::new(
            dec!(80),
            dec!(1000),
            rule,
            rule,
            SizingRule::percentage(dec!(120)),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::PercentageTooLarge { field: "stop loss", .. }));
    }

    #[test]
    fn test_rejects_amounts_outside_decimal_headroom() {
        let rule = SizingRule::percentage(dec!(2));
        let huge = Decimal::from_i128_with_scale(10i128.pow(27), 0);

        // would overflow when resolving a 100% goal
        let err = TradeConfig::new(dec!(80), huge, rule, SizingRule::percentage(dec!(100)), rule)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBankroll { .. }));

        let err = TradeConfig::new(dec!(0.0000001), dec!(1000), rule, rule, rule).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPayout { .. }));

        let err = TradeConfig::new(dec!(1001), dec!(1000), rule, rule, rule).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPayout { .. }));

        let err = TradeConfig::new(dec!(80), dec!(1000), rule, rule, SizingRule::absolute(huge))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::AmountTooLarge {
                field: "stop loss",
                value: huge,
                max: MAX_AMOUNT
            }
        );

        let err = TradeConfig::new(dec!(80), dec!(1000), rule, SizingRule::percentage(dec!(20000)), rule)
            .unwrap_err();
        assert!(matches!(err, ConfigError::PercentageTooLarge { field: "daily goal", .. }));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let config = TradeConfig::new(
            MAX_PAYOUT_PERCENT,
            MAX_AMOUNT,
            SizingRule::absolute(MAX_AMOUNT),
            SizingRule::percentage(MAX_GOAL_PERCENT),
            SizingRule::percentage(dec!(100)),
        )
        .unwrap();
        assert_eq!(config.goal_value(), dec!(100000000000000));
        let one = SizingRule::absolute(dec!(1));
        assert!(TradeConfig::new(MIN_PAYOUT_PERCENT, dec!(1), one, one, one).is_ok());
    }

    #[test]
    fn test_goal_above_bankroll_is_allowed() {
        let config = TradeConfig {
            daily_goal: SizingRule::percentage(dec!(250)),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.goal_value(), dec!(2500));
    }

    #[test]
    fn test_decode_legacy_rule() {
        assert_eq!(decode_rule("3").unwrap(), SizingRule::percentage(dec!(3)));
        assert_eq!(
            decode_rule(r#"{"value":"25","type":"currency"}"#).unwrap(),
            SizingRule::absolute(dec!(25))
        );
        assert!(decode_rule("\"nope\"").is_err());
    }
}
