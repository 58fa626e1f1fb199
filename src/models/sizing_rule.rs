//! Sizing rules: an amount that is either a share of a reference bankroll or
//! a fixed currency value.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a rule's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingKind {
    /// Percent of the reference amount
    #[serde(alias = "percent")]
    Percentage,
    /// Fixed currency amount
    #[serde(rename = "currency", alias = "absolute")]
    Absolute,
}

/// Entry size, daily goal or stop-loss rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingRule {
    pub value: Decimal,
    #[serde(rename = "type")]
    pub kind: SizingKind,
}

impl SizingRule {
    pub fn percentage(value: Decimal) -> Self {
        Self {
            value,
            kind: SizingKind::Percentage,
        }
    }

    pub fn absolute(value: Decimal) -> Self {
        Self {
            value,
            kind: SizingKind::Absolute,
        }
    }

    /// Resolve to a currency amount against `reference`.
    ///
    /// Total for any input: zero or negative values resolve to degenerate
    /// amounts and percentages above 100 are not clamped. Results beyond the
    /// `Decimal` range saturate.
    pub fn resolve(&self, reference: Decimal) -> Decimal {
        match self.kind {
            SizingKind::Percentage => match reference.checked_mul(self.value) {
                Some(product) => product / Decimal::ONE_HUNDRED,
                None => (reference / Decimal::ONE_HUNDRED).saturating_mul(self.value),
            },
            SizingKind::Absolute => self.value,
        }
    }

    pub fn is_percentage(&self) -> bool {
        self.kind == SizingKind::Percentage
    }
}

impl fmt::Display for SizingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SizingKind::Percentage => write!(f, "{}%", self.value.normalize()),
            SizingKind::Absolute => write!(f, "{:.2}", self.value),
        }
    }
}

/// Parses `"2%"` as a percentage and `"20"` as an absolute amount.
impl FromStr for SizingRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ConfigError::InvalidRule(s.to_string());

        match trimmed.strip_suffix('%') {
            Some(pct) => Decimal::from_str(pct.trim())
                .map(Self::percentage)
                .map_err(|_| invalid()),
            None => Decimal::from_str(trimmed)
                .map(Self::absolute)
                .map_err(|_| invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_is_linear_in_value() {
        let reference = dec!(1000);
        assert_eq!(SizingRule::percentage(dec!(2)).resolve(reference), dec!(20));
        assert_eq!(SizingRule::percentage(dec!(4)).resolve(reference), dec!(40));
        assert_eq!(SizingRule::percentage(dec!(0.5)).resolve(reference), dec!(5));
    }

    #[test]
    fn test_absolute_ignores_reference() {
        let rule = SizingRule::absolute(dec!(25));
        assert_eq!(rule.resolve(dec!(1000)), dec!(25));
        assert_eq!(rule.resolve(dec!(1)), dec!(25));
    }

    #[test]
    fn test_degenerate_values_pass_through() {
        assert_eq!(SizingRule::percentage(dec!(0)).resolve(dec!(1000)), dec!(0));
        assert_eq!(SizingRule::percentage(dec!(-1)).resolve(dec!(1000)), dec!(-10));
        // not clamped at 100%
        assert_eq!(SizingRule::percentage(dec!(150)).resolve(dec!(100)), dec!(150));
    }

    #[test]
    fn test_resolve_near_decimal_range() {
        let reference = Decimal::from_i128_with_scale(10i128.pow(27), 0);
        assert_eq!(
            SizingRule::percentage(dec!(200)).resolve(reference),
            Decimal::from_i128_with_scale(2 * 10i128.pow(27), 0)
        );

        let saturated = SizingRule::percentage(dec!(1000)).resolve(Decimal::MAX);
        assert_eq!(saturated, Decimal::MAX);
    }

    #[test]
    fn test_parse() {
        assert_eq!("2%".parse::<SizingRule>().unwrap(), SizingRule::percentage(dec!(2)));
        assert_eq!(" 2.5 % ".parse::<SizingRule>().unwrap(), SizingRule::percentage(dec!(2.5)));
        assert_eq!("20".parse::<SizingRule>().unwrap(), SizingRule::absolute(dec!(20)));
        assert!(matches!("abc".parse::<SizingRule>(), Err(ConfigError::InvalidRule(_))));
        assert!("%".parse::<SizingRule>().is_err());
    }

    #[test]
    fn test_json_shape() {
        let rule: SizingRule =
            serde_json::from_str(r#"{"value": 2, "type": "percentage"}"#).unwrap();
        assert_eq!(rule, SizingRule::percentage(dec!(2)));

        let rule: SizingRule =
            serde_json::from_str(r#"{"value": "15.5", "type": "currency"}"#).unwrap();
        assert_eq!(rule, SizingRule::absolute(dec!(15.5)));
    }
}
