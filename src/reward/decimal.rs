//! Decimal parsing for chain amounts
//!
//! Chain arguments carry amounts either as asset strings (`"1000.000 GLS"`),
//! plain decimal strings, or JSON numbers. All of them are read into
//! [`BigDecimal`] without passing through floating point.

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use serde_json::Value as JsonValue;

use crate::types::{PrismError, Result};

/// Basis of percent arguments (`10000` = 100%)
pub const PERCENT_BASE: i64 = 10_000;

/// Amount plus symbol of an asset string
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub amount: BigDecimal,
    pub symbol: String,
}

impl FromStr for Asset {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let amount = parts
            .next()
            .ok_or_else(|| PrismError::Validation("empty asset".into()))?;
        let symbol = parts.next().unwrap_or_default().to_string();
        if parts.next().is_some() {
            return Err(PrismError::Validation(format!("malformed asset '{}'", s)));
        }
        let amount = BigDecimal::from_str(amount)
            .map_err(|e| PrismError::Validation(format!("bad asset amount '{}': {}", s, e)))?;
        Ok(Self { amount, symbol })
    }
}

/// Read a decimal from a JSON number, decimal string or asset string
pub fn decimal_from_json(value: &JsonValue) -> Result<BigDecimal> {
    match value {
        JsonValue::Number(n) => BigDecimal::from_str(&n.to_string())
            .map_err(|e| PrismError::Validation(format!("bad number {}: {}", n, e))),
        JsonValue::String(s) => Ok(s.parse::<Asset>()?.amount),
        JsonValue::Null => Ok(BigDecimal::zero()),
        other => Err(PrismError::Validation(format!(
            "expected a decimal, got {}",
            other
        ))),
    }
}

/// `value * percent / 10000`
pub fn apply_percent(value: &BigDecimal, percent: i64) -> BigDecimal {
    value * &BigDecimal::from(percent) / BigDecimal::from(PERCENT_BASE)
}

/// Canonical form for storage: trailing zeros dropped
pub fn normalized(value: BigDecimal) -> BigDecimal {
    if value.is_zero() {
        BigDecimal::zero()
    } else {
        value.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_asset() {
        let asset: Asset = "1000.000 GLS".parse().unwrap();
        assert_eq!(asset.amount, BigDecimal::from(1000));
        assert_eq!(asset.symbol, "GLS");

        let bare: Asset = "0.5".parse().unwrap();
        assert_eq!(bare.symbol, "");
        assert!("1.0 GLS extra".parse::<Asset>().is_err());
        assert!("abc GLS".parse::<Asset>().is_err());
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!(42)).unwrap(), BigDecimal::from(42));
        assert_eq!(
            decimal_from_json(&json!("12.500 GLS")).unwrap(),
            BigDecimal::from_str("12.5").unwrap()
        );
        assert_eq!(
            decimal_from_json(&json!("123456789012345678901234567890")).unwrap(),
            BigDecimal::from_str("123456789012345678901234567890").unwrap()
        );
        assert!(decimal_from_json(&json!([1])).is_err());
    }

    #[test]
    fn test_apply_percent_exact() {
        let value = BigDecimal::from(375);
        assert_eq!(apply_percent(&value, 1000), BigDecimal::from_str("37.5").unwrap());
    }

    #[test]
    fn test_normalized_strips_zeros() {
        let v = BigDecimal::from_str("168.7500").unwrap();
        assert_eq!(normalized(v).to_string(), "168.75");
        assert_eq!(normalized(BigDecimal::from_str("0.000").unwrap()).to_string(), "0");
    }
}
