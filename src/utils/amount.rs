//! 金额工具
//!
//! 金额统一用 `Decimal`；只在进入币种选择或交易构造时换算成整数最小单位

use std::str::FromStr;

use ethers::types::U256;
use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::error::AmountError;

fn scale_factor(decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(decimals), 0)
}

/// 解析用户输入的十进制金额（不接受科学计数法）
pub fn parse_amount(s: &str, decimals: u32) -> Result<Decimal, AmountError> {
    let value = Decimal::from_str(s.trim()).map_err(|e| AmountError::Parse(e.to_string()))?;
    validate_amount(value, decimals)?;
    Ok(value)
}

/// 金额必须为正，且小数位不超过币种精度
pub fn validate_amount(value: Decimal, decimals: u32) -> Result<(), AmountError> {
    if value <= Decimal::ZERO {
        return Err(AmountError::NotPositive(value));
    }
    if value.normalize().scale() > decimals {
        return Err(AmountError::TooManyDecimals {
            value,
            max: decimals,
        });
    }
    Ok(())
}

/// 换算成整数最小单位（satoshi）
pub fn to_base_units(value: Decimal, decimals: u32) -> Result<u64, AmountError> {
    if value.is_sign_negative() {
        return Err(AmountError::NotPositive(value));
    }
    let scaled = value
        .checked_mul(scale_factor(decimals))
        .ok_or(AmountError::Overflow(value))?;
    if !scaled.fract().is_zero() {
        return Err(AmountError::TooManyDecimals {
            value,
            max: decimals,
        });
    }
    scaled.to_u64().ok_or(AmountError::Overflow(value))
}

pub fn from_base_units(units: u64, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, decimals).normalize()
}

/// 换算成 U256 最小单位（wei）
pub fn to_u256_units(value: Decimal, decimals: u32) -> Result<U256, AmountError> {
    if value.is_sign_negative() {
        return Err(AmountError::NotPositive(value));
    }
    let scaled = value
        .checked_mul(scale_factor(decimals))
        .ok_or(AmountError::Overflow(value))?;
    if !scaled.fract().is_zero() {
        return Err(AmountError::TooManyDecimals {
            value,
            max: decimals,
        });
    }
    U256::from_dec_str(&scaled.trunc().normalize().to_string())
        .map_err(|e| AmountError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0.5", 18).unwrap(), Decimal::new(5, 1));
        assert!(matches!(
            parse_amount("0", 8),
            Err(AmountError::NotPositive(_))
        ));
        assert!(matches!(
            parse_amount("-1", 8),
            Err(AmountError::NotPositive(_))
        ));
        assert!(matches!(
            parse_amount("0.000000001", 8),
            Err(AmountError::TooManyDecimals { max: 8, .. })
        ));
        assert!(parse_amount("abc", 8).is_err());
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_decimals() {
        let value = Decimal::from_str("1.500000000000").unwrap();
        assert!(validate_amount(value, 8).is_ok());
    }

    #[test]
    fn test_base_units() {
        assert_eq!(to_base_units(Decimal::new(3, 3), 8).unwrap(), 300_000);
        assert_eq!(from_base_units(200_000, 8), Decimal::new(2, 3));
        assert!(to_base_units(Decimal::new(1, 9), 8).is_err());
    }

    #[test]
    fn test_u256_units() {
        let wei = to_u256_units(Decimal::new(5, 1), 18).unwrap();
        assert_eq!(wei, U256::from(500_000_000_000_000_000u64));

        let big = to_u256_units(Decimal::from(1_000_000u64), 18).unwrap();
        assert_eq!(big, U256::from_dec_str("1000000000000000000000000").unwrap());

        let gwei = to_u256_units(Decimal::new(20, 9), 18).unwrap();
        assert_eq!(gwei, U256::from(20_000_000_000u64));
    }
}
