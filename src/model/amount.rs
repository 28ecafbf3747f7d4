use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// number of fraction digits kept in every display amount and fee figure
pub const AMOUNT_SCALE: u32 = 2;

const MINOR_UNIT_FACTOR: u32 = 100;

#[derive(Debug, PartialEq, Eq)]
pub enum AmountModelError {
    Unparseable(String),
    NonPositive(Decimal),
    PrecisionExceeded(Decimal),
    Overflow(String),
}

/// half-up at 2 decimal places, e.g. 22.485 becomes 22.49 , this is part of
/// the merchant-facing financial contract, do not switch to banker's rounding
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn parse_amount(raw: &str) -> Result<Decimal, AmountModelError> {
    let value = Decimal::from_str_exact(raw.trim())
        .map_err(|_e| AmountModelError::Unparseable(raw.to_string()))?;
    if value <= Decimal::ZERO {
        return Err(AmountModelError::NonPositive(value));
    }
    if value.scale() > AMOUNT_SCALE {
        return Err(AmountModelError::PrecisionExceeded(value));
    }
    Ok(value)
}

/// ledger legs carry unsigned integer minor units, display amounts carry
/// `Decimal` , the conversion must be loss-less in both directions
pub fn to_minor_units(value: Decimal) -> Result<u64, AmountModelError> {
    let scaled = value
        .checked_mul(Decimal::from(MINOR_UNIT_FACTOR))
        .ok_or_else(|| AmountModelError::Overflow(value.to_string()))?;
    if !scaled.fract().is_zero() {
        return Err(AmountModelError::PrecisionExceeded(value));
    }
    scaled
        .to_u64()
        .ok_or_else(|| AmountModelError::Overflow(value.to_string()))
}

pub fn from_minor_units(value: u64) -> Decimal {
    Decimal::new(value as i64, AMOUNT_SCALE)
}
