use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::round_money;

#[derive(Debug, PartialEq, Eq)]
pub enum FeeModelError {
    NoTierConfigured,
    AmountOutOfRange(Decimal),
    Overflow(String),
}

/// one contiguous amount range with its pricing, `to_amount` below zero
/// denotes an unbounded upper end
#[derive(Serialize, Deserialize, Clone)]
pub struct FeeTierModel {
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub flat: Decimal,
    pub percentage: Decimal,
    pub tax_rate: Decimal,
}

impl FeeTierModel {
    fn covers(&self, amount: Decimal) -> bool {
        if amount < self.from_amount {
            return false;
        }
        self.to_amount.is_sign_negative() || amount <= self.to_amount
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeeBreakdownModel {
    pub flat: Decimal,
    pub percentage: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl FeeBreakdownModel {
    pub fn zero() -> Self {
        Self {
            flat: Decimal::ZERO,
            percentage: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

/// fees cut on the two sides of one transaction, the merchant side decides
/// the net amount, the provider side only feeds ledger expense legs
#[derive(Serialize, Deserialize, Clone)]
pub struct TxFeeModel {
    pub merchant: FeeBreakdownModel,
    pub provider: FeeBreakdownModel,
}

/// the rounding happens at EVERY intermediate step, not only at the end,
/// merchants verify these figures digit by digit
pub fn calculate_fee(
    amount: Decimal,
    tiers: &[FeeTierModel],
) -> Result<FeeBreakdownModel, FeeModelError> {
    if tiers.is_empty() {
        return Err(FeeModelError::NoTierConfigured);
    }
    let tier = tiers
        .iter()
        .find(|t| t.covers(amount))
        .ok_or(FeeModelError::AmountOutOfRange(amount))?;
    let pct_fee = amount
        .checked_mul(tier.percentage)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round_money)
        .ok_or_else(|| format!("pct, amount:{}, rate:{}", amount, tier.percentage))
        .map_err(FeeModelError::Overflow)?;
    let sub_total = tier
        .flat
        .checked_add(pct_fee)
        .map(round_money)
        .ok_or_else(|| format!("subtotal, flat:{}, pct:{}", tier.flat, pct_fee))
        .map_err(FeeModelError::Overflow)?;
    let tax = sub_total
        .checked_mul(tier.tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round_money)
        .ok_or_else(|| format!("tax, subtotal:{}, rate:{}", sub_total, tier.tax_rate))
        .map_err(FeeModelError::Overflow)?;
    let total = sub_total
        .checked_add(tax)
        .map(round_money)
        .ok_or_else(|| format!("total, subtotal:{}, tax:{}", sub_total, tax))
        .map_err(FeeModelError::Overflow)?;
    Ok(FeeBreakdownModel {
        flat: tier.flat,
        percentage: pct_fee,
        tax,
        total,
    })
} // end of fn calculate_fee
