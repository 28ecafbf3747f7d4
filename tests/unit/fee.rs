use rust_decimal::Decimal;

use payment_gateway::model::{
    calculate_fee, parse_amount, round_money, to_minor_units, AmountModelError, FeeModelError,
    FeeTierModel, TxModelError, TxType,
};

use super::ut_default_tiers;

#[test]
fn rounding_half_up_each_step() {
    // 1499 * 1.5% = 22.485 -> 22.49 , subtotal 27.49 , tax 18% of the
    // subtotal = 4.9482 -> 4.95 , total 32.44 ; merchants verify these
    // figures digit by digit against their own invoices
    let amount = Decimal::new(1499, 0);
    let out = calculate_fee(amount, ut_default_tiers().as_slice()).unwrap();
    assert_eq!(out.flat, Decimal::new(5, 0));
    assert_eq!(out.percentage, Decimal::new(2249, 2));
    assert_eq!(out.tax, Decimal::new(495, 2));
    assert_eq!(out.total, Decimal::new(3244, 2));
}

#[test]
fn rounding_strategy_is_away_from_zero() {
    assert_eq!(round_money(Decimal::new(22485, 3)), Decimal::new(2249, 2));
    assert_eq!(round_money(Decimal::new(22484, 3)), Decimal::new(2248, 2));
}

fn ut_two_tiers() -> Vec<FeeTierModel> {
    vec![
        FeeTierModel {
            from_amount: Decimal::ZERO,
            to_amount: Decimal::new(100_000, 0),
            flat: Decimal::new(2, 0),
            percentage: Decimal::ONE,
            tax_rate: Decimal::ZERO,
        },
        FeeTierModel {
            from_amount: Decimal::new(100_001, 0),
            to_amount: Decimal::NEGATIVE_ONE,
            flat: Decimal::new(9, 0),
            percentage: Decimal::TWO,
            tax_rate: Decimal::ZERO,
        },
    ]
}

#[test]
fn tier_upper_bound_inclusive() {
    let tiers = ut_two_tiers();
    let on_bound = calculate_fee(Decimal::new(100_000, 0), tiers.as_slice()).unwrap();
    assert_eq!(on_bound.flat, Decimal::new(2, 0));
    assert_eq!(on_bound.percentage, Decimal::new(1000, 0));
    let above = calculate_fee(Decimal::new(100_001, 0), tiers.as_slice()).unwrap();
    assert_eq!(above.flat, Decimal::new(9, 0));
    assert_eq!(above.percentage, Decimal::new(200002, 2));
}

#[test]
fn tier_gap_is_configuration_error() {
    let tiers = ut_two_tiers();
    let in_gap = Decimal::new(10000050, 2); // 100000.50
    let result = calculate_fee(in_gap, tiers.as_slice());
    assert_eq!(result.unwrap_err(), FeeModelError::AmountOutOfRange(in_gap));
    let result = calculate_fee(Decimal::ONE, &[]);
    assert_eq!(result.unwrap_err(), FeeModelError::NoTierConfigured);
}

#[test]
fn net_amount_direction_asymmetry() {
    let amount = Decimal::new(100, 0);
    let fee = Decimal::new(10, 0);
    let payin_net = TxType::Payin.net_amount(amount, fee).unwrap();
    assert_eq!(payin_net, Decimal::new(90, 0));
    let payout_net = TxType::Payout.net_amount(amount, fee).unwrap();
    assert_eq!(payout_net, Decimal::new(110, 0));
}

#[test]
fn payin_net_must_stay_positive() {
    let result = TxType::Payin.net_amount(Decimal::new(10, 0), Decimal::new(10, 0));
    assert!(matches!(
        result.unwrap_err(),
        TxModelError::NetAmountUnderflow(_, _)
    ));
    let result = TxType::Payin.net_amount(Decimal::new(10, 0), Decimal::new(15, 0));
    assert!(matches!(
        result.unwrap_err(),
        TxModelError::NetAmountUnderflow(_, _)
    ));
}

#[test]
fn amount_parsing_rules() {
    assert_eq!(parse_amount(" 1499.50 ").unwrap(), Decimal::new(149950, 2));
    assert_eq!(
        parse_amount("0").unwrap_err(),
        AmountModelError::NonPositive(Decimal::ZERO)
    );
    assert!(matches!(
        parse_amount("-3").unwrap_err(),
        AmountModelError::NonPositive(_)
    ));
    assert!(matches!(
        parse_amount("1.005").unwrap_err(),
        AmountModelError::PrecisionExceeded(_)
    ));
    assert!(matches!(
        parse_amount("12,99").unwrap_err(),
        AmountModelError::Unparseable(_)
    ));
}

#[test]
fn minor_unit_conversion_lossless() {
    assert_eq!(to_minor_units(Decimal::new(149900, 2)).unwrap(), 149900u64);
    assert_eq!(to_minor_units(Decimal::new(3244, 2)).unwrap(), 3244u64);
    assert!(matches!(
        to_minor_units(Decimal::new(1005, 3)).unwrap_err(),
        AmountModelError::PrecisionExceeded(_)
    ));
}
