//! Currency amounts for display and gateway minor units
//!
//! Stored amounts are never rounded here; rounding applies only to the
//! rendered string and to the integer handed to the card gateway.

use rust_decimal::prelude::*;

/// ISO 4217 currencies without a minor unit
const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// ISO 4217 currencies with three minor digits
const THREE_DECIMAL: &[&str] = &["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// Number of minor-unit digits for a currency (2 unless listed otherwise)
pub fn minor_unit_exponent(currency: &str) -> u32 {
    let upper = currency.to_ascii_uppercase();
    if ZERO_DECIMAL.contains(&upper.as_str()) {
        0
    } else if THREE_DECIMAL.contains(&upper.as_str()) {
        3
    } else {
        2
    }
}

/// Round to the currency's minor unit (half away from zero)
pub fn round_to_minor(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        minor_unit_exponent(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Integer minor units, e.g. `1000 EGP -> 100000`
///
/// Returns `None` for negative amounts or values that overflow `i64`.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Option<i64> {
    if amount.is_sign_negative() {
        return None;
    }
    let exp = minor_unit_exponent(currency);
    let scaled = round_to_minor(amount, currency) * Decimal::from(10_i64.pow(exp));
    scaled.to_i64()
}

/// Inverse of [`to_minor_units`]
pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
    Decimal::new(minor, minor_unit_exponent(currency))
}

/// Human-readable amount, e.g. `EGP 1,000.00`, `JPY 1,500`
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let exp = minor_unit_exponent(currency) as usize;
    let rounded = round_to_minor(amount, currency);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.*}", exp, rounded.abs());

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{} {sign}{grouped}.{f}", currency.to_ascii_uppercase()),
        None => format!("{} {sign}{grouped}", currency.to_ascii_uppercase()),
    }
}
