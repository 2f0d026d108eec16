//! Rounding and calendar helpers shared by the calculators.
//!
//! Every reported money figure goes through [`round_money`]: two decimals,
//! midpoints rounded away from zero.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::{PlannerError, Result};

/// Largest magnitude accepted for a single input amount. Sums of bounded
/// amounts stay far inside `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn check_amount(label: &str, amount: Decimal) -> Result<()> {
    if amount.abs() > MAX_AMOUNT {
        return Err(PlannerError::InvalidAmount(format!(
            "{label} must be within +/-{MAX_AMOUNT}, got {amount}"
        )));
    }
    Ok(())
}

pub fn is_fraction(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

/// `part / whole` as a percentage, or 100 when there is nothing to cover.
pub fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ONE_HUNDRED;
    }
    round_money(part / whole * Decimal::ONE_HUNDRED)
}

/// Calendar months from `from` to `to`, ignoring the day of month.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

pub fn month_ordinal(year: i32, month: u32) -> i32 {
    year * 12 + month as i32 - 1
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(chrono::Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

pub fn month_name(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_NAMES[month as usize - 1],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn amounts_beyond_the_cap_are_rejected() {
        assert!(check_amount("seed balance", MAX_AMOUNT).is_ok());
        assert!(check_amount("seed balance", -MAX_AMOUNT).is_ok());
        let err = check_amount("seed balance", Decimal::MAX).expect_err("too large");
        assert!(matches!(err, PlannerError::InvalidAmount(_)));
        assert!(check_amount("seed balance", MAX_AMOUNT + dec!(0.01)).is_err());
    }

    #[test]
    fn round_money_rounds_midpoints_away_from_zero() {
        assert_eq!(round_money(dec!(166.665)), dec!(166.67));
        assert_eq!(round_money(dec!(-0.005)), dec!(-0.01));
        assert_eq!(round_money(dec!(8540.532)), dec!(8540.53));
    }

    #[test]
    fn months_between_ignores_days_and_crosses_years() {
        assert_eq!(months_between(date(2026, 1, 31), date(2026, 4, 1)), 3);
        assert_eq!(months_between(date(2025, 11, 15), date(2026, 2, 15)), 3);
        assert_eq!(months_between(date(2026, 5, 1), date(2026, 3, 1)), -2);
    }

    #[test]
    fn next_month_wraps_december() {
        assert_eq!(next_month(2026, 12), (2027, 1));
        assert_eq!(next_month(2026, 3), (2026, 4));
    }

    #[test]
    fn percentage_of_handles_empty_whole() {
        assert_eq!(percentage_of(dec!(10), Decimal::ZERO), Decimal::ONE_HUNDRED);
        assert_eq!(percentage_of(dec!(1125), dec!(2500)), dec!(45.00));
    }

    #[test]
    fn month_name_rejects_out_of_range() {
        assert_eq!(month_name(1), "January");
        assert_eq!(month_name(12), "December");
        assert_eq!(month_name(0), "");
        assert_eq!(month_name(13), "");
    }
}
