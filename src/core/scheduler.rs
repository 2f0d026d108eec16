use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use super::error::{PlannerError, Result};
use super::money::{month_ordinal, months_between, next_month, percentage_of, round_money};
use super::types::PlannedExpense;

impl PlannedExpense {
    pub fn remaining(&self) -> Decimal {
        (self.target_amount - self.current_amount).max(Decimal::ZERO)
    }

    pub fn completion_percentage(&self) -> Decimal {
        percentage_of(self.current_amount, self.target_amount).min(Decimal::ONE_HUNDRED)
    }

    /// Recomputes the derived contribution and completion flag. Completed
    /// expenses are left as they are.
    pub fn refresh(&mut self, as_of: NaiveDate) {
        if self.is_completed {
            return;
        }
        if self.current_amount >= self.target_amount {
            debug!(expense = %self.name, "Planned expense reached its target");
            self.is_completed = true;
            self.monthly_contribution = Decimal::ZERO;
            return;
        }
        self.monthly_contribution = monthly_contribution(self, as_of);
    }

    pub fn contribute(&mut self, amount: Decimal, as_of: NaiveDate) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "contribution must be > 0, got {amount}"
            )));
        }
        self.current_amount += amount;
        self.refresh(as_of);
        Ok(())
    }
}

/// Months left until the target date, never less than one.
pub fn months_until(as_of: NaiveDate, target_date: NaiveDate) -> u32 {
    months_between(as_of, target_date).max(1) as u32
}

/// `max(0, target - current) / max(1, months until target)`, rounded to cents.
pub fn monthly_contribution(expense: &PlannedExpense, as_of: NaiveDate) -> Decimal {
    if expense.is_completed || expense.current_amount >= expense.target_amount {
        return Decimal::ZERO;
    }
    round_money(expense.remaining() / Decimal::from(months_until(as_of, expense.target_date)))
}

/// The contribution booked in (`year`, `month`), or zero outside the saving window
/// `[as_of month, as_of month + months_until)`.
pub fn contribution_for_month(
    expense: &PlannedExpense,
    as_of: NaiveDate,
    year: i32,
    month: u32,
) -> Decimal {
    let start = month_ordinal(as_of.year(), as_of.month());
    let end = start + months_until(as_of, expense.target_date) as i32;
    let current = month_ordinal(year, month);
    if current < start || current >= end {
        return Decimal::ZERO;
    }
    monthly_contribution(expense, as_of)
}

/// Calendar months in which contributions are booked, starting with `as_of`.
pub fn contribution_schedule(expense: &PlannedExpense, as_of: NaiveDate) -> Vec<(i32, u32)> {
    if expense.is_completed || expense.remaining() == Decimal::ZERO {
        return Vec::new();
    }
    let mut cursor = (as_of.year(), as_of.month());
    let mut months = Vec::new();
    for _ in 0..months_until(as_of, expense.target_date) {
        months.push(cursor);
        cursor = next_month(cursor.0, cursor.1);
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::add_months;
    use proptest::prelude::{prop_assert, proptest};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn dentist(current: Decimal) -> PlannedExpense {
        PlannedExpense {
            id: 1,
            name: "Dentist".to_string(),
            target_amount: dec!(500),
            current_amount: current,
            target_date: date(2026, 4, 15),
            monthly_contribution: Decimal::ZERO,
            is_completed: false,
        }
    }

    #[test]
    fn oracle_contribution_three_months_out() {
        let expense = dentist(Decimal::ZERO);
        assert_eq!(monthly_contribution(&expense, date(2026, 1, 10)), dec!(166.67));
    }

    #[test]
    fn target_in_current_or_past_month_takes_whole_remaining() {
        let expense = dentist(dec!(100));
        assert_eq!(monthly_contribution(&expense, date(2026, 4, 1)), dec!(400));
        assert_eq!(monthly_contribution(&expense, date(2026, 9, 1)), dec!(400));
    }

    #[test]
    fn refresh_marks_completion_and_stops_recomputing() {
        let mut expense = dentist(Decimal::ZERO);
        expense.refresh(date(2026, 1, 10));
        assert_eq!(expense.monthly_contribution, dec!(166.67));

        expense.contribute(dec!(500), date(2026, 2, 1)).expect("valid");
        assert!(expense.is_completed);
        assert_eq!(expense.monthly_contribution, Decimal::ZERO);
        assert_eq!(monthly_contribution(&expense, date(2026, 2, 1)), Decimal::ZERO);

        expense.target_amount = dec!(900);
        expense.refresh(date(2026, 2, 1));
        assert!(expense.is_completed);
        assert_eq!(expense.monthly_contribution, Decimal::ZERO);
    }

    #[test]
    fn contribute_rejects_non_positive_amounts() {
        let mut expense = dentist(Decimal::ZERO);
        assert!(expense.contribute(Decimal::ZERO, date(2026, 1, 1)).is_err());
        assert!(expense.contribute(dec!(-5), date(2026, 1, 1)).is_err());
    }

    #[test]
    fn schedule_books_one_contribution_per_month_until_target() {
        let expense = dentist(Decimal::ZERO);
        let as_of = date(2026, 1, 10);
        assert_eq!(
            contribution_schedule(&expense, as_of),
            vec![(2026, 1), (2026, 2), (2026, 3)]
        );
        assert_eq!(contribution_for_month(&expense, as_of, 2026, 3), dec!(166.67));
        assert_eq!(contribution_for_month(&expense, as_of, 2026, 4), Decimal::ZERO);
        assert_eq!(contribution_for_month(&expense, as_of, 2025, 12), Decimal::ZERO);
    }

    #[test]
    fn completion_percentage_is_capped() {
        assert_eq!(dentist(dec!(250)).completion_percentage(), dec!(50));
        assert_eq!(dentist(dec!(900)).completion_percentage(), dec!(100));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_scheduled_contributions_cover_the_remaining_amount(
            target_cents in 1_i64..10_000_000,
            months_out in 0_u32..36,
        ) {
            let as_of = date(2026, 1, 5);
            let mut expense = dentist(Decimal::ZERO);
            expense.target_amount = Decimal::new(target_cents, 2);
            expense.target_date = add_months(as_of, months_out);

            let per_month = monthly_contribution(&expense, as_of);
            let booked = per_month * Decimal::from(contribution_schedule(&expense, as_of).len());
            let slack = Decimal::new(contribution_schedule(&expense, as_of).len() as i64, 2);
            prop_assert!(per_month >= Decimal::ZERO);
            prop_assert!((booked - expense.target_amount).abs() <= slack);
        }
    }
}
