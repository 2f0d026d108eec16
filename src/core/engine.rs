use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::error::{PlannerError, Result};
use super::money::{check_amount, month_ordinal, next_month, round_money};
use super::scheduler::contribution_for_month;
use super::types::{
    BalancePoint, CategorizedTransaction, Category, CategoryId, ForecastInputs, ForecastLine,
    ForecastMonth, LineKind, LineSource, MonthlyActual, Recurrence, ScheduledLine, YearForecast,
};

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Longest balance projection, in months, past the end of a forecast.
pub const MAX_PROJECTION_MONTHS: u32 = 120;

const TRAILING_MONTHS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
struct MonthTotals {
    income: Decimal,
    fixed: Decimal,
    variable: Decimal,
}

impl MonthTotals {
    fn add(&mut self, kind: LineKind, amount: Decimal) {
        match kind {
            LineKind::Income => self.income += amount,
            LineKind::Fixed => self.fixed += amount,
            LineKind::Variable => self.variable += amount,
        }
    }

    fn net(self) -> Decimal {
        self.income - self.fixed - self.variable
    }
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    recurring: bool,
    day: Option<u32>,
}

/// Builds January..December for `inputs.year`, chaining each month's opening
/// balance to the previous expected closing balance.
pub fn generate_yearly_forecast(inputs: &ForecastInputs) -> Result<YearForecast> {
    validate_inputs(inputs)?;

    let mut months = Vec::with_capacity(12);
    let mut opening = inputs.seed_balance;
    for month in 1..=12 {
        let forecast_month = build_month(inputs, month, opening);
        opening = forecast_month.expected_closing_balance;
        months.push(forecast_month);
    }

    info!(
        year = inputs.year,
        closing = %opening,
        "Generated yearly forecast"
    );

    Ok(YearForecast {
        year: inputs.year,
        version: 0,
        seed_balance: inputs.seed_balance,
        months,
    })
}

fn validate_inputs(inputs: &ForecastInputs) -> Result<()> {
    check_amount("seed balance", inputs.seed_balance)?;
    for line in inputs.income_sources.iter().chain(&inputs.recurring_costs) {
        check_amount(&line.description, line.amount)?;
        if line.amount < Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "scheduled amount for '{}' must be >= 0",
                line.description
            )));
        }
        match &line.recurrence {
            Recurrence::Monthly { day } => validate_day(*day, &line.description)?,
            Recurrence::Months { months, day } => {
                validate_day(*day, &line.description)?;
                if months.iter().any(|m| !(1..=12).contains(m)) {
                    return Err(PlannerError::InvalidConfiguration(format!(
                        "months for '{}' must be between 1 and 12",
                        line.description
                    )));
                }
            }
            Recurrence::Once { .. } => {}
        }
    }
    for category in &inputs.variable_categories {
        check_amount(&category.name, category.monthly_budget)?;
        if category.monthly_budget < Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "budget for category '{}' must be >= 0",
                category.name
            )));
        }
    }
    for deadline in &inputs.tax_deadlines {
        check_amount(&deadline.name, deadline.amount_due)?;
        check_amount(&deadline.name, deadline.amount_paid)?;
    }
    for expense in &inputs.planned_expenses {
        check_amount(&expense.name, expense.target_amount)?;
        check_amount(&expense.name, expense.current_amount)?;
    }
    for actual in &inputs.history {
        check_amount("history amount", actual.amount)?;
    }
    Ok(())
}

fn validate_day(day: Option<u32>, description: &str) -> Result<()> {
    match day {
        Some(d) if !(1..=31).contains(&d) => Err(PlannerError::InvalidConfiguration(format!(
            "day of month for '{description}' must be between 1 and 31"
        ))),
        _ => Ok(()),
    }
}

fn build_month(inputs: &ForecastInputs, month: u32, opening: Decimal) -> ForecastMonth {
    let year = inputs.year;
    let mut lines = Vec::new();

    for source in &inputs.income_sources {
        if let Some(occurrence) = occurrence(&source.recurrence, year, month) {
            lines.push(scheduled_line(source, LineKind::Income, occurrence));
        }
    }

    for cost in &inputs.recurring_costs {
        if let Some(occurrence) = occurrence(&cost.recurrence, year, month) {
            lines.push(scheduled_line(cost, LineKind::Fixed, occurrence));
        }
    }

    for deadline in &inputs.tax_deadlines {
        if deadline.due_date.year() == year && deadline.due_date.month() == month {
            lines.push(ForecastLine {
                category_id: None,
                kind: LineKind::Fixed,
                source: LineSource::TaxDeadline,
                description: deadline.name.clone(),
                expected_amount: deadline.amount_due,
                actual_amount: Decimal::ZERO,
                is_recurring: false,
                recurrence_day: Some(deadline.due_date.day()),
            });
        }
    }

    for expense in &inputs.planned_expenses {
        let contribution = contribution_for_month(expense, inputs.as_of, year, month);
        if contribution > Decimal::ZERO {
            lines.push(ForecastLine {
                category_id: None,
                kind: LineKind::Fixed,
                source: LineSource::PlannedExpense,
                description: expense.name.clone(),
                expected_amount: contribution,
                actual_amount: Decimal::ZERO,
                is_recurring: false,
                recurrence_day: None,
            });
        }
    }

    for category in &inputs.variable_categories {
        let (expected_amount, source) =
            expected_variable_cost(category, &inputs.history, year, month);
        lines.push(ForecastLine {
            category_id: Some(category.id),
            kind: LineKind::Variable,
            source,
            description: category.name.clone(),
            expected_amount,
            actual_amount: Decimal::ZERO,
            is_recurring: true,
            recurrence_day: None,
        });
    }

    let mut forecast_month = ForecastMonth {
        year,
        month,
        opening_balance: opening,
        expected_income: Decimal::ZERO,
        actual_income: Decimal::ZERO,
        expected_fixed_costs: Decimal::ZERO,
        actual_fixed_costs: Decimal::ZERO,
        expected_variable_costs: Decimal::ZERO,
        actual_variable_costs: Decimal::ZERO,
        expected_closing_balance: opening,
        actual_closing_balance: opening,
        variance: Decimal::ZERO,
        lines,
    };
    recompute_totals(&mut forecast_month);
    forecast_month
}

fn occurrence(recurrence: &Recurrence, year: i32, month: u32) -> Option<Occurrence> {
    match recurrence {
        Recurrence::Monthly { day } => Some(Occurrence {
            recurring: true,
            day: *day,
        }),
        Recurrence::Months { months, day } if months.contains(&month) => Some(Occurrence {
            recurring: true,
            day: *day,
        }),
        Recurrence::Months { .. } => None,
        Recurrence::Once { date } if date.year() == year && date.month() == month => {
            Some(Occurrence {
                recurring: false,
                day: Some(date.day()),
            })
        }
        Recurrence::Once { .. } => None,
    }
}

fn scheduled_line(line: &ScheduledLine, kind: LineKind, occurrence: Occurrence) -> ForecastLine {
    ForecastLine {
        category_id: line.category_id,
        kind,
        source: LineSource::Scheduled,
        description: line.description.clone(),
        expected_amount: line.amount,
        actual_amount: Decimal::ZERO,
        is_recurring: occurrence.recurring,
        recurrence_day: occurrence.day,
    }
}

/// Trailing average of the latest three recorded months before (`year`, `month`),
/// or the category budget when less history exists. Months with no record are
/// skipped, not counted as zero, so the three months need not be consecutive.
fn expected_variable_cost(
    category: &Category,
    history: &[MonthlyActual],
    year: i32,
    month: u32,
) -> (Decimal, LineSource) {
    match trailing_average(history, category.id, year, month) {
        Some(average) => (average, LineSource::TrailingAverage),
        None => {
            debug!(
                category = %category.name,
                year,
                month,
                "Not enough history, using category budget"
            );
            (category.monthly_budget, LineSource::Budget)
        }
    }
}

/// Months without a record are skipped, not averaged in as zero.
fn trailing_average(
    history: &[MonthlyActual],
    category_id: CategoryId,
    year: i32,
    month: u32,
) -> Option<Decimal> {
    let target = month_ordinal(year, month);
    let mut by_month: BTreeMap<i32, Decimal> = BTreeMap::new();
    for actual in history.iter().filter(|a| a.category_id == category_id) {
        let ordinal = month_ordinal(actual.year, actual.month);
        if ordinal < target {
            *by_month.entry(ordinal).or_default() += actual.amount.abs();
        }
    }
    if by_month.len() < TRAILING_MONTHS {
        return None;
    }
    let recent: Decimal = by_month.values().rev().take(TRAILING_MONTHS).sum();
    Some(round_money(recent / Decimal::from(TRAILING_MONTHS)))
}

fn recompute_totals(month: &mut ForecastMonth) {
    let mut expected = MonthTotals::default();
    let mut actual = MonthTotals::default();
    for line in &month.lines {
        expected.add(line.kind, line.expected_amount);
        actual.add(line.kind, line.actual_amount);
    }

    month.expected_income = expected.income;
    month.expected_fixed_costs = expected.fixed;
    month.expected_variable_costs = expected.variable;
    month.actual_income = actual.income;
    month.actual_fixed_costs = actual.fixed;
    month.actual_variable_costs = actual.variable;
    month.expected_closing_balance = month.opening_balance + expected.net();
    month.actual_closing_balance = month.opening_balance + actual.net();
    month.variance = month.expected_closing_balance - month.actual_closing_balance;
}

fn same_line(a: &ForecastLine, b: &ForecastLine) -> bool {
    a.kind == b.kind && a.category_id == b.category_id && a.description == b.description
}

/// Copies actual amounts from a previous run into a freshly generated forecast.
/// Previous lines with actuals and no fresh counterpart are kept with a zero expectation.
pub fn carry_actuals(fresh: &mut YearForecast, previous: &YearForecast) {
    for month in &mut fresh.months {
        let Some(old) = previous.months.iter().find(|m| m.month == month.month) else {
            continue;
        };
        for old_line in old.lines.iter().filter(|l| l.actual_amount != Decimal::ZERO) {
            match month.lines.iter_mut().find(|l| same_line(l, old_line)) {
                Some(line) => line.actual_amount = old_line.actual_amount,
                None => month.lines.push(ForecastLine {
                    expected_amount: Decimal::ZERO,
                    ..old_line.clone()
                }),
            }
        }
        recompute_totals(month);
    }
}

/// Folds one month's categorized transactions into its lines' actual amounts.
///
/// Returns an updated copy; `month` is untouched when this fails.
pub fn update_actuals(
    month: &ForecastMonth,
    transactions: &[CategorizedTransaction],
) -> Result<ForecastMonth> {
    let mut totals: BTreeMap<(bool, CategoryId), Decimal> = BTreeMap::new();
    for tx in transactions {
        let Some(category_id) = tx.category_id else {
            return Err(PlannerError::UnknownCategory(format!(
                "transaction on {} '{}' has no category",
                tx.date, tx.description
            )));
        };
        check_amount(&tx.description, tx.amount)?;
        if tx.date.year() != month.year || tx.date.month() != month.month {
            debug!(date = %tx.date, "Skipping transaction outside forecast month");
            continue;
        }
        *totals.entry((tx.is_income, category_id)).or_default() += tx.amount.abs();
    }

    let mut updated = month.clone();
    updated
        .lines
        .retain(|line| line.source != LineSource::Uncategorized);
    for line in updated.lines.iter_mut() {
        if line.category_id.is_some() {
            line.actual_amount = Decimal::ZERO;
        }
    }

    let mut unmatched = MonthTotals::default();
    for ((is_income, category_id), amount) in totals {
        let matching = updated.lines.iter_mut().find(|line| {
            line.category_id == Some(category_id) && (line.kind == LineKind::Income) == is_income
        });
        match matching {
            Some(line) => line.actual_amount = amount,
            None => {
                debug!(category_id, is_income, "No forecast line for category");
                let kind = if is_income {
                    LineKind::Income
                } else {
                    LineKind::Variable
                };
                unmatched.add(kind, amount);
            }
        }
    }

    for (kind, amount) in [
        (LineKind::Income, unmatched.income),
        (LineKind::Variable, unmatched.variable),
    ] {
        if amount > Decimal::ZERO {
            updated.lines.push(ForecastLine {
                category_id: None,
                kind,
                source: LineSource::Uncategorized,
                description: UNCATEGORIZED.to_string(),
                expected_amount: Decimal::ZERO,
                actual_amount: amount,
                is_recurring: false,
                recurrence_day: None,
            });
        }
    }

    recompute_totals(&mut updated);
    Ok(updated)
}

/// Rolls expected balances forward past the last generated month without
/// touching `forecast`. Each projected month reuses the recurring lines of the
/// same calendar month and the latest variable-cost estimate.
pub fn project_balance(
    forecast: &YearForecast,
    months_ahead: u32,
    seed_balance: Decimal,
) -> Result<Vec<BalancePoint>> {
    if months_ahead > MAX_PROJECTION_MONTHS {
        return Err(PlannerError::InvalidAmount(format!(
            "projection is limited to {MAX_PROJECTION_MONTHS} months, got {months_ahead}"
        )));
    }
    check_amount("seed balance", seed_balance)?;
    let Some(last) = forecast.months.last() else {
        return Ok(Vec::new());
    };
    let variable = last.expected_variable_costs;

    let mut points = Vec::with_capacity(months_ahead as usize);
    let (mut year, mut month) = next_month(last.year, last.month);
    let mut opening = seed_balance;
    for _ in 0..months_ahead {
        let mut recurring = MonthTotals::default();
        if let Some(template) = forecast.months.iter().find(|m| m.month == month) {
            for line in template
                .lines
                .iter()
                .filter(|l| l.is_recurring && l.source == LineSource::Scheduled)
            {
                recurring.add(line.kind, line.expected_amount);
            }
        }
        let costs = recurring.fixed + variable;
        let closing = opening + recurring.income - costs;
        points.push(BalancePoint {
            year,
            month,
            opening,
            income: recurring.income,
            costs,
            closing,
        });
        opening = closing;
        (year, month) = next_month(year, month);
    }
    Ok(points)
}
