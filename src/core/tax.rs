use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::error::{PlannerError, Result};
use super::money::{
    add_months, check_amount, is_fraction, months_between, percentage_of, round_money,
};
use super::types::{
    AdvanceMethod, DeadlineKind, DeadlineOrigin, TaxBreakdown, TaxCoverage, TaxDeadline,
    TaxRegime, TaxSettings,
};

/// Due date shared by the balance and the first advance.
pub const MID_YEAR_DUE: (u32, u32) = (7, 16);
/// Due date of the second (or single) advance.
pub const LATE_YEAR_DUE: (u32, u32) = (11, 30);

const SUBSTITUTE_TAX_ADVANCE_SHARE: Decimal = Decimal::ONE;
const CONTRIBUTION_ADVANCE_SHARE: Decimal = dec!(0.80);

impl TaxSettings {
    pub fn flat_rate(year: i32) -> Self {
        Self {
            year,
            regime: TaxRegime::FlatRate,
            coefficient: dec!(0.78),
            contribution_rate: dec!(0.2607),
            substitute_tax_rate: dec!(0.15),
            advance_method: AdvanceMethod::Historical,
            min_threshold: dec!(52.00),
            single_payment_threshold: dec!(258.00),
            prior_year_advances_paid: Decimal::ZERO,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.regime != TaxRegime::FlatRate {
            return Err(PlannerError::InvalidConfiguration(format!(
                "tax regime {:?} is not supported, only flat-rate",
                self.regime
            )));
        }
        for (name, rate) in [
            ("coefficient", self.coefficient),
            ("contribution rate", self.contribution_rate),
            ("substitute tax rate", self.substitute_tax_rate),
        ] {
            if !is_fraction(rate) {
                return Err(PlannerError::InvalidConfiguration(format!(
                    "{name} must be between 0 and 1, got {rate}"
                )));
            }
        }
        if self.min_threshold < Decimal::ZERO || self.single_payment_threshold < Decimal::ZERO {
            return Err(PlannerError::InvalidConfiguration(
                "payment thresholds must be >= 0".to_string(),
            ));
        }
        if self.prior_year_advances_paid < Decimal::ZERO {
            return Err(PlannerError::InvalidConfiguration(
                "prior year advances paid must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-year settings. A year is frozen once deadlines have been generated from it.
#[derive(Debug, Clone, Default)]
pub struct TaxSettingsBook {
    years: BTreeMap<i32, TaxSettings>,
    frozen: BTreeSet<i32>,
}

impl TaxSettingsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, year: i32) -> Option<&TaxSettings> {
        self.years.get(&year)
    }

    pub fn for_year(&self, year: i32) -> TaxSettings {
        self.years
            .get(&year)
            .cloned()
            .unwrap_or_else(|| TaxSettings::flat_rate(year))
    }

    pub fn insert(&mut self, settings: TaxSettings) -> Result<()> {
        settings.validate()?;
        if self.frozen.contains(&settings.year) {
            return Err(PlannerError::InvalidConfiguration(format!(
                "tax settings for {} are frozen: deadlines were generated from them",
                settings.year
            )));
        }
        self.years.insert(settings.year, settings);
        Ok(())
    }

    pub fn freeze(&mut self, year: i32) {
        self.frozen.insert(year);
    }

    pub fn is_frozen(&self, year: i32) -> bool {
        self.frozen.contains(&year)
    }
}

pub fn calculate_annual_taxes(income: Decimal, settings: &TaxSettings) -> Result<TaxBreakdown> {
    settings.validate()?;
    check_amount("income", income)?;
    if income < Decimal::ZERO {
        return Err(PlannerError::InvalidConfiguration(format!(
            "income must be >= 0, got {income}"
        )));
    }

    // Contribution and substitute tax share the same taxable base.
    let taxable_income = round_money(income * settings.coefficient);
    let contribution = round_money(taxable_income * settings.contribution_rate);
    let substitute_tax = round_money(taxable_income * settings.substitute_tax_rate);
    let total = contribution + substitute_tax;
    let effective_rate = if income > Decimal::ZERO {
        round_money(total / income * Decimal::ONE_HUNDRED)
    } else {
        Decimal::ZERO
    };

    Ok(TaxBreakdown {
        gross_income: income,
        coefficient: settings.coefficient,
        taxable_income,
        contribution_rate: settings.contribution_rate,
        contribution,
        substitute_tax_rate: settings.substitute_tax_rate,
        substitute_tax,
        total,
        net_income: income - total,
        effective_rate,
        monthly_provision: round_money(total / Decimal::from(12)),
        exempt: total < settings.min_threshold,
    })
}

/// Advances owed for the coming year under the historical method.
pub fn advance_base(prior: &TaxBreakdown) -> Decimal {
    round_money(
        prior.substitute_tax * SUBSTITUTE_TAX_ADVANCE_SHARE
            + prior.contribution * CONTRIBUTION_ADVANCE_SHARE,
    )
}

/// Builds the payment calendar for `year` from the prior year's liability.
///
/// Overridden rows in `existing` for the same year are returned untouched and
/// suppress the calculated row of the same kind.
pub fn generate_deadlines(
    year: i32,
    prior: &TaxBreakdown,
    settings: &TaxSettings,
    existing: &[TaxDeadline],
) -> Result<Vec<TaxDeadline>> {
    settings.validate()?;
    if settings.advance_method != AdvanceMethod::Historical {
        return Err(PlannerError::InvalidConfiguration(
            "only the historical advance method is supported".to_string(),
        ));
    }

    let calculated = if prior.exempt || prior.total < settings.min_threshold {
        debug!(year, total = %prior.total, "Prior liability below minimum, no deadlines");
        Vec::new()
    } else {
        calculated_deadlines(year, prior, settings)?
    };

    let mut deadlines: Vec<TaxDeadline> = existing
        .iter()
        .filter(|d| d.year == year && d.origin == DeadlineOrigin::Overridden)
        .cloned()
        .collect();

    for deadline in calculated {
        let frozen = deadlines
            .iter()
            .any(|d| d.kind == deadline.kind && d.origin == DeadlineOrigin::Overridden);
        if frozen {
            debug!(year, kind = ?deadline.kind, "Keeping manually overridden deadline");
            continue;
        }
        deadlines.push(deadline);
    }

    deadlines.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.kind.cmp(&b.kind)));
    Ok(deadlines)
}

fn calculated_deadlines(
    year: i32,
    prior: &TaxBreakdown,
    settings: &TaxSettings,
) -> Result<Vec<TaxDeadline>> {
    let mid_year = due_date(year, MID_YEAR_DUE)?;
    let late_year = due_date(year, LATE_YEAR_DUE)?;
    let mut deadlines = Vec::with_capacity(3);

    let balance = (prior.total - settings.prior_year_advances_paid).max(Decimal::ZERO);
    if balance > Decimal::ZERO {
        deadlines.push(calculated(
            year,
            DeadlineKind::Balance,
            format!("Balance {}", year - 1),
            mid_year,
            balance,
        ));
    }

    let advances = advance_base(prior);
    if advances < settings.min_threshold {
        debug!(year, advances = %advances, "Advances below minimum, skipped");
    } else if advances < settings.single_payment_threshold {
        deadlines.push(calculated(
            year,
            DeadlineKind::SecondAdvance,
            format!("Single advance {year}"),
            late_year,
            advances,
        ));
    } else {
        let first = round_money(advances / Decimal::TWO);
        deadlines.push(calculated(
            year,
            DeadlineKind::FirstAdvance,
            format!("First advance {year}"),
            mid_year,
            first,
        ));
        deadlines.push(calculated(
            year,
            DeadlineKind::SecondAdvance,
            format!("Second advance {year}"),
            late_year,
            advances - first,
        ));
    }

    Ok(deadlines)
}

fn calculated(
    year: i32,
    kind: DeadlineKind,
    name: String,
    due_date: NaiveDate,
    amount_due: Decimal,
) -> TaxDeadline {
    TaxDeadline {
        year,
        kind,
        name,
        due_date,
        amount_due,
        amount_paid: Decimal::ZERO,
        installments_paid: 0,
        origin: DeadlineOrigin::Calculated,
    }
}

fn due_date(year: i32, (month, day): (u32, u32)) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        PlannerError::InvalidConfiguration(format!("no calendar date for {year}-{month}-{day}"))
    })
}

impl TaxDeadline {
    pub fn remaining(&self) -> Decimal {
        (self.amount_due - self.amount_paid).max(Decimal::ZERO)
    }

    pub fn is_paid(&self) -> bool {
        self.amount_paid >= self.amount_due
    }

    pub fn is_overridden(&self) -> bool {
        self.origin == DeadlineOrigin::Overridden
    }

    /// Pins amount and/or due date; later regeneration leaves the row alone.
    pub fn override_terms(
        &mut self,
        amount_due: Option<Decimal>,
        due_date: Option<NaiveDate>,
    ) -> Result<()> {
        if let Some(amount) = amount_due {
            if amount < Decimal::ZERO {
                return Err(PlannerError::InvalidAmount(format!(
                    "deadline amount must be >= 0, got {amount}"
                )));
            }
        }
        if amount_due.is_none() && due_date.is_none() {
            return Ok(());
        }
        if let Some(amount) = amount_due {
            self.amount_due = amount;
        }
        if let Some(date) = due_date {
            self.due_date = date;
        }
        self.origin = DeadlineOrigin::Overridden;
        Ok(())
    }

    pub fn record_payment(&mut self, amount: Decimal, installment: Option<u32>) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "payment must be > 0, got {amount}"
            )));
        }
        self.amount_paid += amount;
        self.installments_paid = installment.unwrap_or(self.installments_paid + 1);
        Ok(())
    }
}

/// Spreads `total` evenly over `months_remaining`; a due-now total is returned whole.
pub fn reserve_per_month(total: Decimal, months_remaining: i32) -> Decimal {
    if months_remaining <= 0 {
        return round_money(total);
    }
    round_money(total / Decimal::from(months_remaining))
}

/// Monthly set-aside for unpaid deadlines due within twelve months of `as_of`,
/// spread up to the nearest of them.
pub fn monthly_reserve(as_of: NaiveDate, deadlines: &[TaxDeadline]) -> Decimal {
    let horizon = add_months(as_of, 12);
    let pending: Vec<&TaxDeadline> = deadlines
        .iter()
        .filter(|d| d.due_date >= as_of && d.due_date < horizon && d.remaining() > Decimal::ZERO)
        .collect();
    let Some(nearest) = pending.iter().map(|d| d.due_date).min() else {
        return Decimal::ZERO;
    };
    let total: Decimal = pending.iter().map(|d| d.remaining()).sum();
    reserve_per_month(total, months_between(as_of, nearest))
}

/// How much of the upcoming tax bill `accrued` already covers.
pub fn tax_coverage(accrued: Decimal, deadlines: &[TaxDeadline], as_of: NaiveDate) -> TaxCoverage {
    let mut upcoming: Vec<&TaxDeadline> =
        deadlines.iter().filter(|d| d.due_date >= as_of).collect();
    upcoming.sort_by_key(|d| d.due_date);

    let total_owed: Decimal = upcoming.iter().map(|d| d.remaining()).sum();
    let shortfall = (total_owed - accrued).max(Decimal::ZERO);
    let surplus = (accrued - total_owed).max(Decimal::ZERO);
    let next_deadline = upcoming
        .iter()
        .find(|d| d.remaining() > Decimal::ZERO)
        .map(|d| (*d).clone());

    let monthly_reserve_needed = match upcoming.last() {
        Some(last) if shortfall > Decimal::ZERO => {
            reserve_per_month(shortfall, months_between(as_of, last.due_date).max(1))
        }
        _ => Decimal::ZERO,
    };

    TaxCoverage {
        accrued,
        total_owed,
        coverage_percentage: percentage_of(accrued, total_owed),
        shortfall,
        surplus,
        next_deadline,
        monthly_reserve_needed,
    }
}
