use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{PlannerError, Result};
use super::money::{
    MAX_AMOUNT, add_months, check_amount, is_fraction, percentage_of, round_money,
};
use super::tax::calculate_annual_taxes;
use super::types::{
    AllocationSuggestion, BudgetPlan, Pillar, PillarNumber, PillarStatus, PillarSummary,
    PlannedExpense, PlanningProfile, TaxDeadline, TaxSettings, TransferRecord,
};

pub const EMERGENCY_MONTHS_RANGE: std::ops::RangeInclusive<u32> = 3..=12;
/// Share of gross income set aside for the emergency fund while it is under target.
pub const EMERGENCY_TOP_UP_RATE: Decimal = dec!(0.05);
pub const DEFAULT_INVESTMENT_RATE: Decimal = dec!(0.10);

impl PillarNumber {
    pub const ALL: [PillarNumber; 4] = [
        PillarNumber::Liquidity,
        PillarNumber::Emergency,
        PillarNumber::Planned,
        PillarNumber::Investments,
    ];

    pub fn priority(self) -> u8 {
        match self {
            PillarNumber::Liquidity => 1,
            PillarNumber::Emergency => 2,
            PillarNumber::Planned => 3,
            PillarNumber::Investments => 4,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            PillarNumber::Liquidity => "Liquidity",
            PillarNumber::Emergency => "Emergency fund",
            PillarNumber::Planned => "Planned expenses",
            PillarNumber::Investments => "Investments",
        }
    }
}

impl TryFrom<u8> for PillarNumber {
    type Error = PlannerError;

    fn try_from(value: u8) -> Result<Self> {
        PillarNumber::ALL
            .into_iter()
            .find(|n| n.priority() == value)
            .ok_or_else(|| PlannerError::NotFound(format!("pillar {value} does not exist")))
    }
}

impl From<PillarNumber> for u8 {
    fn from(number: PillarNumber) -> u8 {
        number.priority()
    }
}

impl Pillar {
    pub fn new(
        number: PillarNumber,
        current_balance: Decimal,
        target_balance: Option<Decimal>,
    ) -> Self {
        Self {
            number,
            name: number.default_name().to_string(),
            current_balance,
            target_balance,
            horizon_months: None,
            instrument: String::new(),
            account_name: String::new(),
        }
    }

    /// Unbounded pillars count as funded.
    pub fn is_funded(&self) -> bool {
        self.target_balance
            .map_or(true, |target| self.current_balance >= target)
    }

    pub fn shortfall(&self) -> Decimal {
        self.target_balance
            .map_or(Decimal::ZERO, |target| (target - self.current_balance).max(Decimal::ZERO))
    }

    pub fn surplus(&self) -> Decimal {
        self.target_balance
            .map_or(Decimal::ZERO, |target| (self.current_balance - target).max(Decimal::ZERO))
    }

    pub fn completion_percentage(&self) -> Decimal {
        match self.target_balance {
            Some(target) => percentage_of(self.current_balance, target).min(Decimal::ONE_HUNDRED),
            None => Decimal::ONE_HUNDRED,
        }
    }

    pub fn status(&self) -> PillarStatus {
        PillarStatus {
            number: self.number,
            name: self.name.clone(),
            current_balance: self.current_balance,
            target_balance: self.target_balance,
            completion_percentage: self.completion_percentage(),
            shortfall: self.shortfall(),
            surplus: self.surplus(),
            is_funded: self.is_funded(),
            priority: self.number.priority(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarTargets {
    pub liquidity: Decimal,
    pub emergency: Decimal,
    pub planned: Decimal,
    /// `None` leaves the investment pillar unbounded.
    pub investments: Option<Decimal>,
}

impl PillarTargets {
    pub fn target_for(&self, number: PillarNumber) -> Option<Decimal> {
        match number {
            PillarNumber::Liquidity => Some(self.liquidity),
            PillarNumber::Emergency => Some(self.emergency),
            PillarNumber::Planned => Some(self.planned),
            PillarNumber::Investments => self.investments,
        }
    }
}

/// Target balance per pillar from the profile, the average monthly spend and
/// the obligations coming due in the twelve months after `as_of`.
pub fn compute_targets(
    profile: &PlanningProfile,
    avg_monthly_expense: Decimal,
    deadlines: &[TaxDeadline],
    planned_expenses: &[PlannedExpense],
    as_of: NaiveDate,
) -> Result<PillarTargets> {
    if profile.liquidity_months == 0 {
        return Err(PlannerError::InvalidConfiguration(
            "liquidity months must be at least 1".to_string(),
        ));
    }
    if !EMERGENCY_MONTHS_RANGE.contains(&profile.emergency_months) {
        return Err(PlannerError::InvalidConfiguration(format!(
            "emergency months must be between 3 and 12, got {}",
            profile.emergency_months
        )));
    }
    check_amount("average monthly expense", avg_monthly_expense)?;
    if avg_monthly_expense < Decimal::ZERO {
        return Err(PlannerError::InvalidAmount(format!(
            "average monthly expense must be >= 0, got {avg_monthly_expense}"
        )));
    }
    if let Some(target) = profile.investment_target {
        check_amount("investment target", target)?;
        if target < Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "investment target must be >= 0, got {target}"
            )));
        }
    }

    let horizon = add_months(as_of, 12);
    let deadline_total: Decimal = deadlines
        .iter()
        .filter(|d| d.due_date >= as_of && d.due_date < horizon)
        .map(|d| d.remaining())
        .sum();
    let planned_total: Decimal = planned_expenses
        .iter()
        .filter(|e| !e.is_completed)
        .map(|e| e.remaining())
        .sum();

    Ok(PillarTargets {
        liquidity: round_money(avg_monthly_expense * Decimal::from(profile.liquidity_months)),
        emergency: round_money(avg_monthly_expense * Decimal::from(profile.emergency_months)),
        planned: round_money(deadline_total + planned_total),
        investments: profile.investment_target,
    })
}

pub fn apply_targets(pillars: &mut [Pillar], targets: &PillarTargets) {
    for pillar in pillars.iter_mut() {
        pillar.target_balance = targets.target_for(pillar.number);
    }
}

/// Balances are non-negative and only the investment pillar may be unbounded.
pub fn validate_pillars(pillars: &[Pillar]) -> Result<()> {
    for pillar in pillars {
        check_amount(&pillar.name, pillar.current_balance)?;
        if let Some(target) = pillar.target_balance {
            check_amount(&pillar.name, target)?;
        }
        if pillar.current_balance < Decimal::ZERO {
            return Err(PlannerError::InvalidConfiguration(format!(
                "balance of {} must be >= 0, got {}",
                pillar.name, pillar.current_balance
            )));
        }
        match pillar.target_balance {
            None if pillar.number != PillarNumber::Investments => {
                return Err(PlannerError::InvalidConfiguration(format!(
                    "{} needs a target balance",
                    pillar.name
                )));
            }
            Some(target) if target < Decimal::ZERO => {
                return Err(PlannerError::InvalidConfiguration(format!(
                    "target of {} must be >= 0, got {target}",
                    pillar.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Greedy waterfall in priority order: each bounded pillar takes up to its
/// shortfall, the unbounded investment pillar takes everything left. Whatever
/// is still left once every target is met goes to the last pillar, so the
/// suggestions always add up to `surplus`.
pub fn suggest_allocation(
    surplus: Decimal,
    pillars: &[Pillar],
) -> Result<Vec<AllocationSuggestion>> {
    if surplus < Decimal::ZERO {
        return Err(PlannerError::InvalidAmount(format!(
            "surplus must be >= 0, got {surplus}"
        )));
    }
    check_amount("surplus", surplus)?;
    validate_pillars(pillars)?;
    let mut ordered: Vec<&Pillar> = pillars.iter().collect();
    ordered.sort_by_key(|p| p.number);

    let mut suggestions: Vec<AllocationSuggestion> = Vec::new();
    let mut remaining = surplus;
    for pillar in &ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let (amount, reason) = match pillar.target_balance {
            Some(_) => (
                remaining.min(pillar.shortfall()),
                format!(
                    "{} below target ({}% funded)",
                    pillar.name,
                    pillar.completion_percentage().round()
                ),
            ),
            None => (remaining, format!("{} takes the remaining surplus", pillar.name)),
        };
        if amount > Decimal::ZERO {
            suggestions.push(suggestion(pillar, amount, reason));
            remaining -= amount;
        }
    }

    if remaining > Decimal::ZERO {
        let Some(last) = ordered.last() else {
            return Err(PlannerError::InvalidConfiguration(
                "no pillars to allocate the surplus to".to_string(),
            ));
        };
        debug!(%remaining, pillar = %last.name, "Every target met, remainder to last pillar");
        match suggestions.iter_mut().find(|s| s.pillar == last.number) {
            Some(existing) => existing.amount += remaining,
            None => suggestions.push(suggestion(
                last,
                remaining,
                format!("All targets met, remainder to {}", last.name),
            )),
        }
    }
    Ok(suggestions)
}

fn suggestion(pillar: &Pillar, amount: Decimal, reason: String) -> AllocationSuggestion {
    AllocationSuggestion {
        pillar: pillar.number,
        pillar_name: pillar.name.clone(),
        amount,
        reason,
    }
}

pub fn pillar_summary(pillars: &[Pillar]) -> PillarSummary {
    let mut statuses: Vec<PillarStatus> = pillars.iter().map(Pillar::status).collect();
    statuses.sort_by_key(|s| s.priority);
    let total_balance: Decimal = pillars.iter().map(|p| p.current_balance).sum();
    let total_target: Decimal = pillars.iter().filter_map(|p| p.target_balance).sum();
    PillarSummary {
        overall_completion: if total_target > Decimal::ZERO {
            percentage_of(total_balance, total_target)
        } else {
            Decimal::ZERO
        },
        all_funded: statuses.iter().all(|s| s.is_funded),
        pillars: statuses,
        total_balance,
        total_target,
    }
}

/// Pillars plus the append-only log of transfers between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarLedger {
    pillars: Vec<Pillar>,
    history: Vec<TransferRecord>,
}

impl PillarLedger {
    pub fn new(mut pillars: Vec<Pillar>) -> Result<Self> {
        validate_pillars(&pillars)?;
        pillars.sort_by_key(|p| p.number);
        if pillars.windows(2).any(|w| w[0].number == w[1].number) {
            return Err(PlannerError::InvalidConfiguration(
                "each pillar may appear only once".to_string(),
            ));
        }
        Ok(Self {
            pillars,
            history: Vec::new(),
        })
    }

    pub fn pillars(&self) -> &[Pillar] {
        &self.pillars
    }

    pub fn history(&self) -> &[TransferRecord] {
        &self.history
    }

    pub fn pillar(&self, number: PillarNumber) -> Result<&Pillar> {
        self.pillars
            .iter()
            .find(|p| p.number == number)
            .ok_or_else(|| PlannerError::NotFound(format!("pillar {}", number.priority())))
    }

    fn position(&self, number: PillarNumber) -> Option<usize> {
        self.pillars.iter().position(|p| p.number == number)
    }

    /// Moves `amount` between two pillars and logs the transfer. Nothing
    /// changes when the transfer is rejected.
    pub fn record_transfer(
        &mut self,
        from: PillarNumber,
        to: PillarNumber,
        amount: Decimal,
        date: NaiveDate,
        notes: impl Into<String>,
    ) -> Result<&TransferRecord> {
        if amount <= Decimal::ZERO || amount > MAX_AMOUNT {
            return Err(PlannerError::InvalidTransfer(format!(
                "amount must be > 0 and at most {MAX_AMOUNT}, got {amount}"
            )));
        }
        if from == to {
            return Err(PlannerError::InvalidTransfer(
                "source and destination are the same pillar".to_string(),
            ));
        }
        let (Some(src), Some(dst)) = (self.position(from), self.position(to)) else {
            return Err(PlannerError::InvalidTransfer(format!(
                "unknown pillar in transfer {} -> {}",
                from.priority(),
                to.priority()
            )));
        };
        if self.pillars[src].current_balance < amount {
            return Err(PlannerError::InvalidTransfer(format!(
                "insufficient balance in {}: {} < {}",
                self.pillars[src].name, self.pillars[src].current_balance, amount
            )));
        }

        self.pillars[src].current_balance -= amount;
        self.pillars[dst].current_balance += amount;
        info!(
            from = %self.pillars[src].name,
            to = %self.pillars[dst].name,
            %amount,
            "Recorded pillar transfer"
        );
        self.history.push(TransferRecord {
            from,
            to,
            amount,
            date,
            notes: notes.into(),
        });
        Ok(&self.history[self.history.len() - 1])
    }

    /// Reconciles a pillar with its real account balance.
    pub fn update_balance(&mut self, number: PillarNumber, balance: Decimal) -> Result<&Pillar> {
        check_amount("balance", balance)?;
        if balance < Decimal::ZERO {
            return Err(PlannerError::InvalidAmount(format!(
                "balance must be >= 0, got {balance}"
            )));
        }
        let idx = self
            .position(number)
            .ok_or_else(|| PlannerError::NotFound(format!("pillar {}", number.priority())))?;
        self.pillars[idx].current_balance = balance;
        Ok(&self.pillars[idx])
    }

    pub fn apply_targets(&mut self, targets: &PillarTargets) {
        apply_targets(&mut self.pillars, targets);
    }

    pub fn summary(&self) -> PillarSummary {
        pillar_summary(&self.pillars)
    }
}

/// Splits one month of gross income: tax provision first, then the emergency
/// top-up while pillar 2 is under target, then investments; the rest is
/// day-to-day money for pillar 1.
pub fn budget_plan(
    gross_monthly_income: Decimal,
    settings: &TaxSettings,
    pillars: &[Pillar],
    fixed_costs: Decimal,
    investment_rate: Decimal,
) -> Result<BudgetPlan> {
    if gross_monthly_income < Decimal::ZERO || fixed_costs < Decimal::ZERO {
        return Err(PlannerError::InvalidAmount(
            "income and fixed costs must be >= 0".to_string(),
        ));
    }
    check_amount("gross income", gross_monthly_income)?;
    check_amount("fixed costs", fixed_costs)?;
    if !is_fraction(investment_rate) {
        return Err(PlannerError::InvalidConfiguration(format!(
            "investment rate must be between 0 and 1, got {investment_rate}"
        )));
    }

    let annual = calculate_annual_taxes(gross_monthly_income * Decimal::from(12), settings)?;
    let tax_provision = annual.monthly_provision;
    let emergency_underfunded = pillars
        .iter()
        .any(|p| p.number == PillarNumber::Emergency && !p.is_funded());
    let emergency_contribution = if emergency_underfunded {
        round_money(gross_monthly_income * EMERGENCY_TOP_UP_RATE)
    } else {
        Decimal::ZERO
    };
    let investment_contribution = round_money(gross_monthly_income * investment_rate);
    let available_for_liquidity =
        gross_monthly_income - tax_provision - emergency_contribution - investment_contribution;

    Ok(BudgetPlan {
        gross_income: gross_monthly_income,
        tax_provision,
        emergency_contribution,
        investment_contribution,
        available_for_liquidity,
        fixed_costs,
        variable_budget: available_for_liquidity - fixed_costs,
    })
}
