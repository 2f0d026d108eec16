use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type CategoryId = u32;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxRegime {
    FlatRate,
    Ordinary,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvanceMethod {
    Historical,
    Forecast,
}

/// Fiscal settings for one year. Rates are fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSettings {
    pub year: i32,
    pub regime: TaxRegime,
    pub coefficient: Decimal,
    pub contribution_rate: Decimal,
    pub substitute_tax_rate: Decimal,
    pub advance_method: AdvanceMethod,
    pub min_threshold: Decimal,
    pub single_payment_threshold: Decimal,
    #[serde(default)]
    pub prior_year_advances_paid: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub gross_income: Decimal,
    pub coefficient: Decimal,
    pub taxable_income: Decimal,
    pub contribution_rate: Decimal,
    pub contribution: Decimal,
    pub substitute_tax_rate: Decimal,
    pub substitute_tax: Decimal,
    pub total: Decimal,
    pub net_income: Decimal,
    pub effective_rate: Decimal,
    pub monthly_provision: Decimal,
    pub exempt: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadlineKind {
    Balance,
    FirstAdvance,
    SecondAdvance,
}

/// Whether a deadline's amount and due date are owned by the calculator or by the user.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadlineOrigin {
    Calculated,
    Overridden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxDeadline {
    pub year: i32,
    pub kind: DeadlineKind,
    pub name: String,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default)]
    pub installments_paid: u32,
    pub origin: DeadlineOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCoverage {
    pub accrued: Decimal,
    pub total_owed: Decimal,
    pub coverage_percentage: Decimal,
    pub shortfall: Decimal,
    pub surplus: Decimal,
    pub next_deadline: Option<TaxDeadline>,
    pub monthly_reserve_needed: Decimal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PillarNumber {
    Liquidity,
    Emergency,
    Planned,
    Investments,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pillar {
    pub number: PillarNumber,
    pub name: String,
    pub current_balance: Decimal,
    /// `None` means the pillar absorbs any amount.
    pub target_balance: Option<Decimal>,
    #[serde(default)]
    pub horizon_months: Option<u32>,
    #[serde(default)]
    pub instrument: String,
    #[serde(default)]
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarStatus {
    pub number: PillarNumber,
    pub name: String,
    pub current_balance: Decimal,
    pub target_balance: Option<Decimal>,
    pub completion_percentage: Decimal,
    pub shortfall: Decimal,
    pub surplus: Decimal,
    pub is_funded: bool,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarSummary {
    pub pillars: Vec<PillarStatus>,
    pub total_balance: Decimal,
    pub total_target: Decimal,
    pub overall_completion: Decimal,
    pub all_funded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningProfile {
    pub liquidity_months: u32,
    pub emergency_months: u32,
    #[serde(default)]
    pub investment_target: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSuggestion {
    pub pillar: PillarNumber,
    pub pillar_name: String,
    pub amount: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub from: PillarNumber,
    pub to: PillarNumber,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPlan {
    pub gross_income: Decimal,
    pub tax_provision: Decimal,
    pub emergency_contribution: Decimal,
    pub investment_contribution: Decimal,
    pub available_for_liquidity: Decimal,
    pub fixed_costs: Decimal,
    pub variable_budget: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExpense {
    pub id: u32,
    pub name: String,
    pub target_amount: Decimal,
    #[serde(default)]
    pub current_amount: Decimal,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub monthly_contribution: Decimal,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineKind {
    Income,
    Fixed,
    Variable,
}

/// Where a forecast line's expected amount came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineSource {
    Scheduled,
    TaxDeadline,
    PlannedExpense,
    TrailingAverage,
    /// Fewer than three months of history; the category budget is used.
    Budget,
    Uncategorized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub kind: LineKind,
    #[serde(default)]
    pub monthly_budget: Decimal,
    #[serde(default)]
    pub pillar: Option<PillarNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Recurrence {
    Monthly {
        #[serde(default)]
        day: Option<u32>,
    },
    Months {
        months: Vec<u32>,
        #[serde(default)]
        day: Option<u32>,
    },
    Once {
        date: NaiveDate,
    },
}

/// A recurring or one-off income or cost entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledLine {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub description: String,
    pub amount: Decimal,
    pub recurrence: Recurrence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyActual {
    pub year: i32,
    pub month: u32,
    pub category_id: CategoryId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedTransaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub is_income: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastInputs {
    pub year: i32,
    pub as_of: NaiveDate,
    pub seed_balance: Decimal,
    #[serde(default)]
    pub income_sources: Vec<ScheduledLine>,
    #[serde(default)]
    pub recurring_costs: Vec<ScheduledLine>,
    #[serde(default)]
    pub variable_categories: Vec<Category>,
    #[serde(default)]
    pub tax_deadlines: Vec<TaxDeadline>,
    #[serde(default)]
    pub planned_expenses: Vec<PlannedExpense>,
    #[serde(default)]
    pub history: Vec<MonthlyActual>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastLine {
    pub category_id: Option<CategoryId>,
    pub kind: LineKind,
    pub source: LineSource,
    pub description: String,
    pub expected_amount: Decimal,
    pub actual_amount: Decimal,
    pub is_recurring: bool,
    pub recurrence_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastMonth {
    pub year: i32,
    pub month: u32,
    pub opening_balance: Decimal,
    pub expected_income: Decimal,
    pub actual_income: Decimal,
    pub expected_fixed_costs: Decimal,
    pub actual_fixed_costs: Decimal,
    pub expected_variable_costs: Decimal,
    pub actual_variable_costs: Decimal,
    pub expected_closing_balance: Decimal,
    pub actual_closing_balance: Decimal,
    pub variance: Decimal,
    pub lines: Vec<ForecastLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearForecast {
    pub year: i32,
    pub version: u64,
    pub seed_balance: Decimal,
    pub months: Vec<ForecastMonth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePoint {
    pub year: i32,
    pub month: u32,
    pub opening: Decimal,
    pub income: Decimal,
    pub costs: Decimal,
    pub closing: Decimal,
}
