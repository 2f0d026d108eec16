mod engine;
mod error;
mod money;
mod pillars;
mod scheduler;
mod store;
mod tax;
mod types;

pub use engine::{
    MAX_PROJECTION_MONTHS, UNCATEGORIZED, carry_actuals, generate_yearly_forecast,
    project_balance, update_actuals,
};
pub use error::{PlannerError, Result};
pub use money::{MAX_AMOUNT, check_amount, month_name, round_money};
pub use pillars::{
    DEFAULT_INVESTMENT_RATE, EMERGENCY_MONTHS_RANGE, EMERGENCY_TOP_UP_RATE, PillarLedger,
    PillarTargets, apply_targets, budget_plan, compute_targets, pillar_summary,
    suggest_allocation, validate_pillars,
};
pub use scheduler::{
    contribution_for_month, contribution_schedule, monthly_contribution, months_until,
};
pub use store::ForecastStore;
pub use tax::{
    LATE_YEAR_DUE, MID_YEAR_DUE, TaxSettingsBook, advance_base, calculate_annual_taxes,
    generate_deadlines, monthly_reserve, reserve_per_month, tax_coverage,
};
pub use types::{
    AdvanceMethod, AllocationSuggestion, BalancePoint, BudgetPlan, CategorizedTransaction,
    Category, CategoryId, DeadlineKind, DeadlineOrigin, ForecastInputs, ForecastLine,
    ForecastMonth, LineKind, LineSource, MonthlyActual, Pillar, PillarNumber, PillarStatus,
    PillarSummary, PlannedExpense, PlanningProfile, Recurrence, ScheduledLine, TaxBreakdown,
    TaxCoverage, TaxDeadline, TaxRegime, TaxSettings, TransferRecord, YearForecast,
};
