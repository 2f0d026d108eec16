use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Datelike, NaiveDate};
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AllocationSuggestion, BudgetPlan, CategorizedTransaction, DEFAULT_INVESTMENT_RATE,
    ForecastInputs, ForecastStore, Pillar, PillarLedger, PillarNumber, PillarSummary,
    PillarTargets, PlannedExpense, PlannerError, PlanningProfile, TaxBreakdown, TaxDeadline,
    TaxSettings, TaxSettingsBook, TransferRecord, budget_plan, calculate_annual_taxes,
    compute_targets, contribution_for_month, contribution_schedule, generate_deadlines,
    month_name, monthly_reserve, suggest_allocation, tax_coverage,
};

const DEFAULT_PROJECTION_MONTHS: u32 = 12;

/// Planner defaults, overridable from the command line and per request.
#[derive(Args, Clone, Debug)]
pub struct PlannerDefaults {
    #[arg(
        long,
        default_value = "0.78",
        help = "Flat-rate profitability coefficient (fraction of revenue taxed)"
    )]
    pub coefficient: Decimal,
    #[arg(long, default_value = "0.2607", help = "Pension contribution rate")]
    pub contribution_rate: Decimal,
    #[arg(long, default_value = "0.15", help = "Substitute tax rate")]
    pub tax_rate: Decimal,
    #[arg(
        long,
        default_value = "52.00",
        help = "Liability below this amount owes nothing"
    )]
    pub min_threshold: Decimal,
    #[arg(
        long,
        default_value = "258.00",
        help = "Advances below this amount are paid in one late-year installment"
    )]
    pub single_payment_threshold: Decimal,
    #[arg(long, default_value_t = 3, help = "Months of spending kept liquid")]
    pub liquidity_months: u32,
    #[arg(
        long,
        default_value_t = 6,
        help = "Months of spending in the emergency fund (3-12)"
    )]
    pub emergency_months: u32,
}

impl Default for PlannerDefaults {
    fn default() -> Self {
        let settings = TaxSettings::flat_rate(0);
        Self {
            coefficient: settings.coefficient,
            contribution_rate: settings.contribution_rate,
            tax_rate: settings.substitute_tax_rate,
            min_threshold: settings.min_threshold,
            single_payment_threshold: settings.single_payment_threshold,
            liquidity_months: 3,
            emergency_months: 6,
        }
    }
}

impl PlannerDefaults {
    pub fn tax_settings(&self, year: i32) -> TaxSettings {
        TaxSettings {
            coefficient: self.coefficient,
            contribution_rate: self.contribution_rate,
            substitute_tax_rate: self.tax_rate,
            min_threshold: self.min_threshold,
            single_payment_threshold: self.single_payment_threshold,
            ..TaxSettings::flat_rate(year)
        }
    }

    pub fn profile(&self) -> PlanningProfile {
        PlanningProfile {
            liquidity_months: self.liquidity_months,
            emergency_months: self.emergency_months,
            investment_target: None,
        }
    }
}

/// Shared server state. The forecast store does its own locking.
#[derive(Debug)]
pub struct AppState {
    defaults: PlannerDefaults,
    settings: Mutex<TaxSettingsBook>,
    ledger: Mutex<PillarLedger>,
    forecasts: ForecastStore,
}

impl AppState {
    pub fn new(defaults: PlannerDefaults) -> Self {
        Self {
            defaults,
            settings: Mutex::new(TaxSettingsBook::new()),
            ledger: Mutex::new(starting_ledger()),
            forecasts: ForecastStore::new(),
        }
    }

    fn settings_for(&self, year: i32) -> TaxSettings {
        let book = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        stored_or_default(&book, &self.defaults, year)
    }
}

fn stored_or_default(book: &TaxSettingsBook, defaults: &PlannerDefaults, year: i32) -> TaxSettings {
    book.get(year)
        .cloned()
        .unwrap_or_else(|| defaults.tax_settings(year))
}

fn starting_ledger() -> PillarLedger {
    let pillars = PillarNumber::ALL
        .into_iter()
        .map(|number| {
            let target = match number {
                PillarNumber::Investments => None,
                _ => Some(Decimal::ZERO),
            };
            Pillar::new(number, Decimal::ZERO, target)
        })
        .collect();
    PillarLedger::new(pillars).unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxPayload {
    year: Option<i32>,
    income: Option<Decimal>,
    coefficient: Option<Decimal>,
    contribution_rate: Option<Decimal>,
    substitute_tax_rate: Option<Decimal>,
    min_threshold: Option<Decimal>,
    single_payment_threshold: Option<Decimal>,
    prior_year_advances_paid: Option<Decimal>,
    as_of: Option<NaiveDate>,
    existing_deadlines: Vec<TaxDeadline>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxResponse {
    settings: TaxSettings,
    breakdown: TaxBreakdown,
    deadline_year: i32,
    deadlines: Vec<TaxDeadline>,
    monthly_reserve: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoveragePayload {
    accrued: Decimal,
    #[serde(default)]
    deadlines: Vec<TaxDeadline>,
    as_of: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionQuery {
    months_ahead: Option<u32>,
    seed_balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsPayload {
    avg_monthly_expense: Decimal,
    as_of: NaiveDate,
    #[serde(default)]
    liquidity_months: Option<u32>,
    #[serde(default)]
    emergency_months: Option<u32>,
    #[serde(default)]
    investment_target: Option<Decimal>,
    #[serde(default)]
    deadlines: Vec<TaxDeadline>,
    #[serde(default)]
    planned_expenses: Vec<PlannedExpense>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetsResponse {
    targets: PillarTargets,
    summary: PillarSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocationPayload {
    surplus: Decimal,
    #[serde(default)]
    pillars: Option<Vec<Pillar>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferPayload {
    from: PillarNumber,
    to: PillarNumber,
    amount: Decimal,
    date: NaiveDate,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalancePayload {
    number: PillarNumber,
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BudgetPayload {
    year: i32,
    gross_income: Decimal,
    #[serde(default)]
    fixed_costs: Decimal,
    #[serde(default)]
    investment_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpensePlanPayload {
    expense: PlannedExpense,
    as_of: NaiveDate,
    #[serde(default)]
    contribution: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleEntry {
    year: i32,
    month: u32,
    month_name: &'static str,
    amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpensePlanResponse {
    expense: PlannedExpense,
    remaining: Decimal,
    completion_percentage: Decimal,
    schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn tax_settings_from_payload(
    base: TaxSettings,
    payload: &TaxPayload,
) -> Result<TaxSettings, PlannerError> {
    let mut settings = base;
    if let Some(v) = payload.coefficient {
        settings.coefficient = v;
    }
    if let Some(v) = payload.contribution_rate {
        settings.contribution_rate = v;
    }
    if let Some(v) = payload.substitute_tax_rate {
        settings.substitute_tax_rate = v;
    }
    if let Some(v) = payload.min_threshold {
        settings.min_threshold = v;
    }
    if let Some(v) = payload.single_payment_threshold {
        settings.single_payment_threshold = v;
    }
    if let Some(v) = payload.prior_year_advances_paid {
        settings.prior_year_advances_paid = v;
    }
    settings.validate()?;
    Ok(settings)
}

fn profile_from_payload(defaults: &PlannerDefaults, payload: &TargetsPayload) -> PlanningProfile {
    let mut profile = defaults.profile();
    if let Some(v) = payload.liquidity_months {
        profile.liquidity_months = v;
    }
    if let Some(v) = payload.emergency_months {
        profile.emergency_months = v;
    }
    profile.investment_target = payload.investment_target;
    profile
}

/// Stored or default settings for `year` with the request's overrides on top.
/// A frozen year only accepts overrides that leave its settings unchanged.
fn effective_settings(
    book: &TaxSettingsBook,
    defaults: &PlannerDefaults,
    year: i32,
    payload: &TaxPayload,
) -> Result<TaxSettings, PlannerError> {
    let base = stored_or_default(book, defaults, year);
    let settings = tax_settings_from_payload(base.clone(), payload)?;
    if book.is_frozen(year) && settings != base {
        return Err(PlannerError::InvalidConfiguration(format!(
            "tax settings for {year} are frozen: deadlines were generated from them"
        )));
    }
    Ok(settings)
}

/// Breakdown for the payload's year and the calendar it produces for the next one.
/// The calendar uses the next year's own settings; both years freeze.
fn build_tax_response(state: &AppState, payload: &TaxPayload) -> Result<TaxResponse, PlannerError> {
    let income = payload
        .income
        .ok_or_else(|| PlannerError::InvalidAmount("income is required".to_string()))?;
    let year = payload
        .year
        .unwrap_or_else(|| chrono::Local::now().date_naive().year());
    let deadline_year = year + 1;

    let mut book = state.settings.lock().unwrap_or_else(PoisonError::into_inner);
    let settings = effective_settings(&book, &state.defaults, year, payload)?;
    let deadline_settings = effective_settings(&book, &state.defaults, deadline_year, payload)?;
    let breakdown = calculate_annual_taxes(income, &settings)?;
    let deadlines = generate_deadlines(
        deadline_year,
        &breakdown,
        &deadline_settings,
        &payload.existing_deadlines,
    )?;
    book.freeze(year);
    book.freeze(deadline_year);
    drop(book);

    let as_of = match payload.as_of {
        Some(date) => date,
        None => NaiveDate::from_ymd_opt(deadline_year, 1, 1).ok_or_else(|| {
            PlannerError::InvalidConfiguration(format!("year {deadline_year} is out of range"))
        })?,
    };
    let monthly_reserve = monthly_reserve(as_of, &deadlines);

    Ok(TaxResponse {
        settings,
        breakdown,
        deadline_year,
        deadlines,
        monthly_reserve,
    })
}

fn build_expense_plan(payload: ExpensePlanPayload) -> Result<ExpensePlanResponse, PlannerError> {
    let ExpensePlanPayload {
        mut expense,
        as_of,
        contribution,
    } = payload;
    if expense.target_amount < Decimal::ZERO || expense.current_amount < Decimal::ZERO {
        return Err(PlannerError::InvalidAmount(
            "target and current amounts must be >= 0".to_string(),
        ));
    }
    match contribution {
        Some(amount) => expense.contribute(amount, as_of)?,
        None => expense.refresh(as_of),
    }

    let schedule = contribution_schedule(&expense, as_of)
        .into_iter()
        .map(|(year, month)| ScheduleEntry {
            year,
            month,
            month_name: month_name(month),
            amount: contribution_for_month(&expense, as_of, year, month),
        })
        .collect();

    Ok(ExpensePlanResponse {
        remaining: expense.remaining(),
        completion_percentage: expense.completion_percentage(),
        schedule,
        expense,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/taxes", post(taxes_handler))
        .route("/api/taxes/coverage", post(coverage_handler))
        .route("/api/tax-settings", put(tax_settings_handler))
        .route("/api/forecast", post(forecast_generate_handler))
        .route("/api/forecast/:year", get(forecast_get_handler))
        .route(
            "/api/forecast/:year/months/:month/actuals",
            post(forecast_actuals_handler),
        )
        .route("/api/forecast/:year/projection", get(forecast_projection_handler))
        .route("/api/pillars", get(pillars_get_handler).put(pillars_put_handler))
        .route("/api/pillars/balance", post(pillar_balance_handler))
        .route("/api/pillars/targets", post(pillar_targets_handler))
        .route("/api/pillars/allocation", post(allocation_handler))
        .route(
            "/api/pillars/transfers",
            get(transfers_get_handler).post(transfer_post_handler),
        )
        .route("/api/budget", post(budget_handler))
        .route("/api/planned-expenses/plan", post(expense_plan_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16, defaults: PlannerDefaults) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(AppState::new(defaults)));

    let listener = TcpListener::bind(addr).await?;
    info!("Cash planner HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn taxes_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TaxPayload>,
) -> Response {
    respond(build_tax_response(&state, &payload))
}

async fn coverage_handler(Json(payload): Json<CoveragePayload>) -> Response {
    json_response(
        StatusCode::OK,
        tax_coverage(payload.accrued, &payload.deadlines, payload.as_of),
    )
}

async fn tax_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<TaxSettings>,
) -> Response {
    let mut book = state.settings.lock().unwrap_or_else(PoisonError::into_inner);
    respond(book.insert(settings.clone()).map(|()| settings))
}

async fn forecast_generate_handler(
    State(state): State<Arc<AppState>>,
    Json(inputs): Json<ForecastInputs>,
) -> Response {
    respond(state.forecasts.regenerate(&inputs).map(|f| (*f).clone()))
}

async fn forecast_get_handler(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Response {
    match state.forecasts.get(year) {
        Some(forecast) => json_response(StatusCode::OK, forecast.as_ref()),
        None => error_response(StatusCode::NOT_FOUND, &format!("No forecast for {year}")),
    }
}

async fn forecast_actuals_handler(
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(i32, u32)>,
    Json(transactions): Json<Vec<CategorizedTransaction>>,
) -> Response {
    respond(
        state
            .forecasts
            .update_actuals(year, month, &transactions)
            .map(|f| (*f).clone()),
    )
}

async fn forecast_projection_handler(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
    Query(query): Query<ProjectionQuery>,
) -> Response {
    let months_ahead = query.months_ahead.unwrap_or(DEFAULT_PROJECTION_MONTHS);
    let seed = match query.seed_balance {
        Some(seed) => Some(seed),
        None => state.forecasts.get(year).and_then(|f| {
            f.months.last().map(|m| m.expected_closing_balance)
        }),
    };
    let Some(seed) = seed else {
        return error_response(StatusCode::NOT_FOUND, &format!("No forecast for {year}"));
    };
    respond(state.forecasts.project_balance(year, months_ahead, seed))
}

async fn pillars_get_handler(State(state): State<Arc<AppState>>) -> Response {
    let ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    json_response(StatusCode::OK, ledger.summary())
}

async fn pillars_put_handler(
    State(state): State<Arc<AppState>>,
    Json(pillars): Json<Vec<Pillar>>,
) -> Response {
    let replacement = match PillarLedger::new(pillars) {
        Ok(ledger) => ledger,
        Err(err) => return planner_error_response(err),
    };
    let mut ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    *ledger = replacement;
    json_response(StatusCode::OK, ledger.summary())
}

async fn pillar_balance_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BalancePayload>,
) -> Response {
    let mut ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    respond(ledger.update_balance(payload.number, payload.balance).map(Pillar::status))
}

async fn pillar_targets_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TargetsPayload>,
) -> Response {
    let profile = profile_from_payload(&state.defaults, &payload);
    let targets = match compute_targets(
        &profile,
        payload.avg_monthly_expense,
        &payload.deadlines,
        &payload.planned_expenses,
        payload.as_of,
    ) {
        Ok(targets) => targets,
        Err(err) => return planner_error_response(err),
    };
    let mut ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    ledger.apply_targets(&targets);
    json_response(
        StatusCode::OK,
        TargetsResponse {
            targets,
            summary: ledger.summary(),
        },
    )
}

async fn allocation_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AllocationPayload>,
) -> Response {
    let result: Result<Vec<AllocationSuggestion>, PlannerError> = match &payload.pillars {
        Some(pillars) => suggest_allocation(payload.surplus, pillars),
        None => {
            let ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            suggest_allocation(payload.surplus, ledger.pillars())
        }
    };
    respond(result)
}

async fn transfers_get_handler(State(state): State<Arc<AppState>>) -> Response {
    let ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    json_response(StatusCode::OK, ledger.history())
}

async fn transfer_post_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TransferPayload>,
) -> Response {
    let mut ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    let result: Result<TransferRecord, PlannerError> = ledger
        .record_transfer(
            payload.from,
            payload.to,
            payload.amount,
            payload.date,
            payload.notes,
        )
        .cloned();
    respond(result)
}

async fn budget_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BudgetPayload>,
) -> Response {
    let settings = state.settings_for(payload.year);
    let ledger = state.ledger.lock().unwrap_or_else(PoisonError::into_inner);
    let plan: Result<BudgetPlan, PlannerError> = budget_plan(
        payload.gross_income,
        &settings,
        ledger.pillars(),
        payload.fixed_costs,
        payload.investment_rate.unwrap_or(DEFAULT_INVESTMENT_RATE),
    );
    respond(plan)
}

async fn expense_plan_handler(Json(payload): Json<ExpensePlanPayload>) -> Response {
    respond(build_expense_plan(payload))
}

fn respond<T: Serialize>(result: Result<T, PlannerError>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => planner_error_response(err),
    }
}

fn planner_error_response(err: PlannerError) -> Response {
    let status = match err {
        PlannerError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    warn!(%err, "Request rejected");
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn tax_payload_from_json(json: &str) -> Result<TaxPayload, String> {
    serde_json::from_str::<TaxPayload>(json).map_err(|e| format!("Invalid API JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeadlineKind, MAX_PROJECTION_MONTHS};
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(PlannerDefaults::default()))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn decimal(value: &Value) -> Decimal {
        match value {
            Value::String(s) => s.parse().expect("decimal string"),
            Value::Number(n) => n.to_string().parse().expect("decimal number"),
            other => panic!("not a decimal: {other}"),
        }
    }

    #[test]
    fn defaults_match_flat_rate_settings() {
        let defaults = PlannerDefaults::default();
        assert_eq!(defaults.tax_settings(2026), TaxSettings::flat_rate(2026));
        assert_eq!(defaults.profile().emergency_months, 6);
    }

    #[test]
    fn payload_overrides_layer_on_defaults() {
        let payload = tax_payload_from_json(r#"{"income": "42000", "substituteTaxRate": "0.05"}"#)
            .expect("valid json");
        let settings = tax_settings_from_payload(TaxSettings::flat_rate(2026), &payload)
            .expect("valid settings");
        assert_eq!(settings.substitute_tax_rate, dec!(0.05));
        assert_eq!(settings.coefficient, dec!(0.78));
    }

    #[test]
    fn payload_with_rate_outside_unit_interval_is_rejected() {
        let payload = tax_payload_from_json(r#"{"income": "1000", "coefficient": "1.5"}"#)
            .expect("valid json");
        let err = tax_settings_from_payload(TaxSettings::flat_rate(2026), &payload)
            .expect_err("must reject");
        assert!(matches!(err, PlannerError::InvalidConfiguration(_)));
    }

    #[test]
    fn tax_response_builds_next_year_calendar() {
        let state = state();
        let payload =
            tax_payload_from_json(r#"{"year": 2026, "income": "42000"}"#).expect("valid json");
        let response = build_tax_response(&state, &payload).expect("valid");

        assert_eq!(response.breakdown.total, dec!(13454.53));
        assert_eq!(response.deadline_year, 2027);
        let kinds: Vec<DeadlineKind> = response.deadlines.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DeadlineKind::Balance,
                DeadlineKind::FirstAdvance,
                DeadlineKind::SecondAdvance
            ]
        );
        assert!(response.monthly_reserve > Decimal::ZERO);

        // settings used for deadlines are frozen for that year
        let mut book = state.settings.lock().expect("lock");
        assert!(book.insert(TaxSettings::flat_rate(2026)).is_err());
        assert!(book.insert(TaxSettings::flat_rate(2028)).is_ok());
    }

    #[test]
    fn frozen_year_rejects_changed_settings() {
        let state = state();
        let payload =
            tax_payload_from_json(r#"{"year": 2026, "income": "42000"}"#).expect("valid json");
        let first = build_tax_response(&state, &payload).expect("valid");
        assert_eq!(first.breakdown.total, dec!(13454.53));

        let changed = tax_payload_from_json(
            r#"{"year": 2026, "income": "42000", "substituteTaxRate": "0.05"}"#,
        )
        .expect("valid json");
        let err = build_tax_response(&state, &changed).expect_err("frozen year");
        assert!(matches!(err, PlannerError::InvalidConfiguration(_)));

        // repeating the original settings is still allowed
        let again = build_tax_response(&state, &payload).expect("same settings");
        assert_eq!(again.breakdown.total, first.breakdown.total);
        assert_eq!(again.deadlines, first.deadlines);
    }

    #[test]
    fn calendar_uses_the_deadline_year_settings() {
        let state = state();
        let mut next_year = TaxSettings::flat_rate(2027);
        next_year.single_payment_threshold = dec!(100000);
        state
            .settings
            .lock()
            .expect("lock")
            .insert(next_year)
            .expect("valid");

        let payload =
            tax_payload_from_json(r#"{"year": 2026, "income": "42000"}"#).expect("valid json");
        let response = build_tax_response(&state, &payload).expect("valid");
        assert_eq!(response.breakdown.total, dec!(13454.53));
        let kinds: Vec<DeadlineKind> = response.deadlines.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DeadlineKind::Balance, DeadlineKind::SecondAdvance]);
        assert_eq!(response.deadlines[1].name, "Single advance 2027");
    }

    #[tokio::test]
    async fn projection_beyond_the_horizon_cap_is_rejected() {
        let state = state();
        let inputs: ForecastInputs = serde_json::from_value(serde_json::json!({
            "year": 2026,
            "asOf": "2026-01-01",
            "seedBalance": "1000",
        }))
        .expect("valid inputs");
        state.forecasts.regenerate(&inputs).expect("valid");

        let query = ProjectionQuery {
            months_ahead: Some(u32::MAX),
            seed_balance: None,
        };
        let response =
            forecast_projection_handler(State(state.clone()), Path(2026), Query(query)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let query = ProjectionQuery {
            months_ahead: Some(MAX_PROJECTION_MONTHS),
            seed_balance: None,
        };
        let response = forecast_projection_handler(State(state), Path(2026), Query(query)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn allocation_payload_with_unbounded_emergency_fund_is_rejected() {
        let mut pillars: Vec<Pillar> = PillarNumber::ALL
            .into_iter()
            .map(|number| Pillar::new(number, Decimal::ZERO, Some(dec!(100))))
            .collect();
        pillars[1].target_balance = None;
        let response = allocation_handler(
            State(state()),
            Json(AllocationPayload {
                surplus: dec!(1000),
                pillars: Some(pillars.clone()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        pillars[1].target_balance = Some(dec!(100));
        pillars[0].current_balance = dec!(-500);
        let response = pillars_put_handler(State(state()), Json(pillars)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn expense_plan_lists_named_months() {
        let payload = ExpensePlanPayload {
            expense: PlannedExpense {
                id: 7,
                name: "Dentist".to_string(),
                target_amount: dec!(500),
                current_amount: Decimal::ZERO,
                target_date: date(2026, 4, 15),
                monthly_contribution: Decimal::ZERO,
                is_completed: false,
            },
            as_of: date(2026, 1, 10),
            contribution: None,
        };
        let plan = build_expense_plan(payload).expect("valid");
        assert_eq!(plan.expense.monthly_contribution, dec!(166.67));
        let names: Vec<&str> = plan.schedule.iter().map(|e| e.month_name).collect();
        assert_eq!(names, vec!["January", "February", "March"]);
    }

    #[tokio::test]
    async fn allocation_endpoint_rejects_negative_surplus() {
        let response = allocation_handler(
            State(state()),
            Json(AllocationPayload {
                surplus: dec!(-5),
                pillars: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("surplus"));
    }

    #[tokio::test]
    async fn transfer_endpoint_updates_the_shared_ledger() {
        let state = state();
        pillar_balance_handler(
            State(state.clone()),
            Json(BalancePayload {
                number: PillarNumber::Liquidity,
                balance: dec!(1000),
            }),
        )
        .await;

        let response = transfer_post_handler(
            State(state.clone()),
            Json(TransferPayload {
                from: PillarNumber::Liquidity,
                to: PillarNumber::Investments,
                amount: dec!(400),
                date: date(2026, 3, 1),
                notes: "monthly".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let overdraft = transfer_post_handler(
            State(state.clone()),
            Json(TransferPayload {
                from: PillarNumber::Liquidity,
                to: PillarNumber::Investments,
                amount: dec!(601),
                date: date(2026, 3, 2),
                notes: String::new(),
            }),
        )
        .await;
        assert_eq!(overdraft.status(), StatusCode::BAD_REQUEST);

        let body = body_json(pillars_get_handler(State(state)).await).await;
        assert_eq!(decimal(&body["pillars"][0]["currentBalance"]), dec!(600));
        assert_eq!(decimal(&body["pillars"][3]["currentBalance"]), dec!(400));
        assert_eq!(body["pillars"][0]["number"], Value::from(1));
    }

    #[tokio::test]
    async fn missing_forecast_is_not_found() {
        let response = forecast_get_handler(State(state()), Path(2031)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            forecast_actuals_handler(State(state()), Path((2031, 1)), Json(Vec::new())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
