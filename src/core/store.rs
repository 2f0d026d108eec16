use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rust_decimal::Decimal;
use tracing::info;

use super::engine::{carry_actuals, generate_yearly_forecast, project_balance, update_actuals};
use super::error::{PlannerError, Result};
use super::types::{BalancePoint, CategorizedTransaction, ForecastInputs, YearForecast};

/// Published yearly forecasts. Writers for the same year are serialized and
/// build a complete new snapshot before swapping it in, so readers only ever
/// see whole versions.
#[derive(Debug, Default)]
pub struct ForecastStore {
    snapshots: RwLock<HashMap<i32, Arc<YearForecast>>>,
    year_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
    last_version: AtomicU64,
}

impl ForecastStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn year_lock(&self, year: i32) -> Arc<Mutex<()>> {
        let mut locks = self
            .year_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(year).or_default().clone()
    }

    pub fn get(&self, year: i32) -> Option<Arc<YearForecast>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&year)
            .cloned()
    }

    pub fn version(&self, year: i32) -> Option<u64> {
        self.get(year).map(|f| f.version)
    }

    /// Rebuilds the year from `inputs`, keeping actuals already ingested.
    pub fn regenerate(&self, inputs: &ForecastInputs) -> Result<Arc<YearForecast>> {
        let lock = self.year_lock(inputs.year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut fresh = generate_yearly_forecast(inputs)?;
        if let Some(previous) = self.get(inputs.year) {
            carry_actuals(&mut fresh, &previous);
        }
        Ok(self.publish(fresh))
    }

    pub fn update_actuals(
        &self,
        year: i32,
        month: u32,
        transactions: &[CategorizedTransaction],
    ) -> Result<Arc<YearForecast>> {
        let lock = self.year_lock(year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self
            .get(year)
            .ok_or_else(|| PlannerError::NotFound(format!("no forecast for {year}")))?;
        let idx = current
            .months
            .iter()
            .position(|m| m.month == month)
            .ok_or_else(|| PlannerError::NotFound(format!("no forecast month {year}-{month}")))?;

        let updated = update_actuals(&current.months[idx], transactions)?;
        let mut next = YearForecast::clone(&current);
        next.months[idx] = updated;
        Ok(self.publish(next))
    }

    pub fn project_balance(
        &self,
        year: i32,
        months_ahead: u32,
        seed_balance: Decimal,
    ) -> Result<Vec<BalancePoint>> {
        let forecast = self
            .get(year)
            .ok_or_else(|| PlannerError::NotFound(format!("no forecast for {year}")))?;
        project_balance(&forecast, months_ahead, seed_balance)
    }

    fn publish(&self, mut forecast: YearForecast) -> Arc<YearForecast> {
        forecast.version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let year = forecast.year;
        let version = forecast.version;
        let snapshot = Arc::new(forecast);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(year, Arc::clone(&snapshot));
        info!(year, version, "Published forecast snapshot");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Category, LineKind, Recurrence, ScheduledLine};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::thread;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn inputs(year: i32) -> ForecastInputs {
        ForecastInputs {
            year,
            as_of: date(year, 1, 1),
            seed_balance: dec!(2000),
            income_sources: vec![ScheduledLine {
                category_id: Some(1),
                description: "Invoices".to_string(),
                amount: dec!(3000),
                recurrence: Recurrence::Monthly { day: None },
            }],
            recurring_costs: Vec::new(),
            variable_categories: vec![Category {
                id: 2,
                name: "Groceries".to_string(),
                kind: LineKind::Variable,
                monthly_budget: dec!(300),
                pillar: None,
            }],
            tax_deadlines: Vec::new(),
            planned_expenses: Vec::new(),
            history: Vec::new(),
        }
    }

    fn groceries(year: i32, amount: Decimal) -> CategorizedTransaction {
        CategorizedTransaction {
            date: date(year, 1, 15),
            amount,
            category_id: Some(2),
            is_income: false,
            description: "market".to_string(),
        }
    }

    #[test]
    fn regenerate_publishes_new_versions_and_keeps_actuals() {
        let store = ForecastStore::new();
        let first = store.regenerate(&inputs(2026)).expect("valid");
        store
            .update_actuals(2026, 1, &[groceries(2026, dec!(-120))])
            .expect("valid");

        let mut changed = inputs(2026);
        changed.income_sources[0].amount = dec!(3200);
        let latest = store.regenerate(&changed).expect("valid");

        assert!(latest.version > first.version);
        assert_eq!(latest.months[0].expected_income, dec!(3200));
        assert_eq!(latest.months[0].actual_variable_costs, dec!(120));
        // readers holding the old snapshot are unaffected
        assert_eq!(first.months[0].actual_variable_costs, Decimal::ZERO);
    }

    #[test]
    fn failed_update_keeps_the_published_version() {
        let store = ForecastStore::new();
        store.regenerate(&inputs(2026)).expect("valid");
        let version = store.version(2026);

        let mut untagged = groceries(2026, dec!(-10));
        untagged.category_id = None;
        assert!(store.update_actuals(2026, 1, &[untagged]).is_err());
        assert_eq!(store.version(2026), version);

        let err = store.update_actuals(2027, 1, &[]).expect_err("missing year");
        assert!(matches!(err, PlannerError::NotFound(_)));
        let err = store.update_actuals(2026, 13, &[]).expect_err("missing month");
        assert!(matches!(err, PlannerError::NotFound(_)));
    }

    #[test]
    fn concurrent_regeneration_and_ingestion_do_not_lose_actuals() {
        let store = ForecastStore::new();
        store.regenerate(&inputs(2026)).expect("valid");
        store.regenerate(&inputs(2027)).expect("valid");

        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..20 {
                    store.regenerate(&inputs(2026)).expect("valid");
                }
            });
            scope.spawn(|| {
                for _ in 0..20 {
                    store
                        .update_actuals(2026, 1, &[groceries(2026, dec!(-75))])
                        .expect("valid");
                }
            });
            scope.spawn(|| {
                for _ in 0..20 {
                    store.regenerate(&inputs(2027)).expect("valid");
                }
            });
        });

        let forecast = store.get(2026).expect("published");
        assert_eq!(forecast.months[0].actual_variable_costs, dec!(75));
        for pair in forecast.months.windows(2) {
            assert_eq!(pair[1].opening_balance, pair[0].expected_closing_balance);
        }
        assert!(store.get(2027).is_some());
    }

    #[test]
    fn projection_requires_a_published_year() {
        let store = ForecastStore::new();
        assert!(store.project_balance(2026, 3, dec!(100)).is_err());
        store.regenerate(&inputs(2026)).expect("valid");
        let points = store.project_balance(2026, 3, dec!(100)).expect("valid");
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].closing, dec!(2800));
    }
}
