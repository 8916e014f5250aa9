//! Storage ports implemented by `pricelab-db`, plus in-memory editions
//! used by tests and local tooling. The in-memory stores honor the same
//! contracts as the SQL ones, including the compare-and-set status
//! transition and the all-or-nothing run save.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::experiment::{Experiment, ExperimentId, ExperimentStatus, SkuId, StoreId};
use crate::domain::reference::{ReferenceCost, ReferencePrice};
use crate::domain::run::{DailyResult, RunId, RunStatus, SimulationRun};
use crate::errors::ApplicationError;

#[async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn find(&self, id: &ExperimentId) -> Result<Option<Experiment>, ApplicationError>;

    async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError>;

    /// Atomically moves the stored status from `from` to `to`. Returns
    /// false when the stored status no longer matches `from`, which is
    /// the loser's signal in a concurrent transition race.
    async fn transition_status(
        &self,
        id: &ExperimentId,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<bool, ApplicationError>;
}

#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    async fn effective_price(
        &self,
        sku_id: &SkuId,
        store_id: &StoreId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError>;

    async fn effective_cost(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError>;

    /// Every price effective on the date across stores, for the
    /// guardrail validator's conservative minimum.
    async fn all_effective_prices(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Vec<Decimal>, ApplicationError>;
}

#[async_trait]
pub trait SimulationRunStore: Send + Sync {
    async fn create_running(
        &self,
        experiment_id: &ExperimentId,
        total_days: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RunId, ApplicationError>;

    /// Persists the completed run and its full result set as one unit.
    /// Partial result sets must never become visible to readers.
    async fn save_completed(
        &self,
        run: &SimulationRun,
        rows: &[DailyResult],
    ) -> Result<(), ApplicationError>;

    async fn mark_failed(
        &self,
        run_id: &RunId,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    async fn find(&self, run_id: &RunId) -> Result<Option<SimulationRun>, ApplicationError>;

    async fn list_results(&self, run_id: &RunId) -> Result<Vec<DailyResult>, ApplicationError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExperimentStore {
    experiments: Arc<Mutex<HashMap<String, Experiment>>>,
}

impl InMemoryExperimentStore {
    pub fn with_experiment(experiment: Experiment) -> Self {
        let store = Self::default();
        lock(&store.experiments).insert(experiment.id.0.clone(), experiment);
        store
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn find(&self, id: &ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        Ok(lock(&self.experiments).get(&id.0).cloned())
    }

    async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        lock(&self.experiments).insert(experiment.id.0.clone(), experiment.clone());
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &ExperimentId,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<bool, ApplicationError> {
        let mut experiments = lock(&self.experiments);
        match experiments.get_mut(&id.0) {
            Some(experiment) if experiment.status == from => {
                experiment.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ApplicationError::Persistence(format!("experiment {id} not found"))),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReferenceData {
    prices: Arc<Mutex<Vec<ReferencePrice>>>,
    costs: Arc<Mutex<Vec<ReferenceCost>>>,
}

impl InMemoryReferenceData {
    pub fn add_price(&self, price: ReferencePrice) {
        lock(&self.prices).push(price);
    }

    pub fn add_cost(&self, cost: ReferenceCost) {
        lock(&self.costs).push(cost);
    }
}

#[async_trait]
impl ReferenceDataProvider for InMemoryReferenceData {
    async fn effective_price(
        &self,
        sku_id: &SkuId,
        store_id: &StoreId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError> {
        Ok(lock(&self.prices)
            .iter()
            .find(|price| {
                price.sku_id == *sku_id && price.store_id == *store_id && price.is_effective_on(on)
            })
            .map(|price| price.price))
    }

    async fn effective_cost(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError> {
        Ok(lock(&self.costs)
            .iter()
            .find(|cost| cost.sku_id == *sku_id && cost.is_effective_on(on))
            .map(|cost| cost.cost))
    }

    async fn all_effective_prices(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Vec<Decimal>, ApplicationError> {
        Ok(lock(&self.prices)
            .iter()
            .filter(|price| price.sku_id == *sku_id && price.is_effective_on(on))
            .map(|price| price.price)
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySimulationRunStore {
    runs: Arc<Mutex<HashMap<String, SimulationRun>>>,
    results: Arc<Mutex<HashMap<String, Vec<DailyResult>>>>,
}

#[async_trait]
impl SimulationRunStore for InMemorySimulationRunStore {
    async fn create_running(
        &self,
        experiment_id: &ExperimentId,
        total_days: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RunId, ApplicationError> {
        let id = RunId(format!("run-{}", Uuid::new_v4()));
        let run = SimulationRun {
            id: id.clone(),
            experiment_id: experiment_id.clone(),
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            error_message: None,
            total_days,
            totals: Default::default(),
            revenue_lift_pct: None,
        };
        lock(&self.runs).insert(id.0.clone(), run);
        Ok(id)
    }

    async fn save_completed(
        &self,
        run: &SimulationRun,
        rows: &[DailyResult],
    ) -> Result<(), ApplicationError> {
        lock(&self.runs).insert(run.id.0.clone(), run.clone());
        lock(&self.results).insert(run.id.0.clone(), rows.to_vec());
        Ok(())
    }

    async fn mark_failed(
        &self,
        run_id: &RunId,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut runs = lock(&self.runs);
        let run = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| ApplicationError::Persistence(format!("run {run_id} not found")))?;
        run.status = RunStatus::Failed;
        run.error_message = Some(error_message.to_string());
        run.completed_at = Some(completed_at);
        Ok(())
    }

    async fn find(&self, run_id: &RunId) -> Result<Option<SimulationRun>, ApplicationError> {
        Ok(lock(&self.runs).get(&run_id.0).cloned())
    }

    async fn list_results(&self, run_id: &RunId) -> Result<Vec<DailyResult>, ApplicationError> {
        Ok(lock(&self.results).get(&run_id.0).cloned().unwrap_or_default())
    }
}
