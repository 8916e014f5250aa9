//! Run orchestration: resolves reference pricing, drives the lifecycle
//! transitions around a projection, and guarantees that a failed run is
//! recorded with its cause rather than silently dropped.

use chrono::Utc;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::experiment::{Experiment, ExperimentId, ExperimentStatus};
use crate::domain::lever::LeverKind;
use crate::domain::run::{RunId, RunStatus, SimulationRun};
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::{self, ExperimentAction};
use crate::sim::projection::{project, ScopePricing, SimulationParams};
use crate::storage::{ExperimentStore, ReferenceDataProvider, SimulationRunStore};

const ACTOR: &str = "simulation-runner";

pub struct SimulationRunner<E, R, S, A> {
    experiments: E,
    reference: R,
    runs: S,
    audit: A,
    params: SimulationParams,
}

impl<E, R, S, A> SimulationRunner<E, R, S, A>
where
    E: ExperimentStore,
    R: ReferenceDataProvider,
    S: SimulationRunStore,
    A: AuditSink,
{
    pub fn new(experiments: E, reference: R, runs: S, audit: A, params: SimulationParams) -> Self {
        Self { experiments, reference, runs, audit, params }
    }

    /// Executes one simulation run for an approved experiment.
    ///
    /// The compare-and-set on the stored status is the only concurrency
    /// guard: when two callers race, exactly one observes APPROVED and
    /// proceeds, the other gets a failed run carrying an invalid-state
    /// message. Any failure after the run record exists marks the run
    /// FAILED with the error text and moves the experiment to FAILED;
    /// no partial daily results are ever persisted.
    pub async fn run(&self, experiment_id: &ExperimentId) -> Result<SimulationRun, ApplicationError> {
        let experiment = self
            .experiments
            .find(experiment_id)
            .await?
            .ok_or_else(|| DomainError::MissingPrerequisite {
                reason: format!("experiment {experiment_id} not found"),
            })?;

        lifecycle::ensure_allowed(experiment.status, ExperimentAction::StartSimulation)?;

        if experiment.scope.is_empty() {
            return Err(DomainError::MissingPrerequisite {
                reason: format!("experiment {experiment_id} has no scope entries"),
            }
            .into());
        }
        let lever = experiment.lever.clone().ok_or_else(|| DomainError::MissingPrerequisite {
            reason: format!("experiment {experiment_id} has no lever"),
        })?;
        let LeverKind::PriceDiscount { discount_pct } = lever.kind;

        let started_at = Utc::now();
        let total_days = experiment.total_days();
        let run_id = self.runs.create_running(experiment_id, total_days, started_at).await?;

        let claimed = self
            .experiments
            .transition_status(experiment_id, ExperimentStatus::Approved, ExperimentStatus::Running)
            .await?;
        if !claimed {
            // The read that passed the precondition check is stale by
            // now; report the status the store actually holds.
            let current = self
                .experiments
                .find(experiment_id)
                .await?
                .map(|latest| latest.status)
                .unwrap_or(experiment.status);
            let error = DomainError::InvalidState {
                current,
                action: ExperimentAction::StartSimulation,
                allowed: vec![ExperimentStatus::Approved],
            };
            self.runs.mark_failed(&run_id, &error.to_string(), Utc::now()).await?;
            self.emit_failed(experiment_id, &run_id, &error.to_string());
            return Err(error.into());
        }

        self.audit.emit(
            AuditEvent::new(
                Some(experiment_id.clone()),
                Some(run_id.clone()),
                "simulation.started",
                AuditCategory::Simulation,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("total_days", total_days.to_string()),
        );

        match self.execute(&experiment, &run_id, discount_pct, started_at).await {
            Ok(run) => {
                let mut event = AuditEvent::new(
                    Some(experiment_id.clone()),
                    Some(run_id.clone()),
                    "simulation.completed",
                    AuditCategory::Simulation,
                    ACTOR,
                    AuditOutcome::Success,
                )
                .with_metadata("control_revenue", run.totals.control_revenue.to_string())
                .with_metadata("test_revenue", run.totals.test_revenue.to_string());
                if let Some(lift) = run.revenue_lift_pct {
                    event = event.with_metadata("revenue_lift_pct", lift.to_string());
                }
                self.audit.emit(event);
                Ok(run)
            }
            Err(error) => {
                // The run keeps the cause verbatim; readers never see a
                // RUNNING run whose experiment already failed.
                self.runs.mark_failed(&run_id, &error.to_string(), Utc::now()).await?;
                self.experiments
                    .transition_status(
                        experiment_id,
                        ExperimentStatus::Running,
                        ExperimentStatus::Failed,
                    )
                    .await?;
                self.emit_failed(experiment_id, &run_id, &error.to_string());
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        experiment: &Experiment,
        run_id: &RunId,
        discount_pct: rust_decimal::Decimal,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<SimulationRun, ApplicationError> {
        let mut pricing = Vec::with_capacity(experiment.scope.len());
        for entry in &experiment.scope {
            let base_price = self
                .reference
                .effective_price(&entry.sku_id, &entry.store_id, experiment.start_date)
                .await?
                .ok_or_else(|| DomainError::MissingPrerequisite {
                    reason: format!(
                        "no reference price for SKU {} at store {} effective {}",
                        entry.sku_id, entry.store_id, experiment.start_date
                    ),
                })?;
            let unit_cost = self
                .reference
                .effective_cost(&entry.sku_id, experiment.start_date)
                .await?
                .ok_or_else(|| DomainError::MissingPrerequisite {
                    reason: format!(
                        "no reference cost for SKU {} effective {}",
                        entry.sku_id, experiment.start_date
                    ),
                })?;
            pricing.push(ScopePricing {
                store_id: entry.store_id.clone(),
                sku_id: entry.sku_id.clone(),
                base_price,
                unit_cost,
            });
        }

        let projection = project(
            run_id,
            experiment.start_date,
            experiment.end_date,
            discount_pct,
            &pricing,
            &self.params,
        )?;

        let run = SimulationRun {
            id: run_id.clone(),
            experiment_id: experiment.id.clone(),
            status: RunStatus::Completed,
            started_at,
            completed_at: Some(Utc::now()),
            error_message: None,
            total_days: experiment.total_days(),
            totals: projection.totals,
            revenue_lift_pct: projection.revenue_lift_pct,
        };
        self.runs.save_completed(&run, &projection.rows).await?;

        let closed = self
            .experiments
            .transition_status(&experiment.id, ExperimentStatus::Running, ExperimentStatus::Completed)
            .await?;
        if !closed {
            return Err(ApplicationError::Persistence(format!(
                "experiment {} left the RUNNING state while its run was executing",
                experiment.id
            )));
        }

        Ok(run)
    }

    fn emit_failed(&self, experiment_id: &ExperimentId, run_id: &RunId, message: &str) {
        self.audit.emit(
            AuditEvent::new(
                Some(experiment_id.clone()),
                Some(run_id.clone()),
                "simulation.failed",
                AuditCategory::Simulation,
                ACTOR,
                AuditOutcome::Failed,
            )
            .with_metadata("error", message.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::audit::{AuditOutcome, InMemoryAuditSink};
    use crate::domain::experiment::{
        Experiment, ExperimentId, ExperimentStatus, ScopeEntry, SkuId, StoreId,
    };
    use crate::domain::guardrail::GuardrailSet;
    use crate::domain::lever::Lever;
    use crate::domain::reference::{ReferenceCost, ReferencePrice};
    use crate::domain::run::RunStatus;
    use crate::errors::{ApplicationError, DomainError};
    use crate::sim::projection::SimulationParams;
    use crate::storage::{
        ExperimentStore, InMemoryExperimentStore, InMemoryReferenceData,
        InMemorySimulationRunStore, SimulationRunStore,
    };

    use super::SimulationRunner;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn money(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn approved_experiment() -> Experiment {
        let mut experiment = Experiment::new(
            ExperimentId("exp-1".to_string()),
            "cola winter discount".to_string(),
            date(2026, 2, 1),
            date(2026, 2, 5),
        )
        .expect("valid window");
        experiment
            .add_scope_entry(ScopeEntry {
                store_id: StoreId("store-1".to_string()),
                sku_id: SkuId("sku-cola".to_string()),
                is_test_group: true,
            })
            .expect("scope");
        experiment
            .set_lever(
                Lever::price_discount(SkuId("sku-cola".to_string()), Decimal::from(10))
                    .expect("lever"),
            )
            .expect("set lever");
        experiment
            .set_guardrails(GuardrailSet::new(money(5000), money(15000), Decimal::from(20)))
            .expect("guardrails");
        experiment.status = ExperimentStatus::Approved;
        experiment
    }

    fn reference_data() -> InMemoryReferenceData {
        let reference = InMemoryReferenceData::default();
        reference.add_price(ReferencePrice {
            sku_id: SkuId("sku-cola".to_string()),
            store_id: StoreId("store-1".to_string()),
            price: money(10000),
            effective_from: date(2026, 1, 1),
            effective_until: None,
        });
        reference.add_cost(ReferenceCost {
            sku_id: SkuId("sku-cola".to_string()),
            cost: money(6000),
            effective_from: date(2026, 1, 1),
            effective_until: None,
        });
        reference
    }

    fn runner(
        experiments: InMemoryExperimentStore,
        reference: InMemoryReferenceData,
        runs: InMemorySimulationRunStore,
        audit: InMemoryAuditSink,
    ) -> SimulationRunner<
        InMemoryExperimentStore,
        InMemoryReferenceData,
        InMemorySimulationRunStore,
        InMemoryAuditSink,
    > {
        SimulationRunner::new(experiments, reference, runs, audit, SimulationParams::default())
    }

    #[tokio::test]
    async fn approved_experiment_runs_to_completion() {
        let experiments = InMemoryExperimentStore::with_experiment(approved_experiment());
        let runs = InMemorySimulationRunStore::default();
        let audit = InMemoryAuditSink::default();
        let runner = runner(experiments.clone(), reference_data(), runs.clone(), audit.clone());

        let run = runner.run(&ExperimentId("exp-1".to_string())).await.expect("run completes");

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.total_days, 5);
        assert_eq!(run.totals.control_units, 500);
        assert_eq!(run.totals.test_units, 575);
        assert_eq!(run.revenue_lift_pct, Some(Decimal::new(35, 1)));

        let experiment = experiments
            .find(&ExperimentId("exp-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(experiment.status, ExperimentStatus::Completed);

        let rows = runs.list_results(&run.id).await.expect("results");
        assert_eq!(rows.len(), 10);

        let events = audit.events();
        assert!(events.iter().any(|event| event.event_type == "simulation.started"));
        assert!(events.iter().any(|event| event.event_type == "simulation.completed"));
    }

    #[tokio::test]
    async fn missing_reference_cost_fails_the_run_and_the_experiment() {
        let experiments = InMemoryExperimentStore::with_experiment(approved_experiment());
        let reference = InMemoryReferenceData::default();
        reference.add_price(ReferencePrice {
            sku_id: SkuId("sku-cola".to_string()),
            store_id: StoreId("store-1".to_string()),
            price: money(10000),
            effective_from: date(2026, 1, 1),
            effective_until: None,
        });
        let runs = InMemorySimulationRunStore::default();
        let audit = InMemoryAuditSink::default();
        let runner = runner(experiments.clone(), reference, runs.clone(), audit.clone());

        let error =
            runner.run(&ExperimentId("exp-1".to_string())).await.expect_err("missing cost");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::MissingPrerequisite { .. })
        ));

        let experiment = experiments
            .find(&ExperimentId("exp-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(experiment.status, ExperimentStatus::Failed);

        let failed = audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "simulation.failed")
            .expect("failure event");
        assert_eq!(failed.outcome, AuditOutcome::Failed);
        let message = failed.metadata.get("error").expect("error metadata");
        assert!(message.contains("no reference cost for SKU sku-cola"));
    }

    #[tokio::test]
    async fn failed_run_keeps_the_error_message_and_no_result_rows() {
        let experiments = InMemoryExperimentStore::with_experiment(approved_experiment());
        let runs = InMemorySimulationRunStore::default();
        let audit = InMemoryAuditSink::default();
        let runner =
            runner(experiments, InMemoryReferenceData::default(), runs.clone(), audit.clone());

        runner.run(&ExperimentId("exp-1".to_string())).await.expect_err("no reference data");

        let run_id = audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "simulation.failed")
            .and_then(|event| event.run_id)
            .expect("failed run id");
        let run = runs.find(&run_id).await.expect("find").expect("run exists");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.completed_at.is_some());
        assert!(run
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("no reference price")));
        assert!(runs.list_results(&run_id).await.expect("results").is_empty());
    }

    #[tokio::test]
    async fn draft_experiment_is_rejected_before_a_run_is_created() {
        let mut experiment = approved_experiment();
        experiment.status = ExperimentStatus::Draft;
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let runs = InMemorySimulationRunStore::default();
        let audit = InMemoryAuditSink::default();
        let runner = runner(experiments, reference_data(), runs, audit.clone());

        let error = runner.run(&ExperimentId("exp-1".to_string())).await.expect_err("draft");
        match error {
            ApplicationError::Domain(DomainError::InvalidState { current, .. }) => {
                assert_eq!(current, ExperimentStatus::Draft);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(audit.events().is_empty());
    }

    /// The first read reports APPROVED while the stored status has
    /// already moved, so the compare-and-set is the guard that loses
    /// the race. Later reads see the true stored status.
    struct StaleReadStore {
        inner: InMemoryExperimentStore,
        stale_read_done: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ExperimentStore for StaleReadStore {
        async fn find(
            &self,
            id: &ExperimentId,
        ) -> Result<Option<Experiment>, ApplicationError> {
            let mut experiment = self.inner.find(id).await?;
            if let Some(experiment) = experiment.as_mut() {
                if !self.stale_read_done.swap(true, Ordering::SeqCst) {
                    experiment.status = ExperimentStatus::Approved;
                }
            }
            Ok(experiment)
        }

        async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
            self.inner.save(experiment).await
        }

        async fn transition_status(
            &self,
            id: &ExperimentId,
            from: ExperimentStatus,
            to: ExperimentStatus,
        ) -> Result<bool, ApplicationError> {
            self.inner.transition_status(id, from, to).await
        }
    }

    #[tokio::test]
    async fn losing_a_status_race_fails_the_run_with_the_stored_status() {
        let mut experiment = approved_experiment();
        experiment.status = ExperimentStatus::Running;
        let experiments = StaleReadStore {
            inner: InMemoryExperimentStore::with_experiment(experiment),
            stale_read_done: AtomicBool::new(false),
        };
        let runs = InMemorySimulationRunStore::default();
        let audit = InMemoryAuditSink::default();
        let runner = SimulationRunner::new(
            experiments,
            reference_data(),
            runs.clone(),
            audit.clone(),
            SimulationParams::default(),
        );

        let error = runner.run(&ExperimentId("exp-1".to_string())).await.expect_err("lost race");
        match &error {
            ApplicationError::Domain(DomainError::InvalidState { current, .. }) => {
                // The stale read said APPROVED; the error reflects the
                // status the store holds after the race is lost.
                assert_eq!(*current, ExperimentStatus::Running);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let run_id = audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "simulation.failed")
            .and_then(|event| event.run_id)
            .expect("failed run id");
        let run = runs.find(&run_id).await.expect("find").expect("run exists");
        assert_eq!(run.status, RunStatus::Failed);
        let message = run.error_message.as_deref().expect("error message");
        assert!(message.contains("start simulation"), "message: {message}");
        assert!(message.contains("RUNNING"), "message: {message}");
    }

    #[tokio::test]
    async fn identical_experiments_produce_identical_projections() {
        let mut totals = Vec::new();
        for _ in 0..2 {
            let experiments = InMemoryExperimentStore::with_experiment(approved_experiment());
            let runs = InMemorySimulationRunStore::default();
            let runner = runner(
                experiments,
                reference_data(),
                runs,
                InMemoryAuditSink::default(),
            );
            let run =
                runner.run(&ExperimentId("exp-1".to_string())).await.expect("run completes");
            totals.push((run.totals, run.revenue_lift_pct));
        }
        assert_eq!(totals[0], totals[1]);
    }
}
