//! End-to-end flow over a real SQLite database: seed, submit, approve,
//! simulate, and read the results back through the reporting helpers.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use pricelab_core::audit::InMemoryAuditSink;
use pricelab_core::domain::experiment::{ExperimentId, ExperimentStatus};
use pricelab_core::domain::run::{RunStatus, Variant};
use pricelab_core::errors::{ApplicationError, DomainError};
use pricelab_core::results::{breakdown_by_store, summarize, timeseries_by_date, to_csv};
use pricelab_core::sim::projection::SimulationParams;
use pricelab_core::sim::runner::SimulationRunner;
use pricelab_core::storage::{ExperimentStore, SimulationRunStore};
use pricelab_core::workflow::ExperimentWorkflow;
use pricelab_db::{connect_with_settings, fixtures, migrations, DbPool};
use pricelab_db::{SqlExperimentStore, SqlReferenceData, SqlSimulationRunStore};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn seeded_pool() -> (DbPool, ExperimentId) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let result = fixtures::seed(&pool).await.expect("seed");
    (pool, result.experiment_id)
}

#[tokio::test]
async fn seeded_experiment_runs_from_draft_to_completed() {
    let (pool, experiment_id) = seeded_pool().await;
    let audit = InMemoryAuditSink::default();

    let workflow = ExperimentWorkflow::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        audit.clone(),
    );

    let check = workflow.submit(&experiment_id, date(2026, 1, 15)).await.expect("submit");
    // Conservative base is the cheaper downtown price.
    assert_eq!(check.base_price, Decimal::new(10000, 2));
    assert_eq!(check.lever_price, Decimal::new(9000, 2));

    workflow.approve(&experiment_id).await.expect("approve");

    let runner = SimulationRunner::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        SqlSimulationRunStore::new(pool.clone()),
        audit.clone(),
        SimulationParams::default(),
    );
    let run = runner.run(&experiment_id).await.expect("run");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_days, 14);

    let experiment = SqlExperimentStore::new(pool.clone())
        .find(&experiment_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(experiment.status, ExperimentStatus::Completed);

    let runs = SqlSimulationRunStore::new(pool.clone());
    let rows = runs.list_results(&run.id).await.expect("results");
    // 14 days x 2 scope entries x 2 variants.
    assert_eq!(rows.len(), 14 * 2 * 2);
    assert!(rows.iter().any(|row| row.variant == Variant::Test));

    let summary = summarize(&run);
    assert_eq!(summary.control.units, 14 * 2 * 100);
    assert!(summary.revenue_lift_pct.is_some());

    let series = timeseries_by_date(&rows);
    assert_eq!(series.len(), 14);

    let breakdown = breakdown_by_store(&rows);
    assert_eq!(breakdown.len(), 2);

    let csv = to_csv(&experiment_id, &rows);
    assert_eq!(csv.lines().count(), rows.len() + 1);
}

#[tokio::test]
async fn second_simulation_attempt_loses_the_status_race() {
    let (pool, experiment_id) = seeded_pool().await;
    let audit = InMemoryAuditSink::default();

    let workflow = ExperimentWorkflow::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        audit.clone(),
    );
    workflow.submit(&experiment_id, date(2026, 1, 15)).await.expect("submit");
    workflow.approve(&experiment_id).await.expect("approve");

    let runner = SimulationRunner::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        SqlSimulationRunStore::new(pool.clone()),
        audit.clone(),
        SimulationParams::default(),
    );
    runner.run(&experiment_id).await.expect("first run");

    let error = runner.run(&experiment_id).await.expect_err("second run");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidState { .. })));
}

#[tokio::test]
async fn missing_reference_data_marks_run_and_experiment_failed() {
    let (pool, experiment_id) = seeded_pool().await;
    let audit = InMemoryAuditSink::default();

    let workflow = ExperimentWorkflow::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        audit.clone(),
    );
    workflow.submit(&experiment_id, date(2026, 1, 15)).await.expect("submit");
    workflow.approve(&experiment_id).await.expect("approve");

    // Remove the cost record so pricing resolution fails mid-run.
    sqlx::query("DELETE FROM reference_cost WHERE sku_id = 'sku-cola'")
        .execute(&pool)
        .await
        .expect("delete cost");

    let runner = SimulationRunner::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        SqlSimulationRunStore::new(pool.clone()),
        audit.clone(),
        SimulationParams::default(),
    );
    let error = runner.run(&experiment_id).await.expect_err("missing cost");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::MissingPrerequisite { .. })
    ));

    let experiment = SqlExperimentStore::new(pool.clone())
        .find(&experiment_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(experiment.status, ExperimentStatus::Failed);

    let run_id = audit
        .events()
        .into_iter()
        .find(|event| event.event_type == "simulation.failed")
        .and_then(|event| event.run_id)
        .expect("failed run id");
    let run = SqlSimulationRunStore::new(pool.clone())
        .find(&run_id)
        .await
        .expect("find run")
        .expect("run exists");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .is_some_and(|message| message.contains("no reference cost for SKU sku-cola")));
}

#[tokio::test]
async fn guardrail_violation_blocks_submission() {
    let (pool, experiment_id) = seeded_pool().await;
    let audit = InMemoryAuditSink::default();
    let workflow = ExperimentWorkflow::new(
        SqlExperimentStore::new(pool.clone()),
        SqlReferenceData::new(pool.clone()),
        audit,
    );

    // Tighten the floor above the lever price before submitting.
    sqlx::query("UPDATE experiment_guardrail SET price_floor = '95.00' WHERE experiment_id = ?")
        .bind(experiment_id.0.as_str())
        .execute(&pool)
        .await
        .expect("tighten floor");

    let error =
        workflow.submit(&experiment_id, date(2026, 1, 15)).await.expect_err("floor violation");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::GuardrailViolation { .. })
    ));

    let experiment = SqlExperimentStore::new(pool)
        .find(&experiment_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(experiment.status, ExperimentStatus::Draft);
}
