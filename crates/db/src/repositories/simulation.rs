use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use pricelab_core::domain::experiment::{ExperimentId, SkuId, StoreId};
use pricelab_core::domain::run::{
    DailyResult, RunId, RunStatus, RunTotals, SimulationRun, Variant,
};
use pricelab_core::errors::ApplicationError;
use pricelab_core::storage::SimulationRunStore;

use super::{parse_date, parse_decimal, parse_rfc3339, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlSimulationRunStore {
    pool: DbPool,
}

impl SqlSimulationRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_running(
        &self,
        experiment_id: &ExperimentId,
        total_days: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RunId, RepositoryError> {
        let id = RunId(format!("run-{}", sqlx::types::Uuid::new_v4()));
        sqlx::query(
            "INSERT INTO simulation_run (id, experiment_id, status, started_at, total_days)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&experiment_id.0)
        .bind(RunStatus::Running.as_str())
        .bind(started_at.to_rfc3339())
        .bind(total_days)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Writes the finished run header and every daily row in a single
    /// transaction so readers never observe a partial result set.
    pub async fn insert_completed(
        &self,
        run: &SimulationRun,
        rows: &[DailyResult],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE simulation_run SET
                status = ?,
                completed_at = ?,
                error_message = NULL,
                total_days = ?,
                control_units = ?,
                control_revenue = ?,
                control_margin = ?,
                test_units = ?,
                test_revenue = ?,
                test_margin = ?,
                revenue_lift_pct = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(run.total_days)
        .bind(run.totals.control_units)
        .bind(run.totals.control_revenue.to_string())
        .bind(run.totals.control_margin.to_string())
        .bind(run.totals.test_units)
        .bind(run.totals.test_revenue.to_string())
        .bind(run.totals.test_margin.to_string())
        .bind(run.revenue_lift_pct.map(|lift| lift.to_string()))
        .bind(&run.id.0)
        .execute(&mut *tx)
        .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO simulation_daily_result (
                    run_id, date, store_id, sku_id, variant,
                    base_price, simulated_price, unit_cost, units,
                    revenue, cost, margin, baseline_units, baseline_revenue
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.run_id.0)
            .bind(row.date.to_string())
            .bind(&row.store_id.0)
            .bind(&row.sku_id.0)
            .bind(row.variant.as_str())
            .bind(row.base_price.to_string())
            .bind(row.simulated_price.to_string())
            .bind(row.unit_cost.to_string())
            .bind(row.units)
            .bind(row.revenue.to_string())
            .bind(row.cost.to_string())
            .bind(row.margin.to_string())
            .bind(row.baseline_units)
            .bind(row.baseline_revenue.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_failed(
        &self,
        run_id: &RunId,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE simulation_run SET status = ?, error_message = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(error_message)
        .bind(completed_at.to_rfc3339())
        .bind(&run_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_run(&self, run_id: &RunId) -> Result<Option<SimulationRun>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, experiment_id, status, started_at, completed_at, error_message,
                total_days, control_units, control_revenue, control_margin,
                test_units, test_revenue, test_margin, revenue_lift_pct
            FROM simulation_run
            WHERE id = ?
            "#,
        )
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| run_from_row(&row)).transpose()
    }

    pub async fn results_for_run(
        &self,
        run_id: &RunId,
    ) -> Result<Vec<DailyResult>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                run_id, date, store_id, sku_id, variant,
                base_price, simulated_price, unit_cost, units,
                revenue, cost, margin, baseline_units, baseline_revenue
            FROM simulation_daily_result
            WHERE run_id = ?
            ORDER BY date, store_id, sku_id, variant
            "#,
        )
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(daily_result_from_row).collect()
    }
}

#[async_trait]
impl SimulationRunStore for SqlSimulationRunStore {
    async fn create_running(
        &self,
        experiment_id: &ExperimentId,
        total_days: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RunId, ApplicationError> {
        Ok(self.insert_running(experiment_id, total_days, started_at).await?)
    }

    async fn save_completed(
        &self,
        run: &SimulationRun,
        rows: &[DailyResult],
    ) -> Result<(), ApplicationError> {
        Ok(self.insert_completed(run, rows).await?)
    }

    async fn mark_failed(
        &self,
        run_id: &RunId,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        Ok(self.set_failed(run_id, error_message, completed_at).await?)
    }

    async fn find(&self, run_id: &RunId) -> Result<Option<SimulationRun>, ApplicationError> {
        Ok(self.find_run(run_id).await?)
    }

    async fn list_results(&self, run_id: &RunId) -> Result<Vec<DailyResult>, ApplicationError> {
        Ok(self.results_for_run(run_id).await?)
    }
}

fn run_from_row(row: &SqliteRow) -> Result<SimulationRun, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = RunStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid run status: {status_raw}")))?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let control_revenue: String = row.try_get("control_revenue")?;
    let control_margin: String = row.try_get("control_margin")?;
    let test_revenue: String = row.try_get("test_revenue")?;
    let test_margin: String = row.try_get("test_margin")?;
    let revenue_lift_pct: Option<String> = row.try_get("revenue_lift_pct")?;

    Ok(SimulationRun {
        id: RunId(row.try_get("id")?),
        experiment_id: ExperimentId(row.try_get("experiment_id")?),
        status,
        started_at: parse_rfc3339("run started_at", &started_at)?,
        completed_at: completed_at
            .as_deref()
            .map(|ts| parse_rfc3339("run completed_at", ts))
            .transpose()?,
        error_message: row.try_get("error_message")?,
        total_days: row.try_get("total_days")?,
        totals: RunTotals {
            control_units: row.try_get("control_units")?,
            control_revenue: parse_decimal("run control_revenue", &control_revenue)?,
            control_margin: parse_decimal("run control_margin", &control_margin)?,
            test_units: row.try_get("test_units")?,
            test_revenue: parse_decimal("run test_revenue", &test_revenue)?,
            test_margin: parse_decimal("run test_margin", &test_margin)?,
        },
        revenue_lift_pct: revenue_lift_pct
            .as_deref()
            .map(|lift| parse_decimal("run revenue_lift_pct", lift))
            .transpose()?,
    })
}

fn daily_result_from_row(row: &SqliteRow) -> Result<DailyResult, RepositoryError> {
    let variant_raw: String = row.try_get("variant")?;
    let variant = Variant::parse(&variant_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid variant: {variant_raw}")))?;
    let date: String = row.try_get("date")?;
    let base_price: String = row.try_get("base_price")?;
    let simulated_price: String = row.try_get("simulated_price")?;
    let unit_cost: String = row.try_get("unit_cost")?;
    let revenue: String = row.try_get("revenue")?;
    let cost: String = row.try_get("cost")?;
    let margin: String = row.try_get("margin")?;
    let baseline_revenue: String = row.try_get("baseline_revenue")?;

    Ok(DailyResult {
        run_id: RunId(row.try_get("run_id")?),
        date: parse_date("result date", &date)?,
        store_id: StoreId(row.try_get("store_id")?),
        sku_id: SkuId(row.try_get("sku_id")?),
        variant,
        base_price: parse_decimal("result base_price", &base_price)?,
        simulated_price: parse_decimal("result simulated_price", &simulated_price)?,
        unit_cost: parse_decimal("result unit_cost", &unit_cost)?,
        units: row.try_get("units")?,
        revenue: parse_decimal("result revenue", &revenue)?,
        cost: parse_decimal("result cost", &cost)?,
        margin: parse_decimal("result margin", &margin)?,
        baseline_units: row.try_get("baseline_units")?,
        baseline_revenue: parse_decimal("result baseline_revenue", &baseline_revenue)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use pricelab_core::domain::experiment::{ExperimentId, SkuId, StoreId};
    use pricelab_core::domain::run::{RunStatus, RunTotals, SimulationRun, Variant};
    use pricelab_core::sim::projection::{project, ScopePricing, SimulationParams};

    use super::SqlSimulationRunStore;
    use crate::repositories::experiment::SqlExperimentStore;
    use crate::{connect_with_settings, migrations};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn money(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    async fn stores() -> (SqlExperimentStore, SqlSimulationRunStore) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        (SqlExperimentStore::new(pool.clone()), SqlSimulationRunStore::new(pool))
    }

    async fn insert_experiment(store: &SqlExperimentStore) -> ExperimentId {
        let experiment = pricelab_core::domain::experiment::Experiment::new(
            ExperimentId("exp-run-1".to_string()),
            "run fixture".to_string(),
            date(2026, 2, 1),
            date(2026, 2, 5),
        )
        .expect("valid window");
        store.save_experiment(&experiment).await.expect("save experiment");
        experiment.id
    }

    #[tokio::test]
    async fn completed_run_round_trips_totals_and_rows() {
        let (experiments, runs) = stores().await;
        let experiment_id = insert_experiment(&experiments).await;

        let started_at = Utc::now();
        let run_id = runs.insert_running(&experiment_id, 5, started_at).await.expect("create");

        let projection = project(
            &run_id,
            date(2026, 2, 1),
            date(2026, 2, 5),
            Decimal::from(10),
            &[ScopePricing {
                store_id: StoreId("store-1".to_string()),
                sku_id: SkuId("sku-cola".to_string()),
                base_price: money(10000),
                unit_cost: money(6000),
            }],
            &SimulationParams::default(),
        )
        .expect("projection");

        let run = SimulationRun {
            id: run_id.clone(),
            experiment_id: experiment_id.clone(),
            status: RunStatus::Completed,
            started_at,
            completed_at: Some(Utc::now()),
            error_message: None,
            total_days: 5,
            totals: projection.totals.clone(),
            revenue_lift_pct: projection.revenue_lift_pct,
        };
        runs.insert_completed(&run, &projection.rows).await.expect("complete");

        let loaded = runs.find_run(&run_id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, RunStatus::Completed);
        assert_eq!(loaded.totals, projection.totals);
        assert_eq!(loaded.revenue_lift_pct, Some(Decimal::new(35, 1)));
        assert!(loaded.completed_at.is_some());

        let rows = runs.results_for_run(&run_id).await.expect("results");
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].variant, Variant::Control);
        assert_eq!(rows[0].date, date(2026, 2, 1));
        let test_row = rows.iter().find(|row| row.variant == Variant::Test).expect("test row");
        assert_eq!(test_row.simulated_price, money(9000));
        assert_eq!(test_row.units, 115);
    }

    #[tokio::test]
    async fn failed_run_keeps_the_error_message() {
        let (experiments, runs) = stores().await;
        let experiment_id = insert_experiment(&experiments).await;

        let run_id =
            runs.insert_running(&experiment_id, 5, Utc::now()).await.expect("create");
        runs.set_failed(&run_id, "no reference price for SKU sku-cola", Utc::now())
            .await
            .expect("fail");

        let loaded = runs.find_run(&run_id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(
            loaded.error_message.as_deref(),
            Some("no reference price for SKU sku-cola")
        );
        assert_eq!(loaded.totals, RunTotals::default());
        assert!(runs.results_for_run(&run_id).await.expect("results").is_empty());
    }

    #[tokio::test]
    async fn running_run_has_no_completion_or_totals() {
        let (experiments, runs) = stores().await;
        let experiment_id = insert_experiment(&experiments).await;

        let run_id =
            runs.insert_running(&experiment_id, 5, Utc::now()).await.expect("create");

        let loaded = runs.find_run(&run_id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, RunStatus::Running);
        assert!(loaded.completed_at.is_none());
        assert!(loaded.error_message.is_none());
        assert_eq!(loaded.totals, RunTotals::default());
        assert_eq!(loaded.revenue_lift_pct, None);
    }
}
