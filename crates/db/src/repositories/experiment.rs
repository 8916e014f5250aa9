use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use pricelab_core::domain::experiment::{
    Experiment, ExperimentId, ExperimentStatus, ScopeEntry, SkuId, StoreId,
};
use pricelab_core::domain::guardrail::GuardrailSet;
use pricelab_core::domain::lever::{Lever, LeverKind};
use pricelab_core::errors::ApplicationError;
use pricelab_core::storage::ExperimentStore;

use super::{parse_date, parse_decimal, parse_rfc3339, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlExperimentStore {
    pool: DbPool,
}

impl SqlExperimentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts the experiment row together with its scope, lever, and
    /// guardrail children in one transaction.
    pub async fn save_experiment(&self, experiment: &Experiment) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO experiment (id, name, status, start_date, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
        )
        .bind(&experiment.id.0)
        .bind(&experiment.name)
        .bind(experiment.status.as_str())
        .bind(experiment.start_date.to_string())
        .bind(experiment.end_date.to_string())
        .bind(experiment.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM experiment_scope WHERE experiment_id = ?")
            .bind(&experiment.id.0)
            .execute(&mut *tx)
            .await?;
        for entry in &experiment.scope {
            sqlx::query(
                "INSERT INTO experiment_scope (experiment_id, store_id, sku_id, is_test_group)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&experiment.id.0)
            .bind(&entry.store_id.0)
            .bind(&entry.sku_id.0)
            .bind(if entry.is_test_group { 1 } else { 0 })
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM experiment_lever WHERE experiment_id = ?")
            .bind(&experiment.id.0)
            .execute(&mut *tx)
            .await?;
        if let Some(lever) = &experiment.lever {
            let LeverKind::PriceDiscount { discount_pct } = &lever.kind;
            sqlx::query(
                "INSERT INTO experiment_lever (experiment_id, sku_id, kind, discount_pct)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&experiment.id.0)
            .bind(&lever.sku_id.0)
            .bind(lever.kind.as_str())
            .bind(discount_pct.to_string())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM experiment_guardrail WHERE experiment_id = ?")
            .bind(&experiment.id.0)
            .execute(&mut *tx)
            .await?;
        if let Some(guardrails) = &experiment.guardrails {
            sqlx::query(
                "INSERT INTO experiment_guardrail
                     (experiment_id, price_floor, price_ceiling, max_change_pct)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&experiment.id.0)
            .bind(guardrails.price_floor.to_string())
            .bind(guardrails.price_ceiling.to_string())
            .bind(guardrails.max_change_pct.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_experiment(
        &self,
        id: &ExperimentId,
    ) -> Result<Option<Experiment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, status, start_date, end_date, created_at
             FROM experiment WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut experiment = experiment_from_row(&row)?;

        let scope_rows = sqlx::query(
            "SELECT store_id, sku_id, is_test_group
             FROM experiment_scope
             WHERE experiment_id = ?
             ORDER BY store_id, sku_id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        for scope_row in &scope_rows {
            experiment.scope.push(scope_entry_from_row(scope_row)?);
        }

        let lever_row = sqlx::query(
            "SELECT sku_id, kind, discount_pct FROM experiment_lever WHERE experiment_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(lever_row) = lever_row {
            experiment.lever = Some(lever_from_row(&lever_row)?);
        }

        let guardrail_row = sqlx::query(
            "SELECT price_floor, price_ceiling, max_change_pct
             FROM experiment_guardrail WHERE experiment_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(guardrail_row) = guardrail_row {
            experiment.guardrails = Some(guardrails_from_row(&guardrail_row)?);
        }

        Ok(Some(experiment))
    }

    /// Compare-and-set on the stored status column. One row changes
    /// when and only when the stored status still matches `from`.
    pub async fn compare_and_set_status(
        &self,
        id: &ExperimentId,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE experiment SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(&id.0)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ExperimentStore for SqlExperimentStore {
    async fn find(&self, id: &ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        Ok(self.find_experiment(id).await?)
    }

    async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        Ok(self.save_experiment(experiment).await?)
    }

    async fn transition_status(
        &self,
        id: &ExperimentId,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<bool, ApplicationError> {
        Ok(self.compare_and_set_status(id, from, to).await?)
    }
}

fn experiment_from_row(row: &SqliteRow) -> Result<Experiment, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = ExperimentStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid experiment status: {status_raw}"))
    })?;
    let start_date: String = row.try_get("start_date")?;
    let end_date: String = row.try_get("end_date")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Experiment {
        id: ExperimentId(row.try_get("id")?),
        name: row.try_get("name")?,
        status,
        start_date: parse_date("experiment start_date", &start_date)?,
        end_date: parse_date("experiment end_date", &end_date)?,
        scope: Vec::new(),
        lever: None,
        guardrails: None,
        created_at: parse_rfc3339("experiment created_at", &created_at)?,
    })
}

fn scope_entry_from_row(row: &SqliteRow) -> Result<ScopeEntry, RepositoryError> {
    let is_test_group = match row.try_get::<i64, _>("is_test_group")? {
        0 => false,
        1 => true,
        raw => {
            return Err(RepositoryError::Decode(format!("invalid is_test_group flag: {raw}")));
        }
    };
    Ok(ScopeEntry {
        store_id: StoreId(row.try_get("store_id")?),
        sku_id: SkuId(row.try_get("sku_id")?),
        is_test_group,
    })
}

fn lever_from_row(row: &SqliteRow) -> Result<Lever, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    let discount_raw: String = row.try_get("discount_pct")?;
    let discount_pct = parse_decimal("lever discount_pct", &discount_raw)?;
    Lever::from_parts(&kind, SkuId(row.try_get("sku_id")?), discount_pct)
        .map_err(|err| RepositoryError::Decode(format!("invalid stored lever: {err}")))
}

fn guardrails_from_row(row: &SqliteRow) -> Result<GuardrailSet, RepositoryError> {
    let floor_raw: String = row.try_get("price_floor")?;
    let ceiling_raw: String = row.try_get("price_ceiling")?;
    let max_change_raw: String = row.try_get("max_change_pct")?;
    Ok(GuardrailSet::new(
        parse_decimal("guardrail price_floor", &floor_raw)?,
        parse_decimal("guardrail price_ceiling", &ceiling_raw)?,
        parse_decimal("guardrail max_change_pct", &max_change_raw)?,
    ))
}
