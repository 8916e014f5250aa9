use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::Row;

use pricelab_core::domain::experiment::{SkuId, StoreId};
use pricelab_core::domain::reference::{ReferenceCost, ReferencePrice};
use pricelab_core::errors::ApplicationError;
use pricelab_core::storage::ReferenceDataProvider;

use super::{parse_decimal, RepositoryError};
use crate::DbPool;

/// Effective-dating predicate shared by every lookup: a record applies
/// on a date when `effective_from <= date` and `effective_until` is
/// NULL or `>= date`. Dates are stored as ISO-8601 text, so string
/// comparison matches date comparison.
const EFFECTIVE_ON: &str = "effective_from <= ? AND (effective_until IS NULL OR effective_until >= ?)";

#[derive(Clone)]
pub struct SqlReferenceData {
    pool: DbPool,
}

impl SqlReferenceData {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_price(&self, price: &ReferencePrice) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reference_price (sku_id, store_id, price, effective_from, effective_until)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&price.sku_id.0)
        .bind(&price.store_id.0)
        .bind(price.price.to_string())
        .bind(price.effective_from.to_string())
        .bind(price.effective_until.map(|until| until.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_cost(&self, cost: &ReferenceCost) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reference_cost (sku_id, cost, effective_from, effective_until)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&cost.sku_id.0)
        .bind(cost.cost.to_string())
        .bind(cost.effective_from.to_string())
        .bind(cost.effective_until.map(|until| until.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceDataProvider for SqlReferenceData {
    async fn effective_price(
        &self,
        sku_id: &SkuId,
        store_id: &StoreId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError> {
        let query = format!(
            "SELECT price FROM reference_price
             WHERE sku_id = ? AND store_id = ? AND {EFFECTIVE_ON}
             ORDER BY effective_from DESC
             LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(&sku_id.0)
            .bind(&store_id.0)
            .bind(on.to_string())
            .bind(on.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(|row| {
            let raw: String = row.try_get("price").map_err(RepositoryError::from)?;
            Ok(parse_decimal("reference price", &raw)?)
        })
        .transpose()
    }

    async fn effective_cost(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Option<Decimal>, ApplicationError> {
        let query = format!(
            "SELECT cost FROM reference_cost
             WHERE sku_id = ? AND {EFFECTIVE_ON}
             ORDER BY effective_from DESC
             LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(&sku_id.0)
            .bind(on.to_string())
            .bind(on.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(|row| {
            let raw: String = row.try_get("cost").map_err(RepositoryError::from)?;
            Ok(parse_decimal("reference cost", &raw)?)
        })
        .transpose()
    }

    async fn all_effective_prices(
        &self,
        sku_id: &SkuId,
        on: NaiveDate,
    ) -> Result<Vec<Decimal>, ApplicationError> {
        let query = format!(
            "SELECT price FROM reference_price
             WHERE sku_id = ? AND {EFFECTIVE_ON}
             ORDER BY store_id"
        );
        let rows = sqlx::query(&query)
            .bind(&sku_id.0)
            .bind(on.to_string())
            .bind(on.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.try_get("price").map_err(RepositoryError::from)?;
                Ok(parse_decimal("reference price", &raw)?)
            })
            .collect()
    }
}
