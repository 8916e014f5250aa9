//! Deterministic demo dataset: two stores, three SKUs, date-ranged
//! reference prices and costs, and one ready-to-submit draft
//! experiment. Seeding clears previously seeded rows first, so it can
//! be re-run against the same database.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use pricelab_core::domain::experiment::{Experiment, ExperimentId, ScopeEntry, SkuId, StoreId};
use pricelab_core::domain::guardrail::GuardrailSet;
use pricelab_core::domain::lever::Lever;
use pricelab_core::domain::reference::{ReferenceCost, ReferencePrice};
use pricelab_core::errors::{ApplicationError, DomainError};

use crate::repositories::{SqlExperimentStore, SqlReferenceData};
use crate::DbPool;

pub const DEMO_EXPERIMENT_ID: &str = "exp-demo-cola";

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub experiment_id: ExperimentId,
    pub stores: usize,
    pub skus: usize,
    pub prices: usize,
    pub costs: usize,
}

struct PriceRow {
    sku: &'static str,
    store: &'static str,
    cents: i64,
    from: NaiveDate,
    until: Option<NaiveDate>,
}

struct CostRow {
    sku: &'static str,
    cents: i64,
    from: NaiveDate,
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    // Fixture dates are compile-time constants.
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn price_rows() -> Vec<PriceRow> {
    vec![
        // sku-cola: a January price raise at the downtown store.
        PriceRow {
            sku: "sku-cola",
            store: "store-downtown",
            cents: 9500,
            from: date(2025, 11, 1),
            until: Some(date(2025, 12, 31)),
        },
        PriceRow {
            sku: "sku-cola",
            store: "store-downtown",
            cents: 10000,
            from: date(2026, 1, 1),
            until: None,
        },
        PriceRow {
            sku: "sku-cola",
            store: "store-suburb",
            cents: 10500,
            from: date(2026, 1, 1),
            until: None,
        },
        PriceRow {
            sku: "sku-chips",
            store: "store-downtown",
            cents: 4500,
            from: date(2026, 1, 1),
            until: None,
        },
        PriceRow {
            sku: "sku-chips",
            store: "store-suburb",
            cents: 4750,
            from: date(2026, 1, 1),
            until: None,
        },
        PriceRow {
            sku: "sku-water",
            store: "store-downtown",
            cents: 2000,
            from: date(2026, 1, 1),
            until: None,
        },
        PriceRow {
            sku: "sku-water",
            store: "store-suburb",
            cents: 2000,
            from: date(2026, 1, 1),
            until: None,
        },
    ]
}

fn cost_rows() -> Vec<CostRow> {
    vec![
        CostRow { sku: "sku-cola", cents: 6000, from: date(2026, 1, 1) },
        CostRow { sku: "sku-chips", cents: 2500, from: date(2026, 1, 1) },
        CostRow { sku: "sku-water", cents: 800, from: date(2026, 1, 1) },
    ]
}

pub async fn seed(pool: &DbPool) -> Result<SeedResult, ApplicationError> {
    clear_seeded_rows(pool).await?;

    let reference = SqlReferenceData::new(pool.clone());
    let prices = price_rows();
    for row in &prices {
        reference
            .insert_price(&ReferencePrice {
                sku_id: SkuId(row.sku.to_string()),
                store_id: StoreId(row.store.to_string()),
                price: Decimal::new(row.cents, 2),
                effective_from: row.from,
                effective_until: row.until,
            })
            .await?;
    }
    let costs = cost_rows();
    for row in &costs {
        reference
            .insert_cost(&ReferenceCost {
                sku_id: SkuId(row.sku.to_string()),
                cost: Decimal::new(row.cents, 2),
                effective_from: row.from,
                effective_until: None,
            })
            .await?;
    }

    let experiment = demo_experiment()?;
    SqlExperimentStore::new(pool.clone()).save_experiment(&experiment).await?;

    Ok(SeedResult {
        experiment_id: experiment.id,
        stores: 2,
        skus: 3,
        prices: prices.len(),
        costs: costs.len(),
    })
}

fn demo_experiment() -> Result<Experiment, DomainError> {
    let mut experiment = Experiment::new(
        ExperimentId(DEMO_EXPERIMENT_ID.to_string()),
        "cola winter discount".to_string(),
        date(2026, 2, 1),
        date(2026, 2, 14),
    )?;
    experiment.add_scope_entry(ScopeEntry {
        store_id: StoreId("store-downtown".to_string()),
        sku_id: SkuId("sku-cola".to_string()),
        is_test_group: true,
    })?;
    experiment.add_scope_entry(ScopeEntry {
        store_id: StoreId("store-suburb".to_string()),
        sku_id: SkuId("sku-cola".to_string()),
        is_test_group: true,
    })?;
    experiment.set_lever(Lever::price_discount(
        SkuId("sku-cola".to_string()),
        Decimal::from(10),
    )?)?;
    experiment.set_guardrails(GuardrailSet::new(
        Decimal::new(8000, 2),
        Decimal::new(12000, 2),
        Decimal::from(20),
    ))?;
    Ok(experiment)
}

async fn clear_seeded_rows(pool: &DbPool) -> Result<(), ApplicationError> {
    let statements = [
        "DELETE FROM simulation_daily_result WHERE run_id IN
             (SELECT id FROM simulation_run WHERE experiment_id = 'exp-demo-cola')",
        "DELETE FROM simulation_run WHERE experiment_id = 'exp-demo-cola'",
        "DELETE FROM experiment_guardrail WHERE experiment_id = 'exp-demo-cola'",
        "DELETE FROM experiment_lever WHERE experiment_id = 'exp-demo-cola'",
        "DELETE FROM experiment_scope WHERE experiment_id = 'exp-demo-cola'",
        "DELETE FROM experiment WHERE id = 'exp-demo-cola'",
        "DELETE FROM reference_price",
        "DELETE FROM reference_cost",
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|err| ApplicationError::Persistence(err.to_string()))?;
    }
    Ok(())
}
