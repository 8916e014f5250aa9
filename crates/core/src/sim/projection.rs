//! Pure projection math. Given resolved per-scope pricing and the
//! injected demand parameters, produces every daily CONTROL/TEST row
//! plus the run-level totals. No I/O, no clock reads: two calls with
//! the same inputs produce identical values, which is the property the
//! engine's determinism guarantee rests on.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::{SkuId, StoreId};
use crate::domain::run::{DailyResult, RunId, RunTotals, Variant};
use crate::errors::DomainError;
use crate::guardrails::{round_money, round_pct};

/// Demand-model constants, injected so tests can vary them without
/// touching the projection logic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Converts a price-change fraction into a unit-demand-change
    /// fraction: a 10% price cut with factor 1.5 yields a 15% unit
    /// increase. Linear and unclamped, so extreme discounts imply
    /// extreme unit projections.
    pub elasticity_factor: Decimal,
    pub baseline_daily_units: i64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self { elasticity_factor: Decimal::new(15, 1), baseline_daily_units: 100 }
    }
}

/// Reference pricing resolved for one scope entry as of the experiment
/// start date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePricing {
    pub store_id: StoreId,
    pub sku_id: SkuId,
    pub base_price: Decimal,
    pub unit_cost: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    pub rows: Vec<DailyResult>,
    pub totals: RunTotals,
    pub revenue_lift_pct: Option<Decimal>,
}

pub fn project(
    run_id: &RunId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    discount_pct: Decimal,
    pricing: &[ScopePricing],
    params: &SimulationParams,
) -> Result<Projection, DomainError> {
    let total_days = (end_date - start_date).num_days() + 1;
    let mut rows = Vec::with_capacity((total_days as usize) * pricing.len() * 2);
    let mut totals = RunTotals::default();
    let baseline_units = params.baseline_daily_units;
    let baseline_decimal = Decimal::from(baseline_units);

    for entry in pricing {
        let base_price = entry.base_price;
        let test_price =
            round_money(base_price * (Decimal::ONE - discount_pct / Decimal::from(100)));
        let change_fraction = round_pct((base_price - test_price) / base_price);
        let units_multiplier = Decimal::ONE + change_fraction * params.elasticity_factor;
        let test_units = (baseline_decimal * units_multiplier)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "projected unit count overflows for ({}, {})",
                    entry.store_id, entry.sku_id
                ))
            })?;

        let control_revenue = round_money(base_price * baseline_decimal);
        let control_cost = round_money(entry.unit_cost * baseline_decimal);
        let test_revenue = round_money(test_price * Decimal::from(test_units));
        let test_cost = round_money(entry.unit_cost * Decimal::from(test_units));

        for date in start_date.iter_days().take(total_days as usize) {
            rows.push(DailyResult {
                run_id: run_id.clone(),
                date,
                store_id: entry.store_id.clone(),
                sku_id: entry.sku_id.clone(),
                variant: Variant::Control,
                base_price,
                simulated_price: base_price,
                unit_cost: entry.unit_cost,
                units: baseline_units,
                revenue: control_revenue,
                cost: control_cost,
                margin: control_revenue - control_cost,
                baseline_units,
                baseline_revenue: control_revenue,
            });
            rows.push(DailyResult {
                run_id: run_id.clone(),
                date,
                store_id: entry.store_id.clone(),
                sku_id: entry.sku_id.clone(),
                variant: Variant::Test,
                base_price,
                simulated_price: test_price,
                unit_cost: entry.unit_cost,
                units: test_units,
                revenue: test_revenue,
                cost: test_cost,
                margin: test_revenue - test_cost,
                baseline_units,
                baseline_revenue: control_revenue,
            });

            totals.control_units += baseline_units;
            totals.control_revenue += control_revenue;
            totals.control_margin += control_revenue - control_cost;
            totals.test_units += test_units;
            totals.test_revenue += test_revenue;
            totals.test_margin += test_revenue - test_cost;
        }
    }

    let revenue_lift_pct = if totals.control_revenue > Decimal::ZERO {
        Some(round_pct(
            (totals.test_revenue - totals.control_revenue) / totals.control_revenue
                * Decimal::from(100),
        ))
    } else {
        None
    };

    Ok(Projection { rows, totals, revenue_lift_pct })
}
