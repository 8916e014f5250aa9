//! Read-side aggregation over persisted run results: run summaries,
//! per-date timeseries, per-store and per-SKU breakdowns, and the CSV
//! export. All grouping uses ordered maps so output order is stable
//! across invocations.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::{ExperimentId, SkuId, StoreId};
use crate::domain::run::{DailyResult, SimulationRun, Variant};
use crate::guardrails::round_pct;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantTotals {
    pub units: i64,
    pub revenue: Decimal,
    pub margin: Decimal,
}

impl VariantTotals {
    fn absorb(&mut self, row: &DailyResult) {
        self.units += row.units;
        self.revenue += row.revenue;
        self.margin += row.margin;
    }
}

/// CONTROL and TEST totals for one grouping key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPair {
    pub control: VariantTotals,
    pub test: VariantTotals,
}

impl VariantPair {
    fn absorb(&mut self, row: &DailyResult) {
        match row.variant {
            Variant::Control => self.control.absorb(row),
            Variant::Test => self.test.absorb(row),
        }
    }

    pub fn revenue_delta(&self) -> Decimal {
        self.test.revenue - self.control.revenue
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub experiment_id: String,
    pub status: String,
    pub total_days: i64,
    pub control: VariantTotals,
    pub test: VariantTotals,
    pub delta_units: i64,
    pub delta_revenue: Decimal,
    pub delta_margin: Decimal,
    pub revenue_lift_pct: Option<Decimal>,
    pub margin_lift_pct: Option<Decimal>,
}

pub fn summarize(run: &SimulationRun) -> RunSummary {
    let control = VariantTotals {
        units: run.totals.control_units,
        revenue: run.totals.control_revenue,
        margin: run.totals.control_margin,
    };
    let test = VariantTotals {
        units: run.totals.test_units,
        revenue: run.totals.test_revenue,
        margin: run.totals.test_margin,
    };
    let margin_lift_pct = if control.margin > Decimal::ZERO {
        Some(round_pct((test.margin - control.margin) / control.margin * Decimal::from(100)))
    } else {
        None
    };

    RunSummary {
        run_id: run.id.0.clone(),
        experiment_id: run.experiment_id.0.clone(),
        status: run.status.as_str().to_string(),
        total_days: run.total_days,
        delta_units: test.units - control.units,
        delta_revenue: test.revenue - control.revenue,
        delta_margin: test.margin - control.margin,
        revenue_lift_pct: run.revenue_lift_pct,
        margin_lift_pct,
        control,
        test,
    }
}

pub fn timeseries_by_date(rows: &[DailyResult]) -> BTreeMap<NaiveDate, VariantPair> {
    let mut series: BTreeMap<NaiveDate, VariantPair> = BTreeMap::new();
    for row in rows {
        series.entry(row.date).or_default().absorb(row);
    }
    series
}

pub fn breakdown_by_store(rows: &[DailyResult]) -> BTreeMap<StoreId, VariantPair> {
    let mut breakdown: BTreeMap<StoreId, VariantPair> = BTreeMap::new();
    for row in rows {
        breakdown.entry(row.store_id.clone()).or_default().absorb(row);
    }
    breakdown
}

pub fn breakdown_by_sku(rows: &[DailyResult]) -> BTreeMap<SkuId, VariantPair> {
    let mut breakdown: BTreeMap<SkuId, VariantPair> = BTreeMap::new();
    for row in rows {
        breakdown.entry(row.sku_id.clone()).or_default().absorb(row);
    }
    breakdown
}

pub const CSV_HEADER: &str =
    "runId,experimentId,date,storeId,skuId,variant,basePrice,price,unitCost,units,revenue,margin";

/// Renders result rows as CSV in stored order. Identifiers in this
/// system carry no commas or quotes, so no field escaping is applied.
pub fn to_csv(experiment_id: &ExperimentId, rows: &[DailyResult]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        // String's fmt::Write never fails.
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            row.run_id,
            experiment_id,
            row.date,
            row.store_id,
            row.sku_id,
            row.variant,
            row.base_price,
            row.simulated_price,
            row.unit_cost,
            row.units,
            row.revenue,
            row.margin
        );
    }
    out
}
