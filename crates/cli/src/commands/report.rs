use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use rust_decimal::Decimal;

use pricelab_core::domain::run::{DailyResult, RunId, SimulationRun};
use pricelab_core::results::{
    breakdown_by_sku, breakdown_by_store, summarize, timeseries_by_date, RunSummary, VariantPair,
};
use pricelab_core::storage::SimulationRunStore;
use pricelab_db::{connect, SqlSimulationRunStore};

use crate::commands::{app_error, build_runtime, load_config, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dimension {
    Date,
    Store,
    Sku,
}

pub fn run(run_id: &str, by: Option<Dimension>) -> CommandResult {
    let config = match load_config("report") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("report") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let runs = SqlSimulationRunStore::new(pool.clone());
        let run = runs
            .find(&RunId(run_id.to_string()))
            .await
            .map_err(app_error)?
            .ok_or_else(|| ("not_found", format!("no simulation run {run_id}"), 6u8))?;
        let rows = match by {
            Some(_) => runs.list_results(&run.id).await.map_err(app_error)?,
            None => Vec::new(),
        };
        pool.close().await;
        Ok::<(SimulationRun, Vec<DailyResult>), (&'static str, String, u8)>((run, rows))
    });

    match result {
        Ok((run, rows)) => {
            let summary = summarize(&run);
            let mut lines = render_summary(&summary, run.error_message.as_deref());
            match by {
                Some(Dimension::Date) => push_pairs(&mut lines, "by date", timeseries_by_date(&rows)),
                Some(Dimension::Store) => {
                    push_pairs(&mut lines, "by store", breakdown_by_store(&rows))
                }
                Some(Dimension::Sku) => push_pairs(&mut lines, "by sku", breakdown_by_sku(&rows)),
                None => {}
            }
            CommandResult::success("report", lines.join("\n"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("report", error_class, message, exit_code)
        }
    }
}

fn render_summary(summary: &RunSummary, error_message: Option<&str>) -> Vec<String> {
    let mut lines = vec![format!(
        "run {} (experiment {}) status {}",
        summary.run_id, summary.experiment_id, summary.status
    )];
    if let Some(message) = error_message {
        lines.push(format!("- error: {message}"));
    }
    lines.push(format!("- days: {}", summary.total_days));
    lines.push(format!(
        "- control: {} units, revenue {}, margin {}",
        summary.control.units, summary.control.revenue, summary.control.margin
    ));
    lines.push(format!(
        "- test: {} units, revenue {}, margin {}",
        summary.test.units, summary.test.revenue, summary.test.margin
    ));
    lines.push(format!(
        "- delta: {} units, revenue {}, margin {}",
        summary.delta_units, summary.delta_revenue, summary.delta_margin
    ));
    lines.push(format!("- revenue lift: {}", pct(summary.revenue_lift_pct)));
    lines.push(format!("- margin lift: {}", pct(summary.margin_lift_pct)));
    lines
}

fn pct(value: Option<Decimal>) -> String {
    value.map(|pct| format!("{pct}%")).unwrap_or_else(|| "n/a".to_string())
}

fn push_pairs<K: fmt::Display>(
    lines: &mut Vec<String>,
    heading: &str,
    pairs: BTreeMap<K, VariantPair>,
) {
    lines.push(format!("{heading}:"));
    for (key, pair) in pairs {
        lines.push(format!(
            "  - {key}: control revenue {}, test revenue {}, delta {}",
            pair.control.revenue,
            pair.test.revenue,
            pair.revenue_delta()
        ));
    }
}
