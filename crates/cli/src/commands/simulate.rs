use pricelab_core::domain::experiment::ExperimentId;
use pricelab_core::domain::run::SimulationRun;
use pricelab_core::sim::runner::SimulationRunner;
use pricelab_db::{connect, SqlExperimentStore, SqlReferenceData, SqlSimulationRunStore};

use crate::commands::{app_error, build_runtime, load_config, CommandResult, TracingAuditSink};

pub fn run(id: &str) -> CommandResult {
    let config = match load_config("simulate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("simulate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let params = config.simulation.params();

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let runner = SimulationRunner::new(
            SqlExperimentStore::new(pool.clone()),
            SqlReferenceData::new(pool.clone()),
            SqlSimulationRunStore::new(pool.clone()),
            TracingAuditSink,
            params,
        );
        let run = runner.run(&ExperimentId(id.to_string())).await.map_err(app_error)?;
        pool.close().await;
        Ok::<SimulationRun, (&'static str, String, u8)>(run)
    });

    match result {
        Ok(run) => {
            let lift = run
                .revenue_lift_pct
                .map(|pct| format!("{pct}%"))
                .unwrap_or_else(|| "n/a".to_string());
            CommandResult::success(
                "simulate",
                format!(
                    "run {} completed: {} days, control revenue {}, test revenue {}, revenue lift {lift}",
                    run.id, run.total_days, run.totals.control_revenue, run.totals.test_revenue
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("simulate", error_class, message, exit_code)
        }
    }
}
