use std::fs;
use std::path::Path;

use pricelab_core::domain::run::{DailyResult, RunId, SimulationRun};
use pricelab_core::results::to_csv;
use pricelab_core::storage::SimulationRunStore;
use pricelab_db::{connect, SqlSimulationRunStore};

use crate::commands::{app_error, build_runtime, load_config, CommandResult};

pub fn run(run_id: &str, output: Option<&Path>) -> CommandResult {
    let config = match load_config("export") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("export") {
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
        let rows = runs.list_results(&run.id).await.map_err(app_error)?;
        pool.close().await;
        Ok::<(SimulationRun, Vec<DailyResult>), (&'static str, String, u8)>((run, rows))
    });

    match result {
        Ok((run, rows)) => {
            let csv = to_csv(&run.experiment_id, &rows);
            match output {
                Some(path) => match fs::write(path, &csv) {
                    Ok(()) => CommandResult::success(
                        "export",
                        format!("wrote {} result rows to {}", rows.len(), path.display()),
                    ),
                    Err(error) => CommandResult::failure(
                        "export",
                        "io",
                        format!("failed to write {}: {error}", path.display()),
                        7,
                    ),
                },
                // Raw CSV on stdout when no output path is given.
                None => CommandResult { exit_code: 0, output: csv },
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("export", error_class, message, exit_code)
        }
    }
}
