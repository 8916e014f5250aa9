use chrono::NaiveDate;

use pricelab_core::domain::experiment::{ExperimentId, ExperimentStatus};
use pricelab_core::guardrails::LeverCheck;
use pricelab_core::workflow::ExperimentWorkflow;
use pricelab_db::{connect, SqlExperimentStore, SqlReferenceData};

use crate::commands::{app_error, build_runtime, load_config, CommandResult, TracingAuditSink};

pub fn submit(id: &str, validated_on: NaiveDate) -> CommandResult {
    let config = match load_config("experiment.submit") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("experiment.submit") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let workflow = ExperimentWorkflow::new(
            SqlExperimentStore::new(pool.clone()),
            SqlReferenceData::new(pool.clone()),
            TracingAuditSink,
        );
        let check = workflow
            .submit(&ExperimentId(id.to_string()), validated_on)
            .await
            .map_err(app_error)?;
        pool.close().await;
        Ok::<LeverCheck, (&'static str, String, u8)>(check)
    });

    match result {
        Ok(check) => CommandResult::success(
            "experiment.submit",
            format!(
                "experiment {id} submitted for approval: base price {}, lever price {}, change {}%",
                check.base_price, check.lever_price, check.change_pct
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("experiment.submit", error_class, message, exit_code)
        }
    }
}

pub fn approve(id: &str) -> CommandResult {
    decide("experiment.approve", id, true)
}

pub fn reject(id: &str) -> CommandResult {
    decide("experiment.reject", id, false)
}

fn decide(command: &'static str, id: &str, approve: bool) -> CommandResult {
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let workflow = ExperimentWorkflow::new(
            SqlExperimentStore::new(pool.clone()),
            SqlReferenceData::new(pool.clone()),
            TracingAuditSink,
        );
        let experiment_id = ExperimentId(id.to_string());
        let status = if approve {
            workflow.approve(&experiment_id).await
        } else {
            workflow.reject(&experiment_id).await
        }
        .map_err(app_error)?;
        pool.close().await;
        Ok::<ExperimentStatus, (&'static str, String, u8)>(status)
    });

    match result {
        Ok(status) => {
            CommandResult::success(command, format!("experiment {id} is now {}", status.label()))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
