use crate::commands::{app_error, build_runtime, load_config, CommandResult};
use pricelab_db::fixtures::SeedResult;
use pricelab_db::{connect, fixtures, migrations};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let seeded = fixtures::seed(&pool).await.map_err(app_error)?;
        pool.close().await;
        Ok::<SeedResult, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "seeded demo dataset: experiment {} (draft), {} stores, {} SKUs, {} price rows, {} cost rows",
                seeded.experiment_id, seeded.stores, seeded.skus, seeded.prices, seeded.costs
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
