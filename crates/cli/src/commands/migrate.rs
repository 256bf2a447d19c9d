use crate::commands::{build_runtime, load_config, CommandResult, Failure, EXIT_MIGRATION, EXIT_STORAGE};
use poolcalc_core::config::LoadOptions;
use poolcalc_db::{connect_storage, migrations};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_storage(&config.storage)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_STORAGE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
