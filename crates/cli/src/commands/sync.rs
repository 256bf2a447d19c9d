use poolcalc_core::config::LoadOptions;
use serde_json::json;

use crate::commands::{build_runtime, load_config, open_session, CommandResult, EXIT_REMOTE};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("sync", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    if !config.remote.enabled {
        return CommandResult::failure(
            "sync",
            "remote_disabled",
            "remote sync is disabled (set remote.enabled or POOLCALC_REMOTE_ENABLED)",
            EXIT_REMOTE,
        );
    }
    let runtime = match build_runtime("sync") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let mut opened = open_session(&config).await?;
        let synced = opened.session.sync_now().await;
        opened.close().await;
        synced.map_err(|error| ("remote", error.to_string(), EXIT_REMOTE))
    });

    match result {
        Ok(count) => CommandResult::success_with(
            "sync",
            format!("local list holds {count} estimate(s) after merge"),
            Some(json!({ "estimates": count })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sync", error_class, message, exit_code)
        }
    }
}
