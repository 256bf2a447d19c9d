use std::path::PathBuf;

use poolcalc_core::config::LoadOptions;
use poolcalc_core::domain::selection::Selection;
use serde_json::json;

use crate::commands::{build_runtime, load_config, open_session, read_json_file, CommandResult, Failure};

/// Prices either the given selection file or the persisted in-progress
/// selection. Nothing is written back.
pub fn run(options: LoadOptions, selection_path: Option<PathBuf>) -> CommandResult {
    let config = match load_config("price", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("price") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let selection = selection_path
            .as_deref()
            .map(read_json_file)
            .transpose()?
            .map(|value| Selection::from_value_lenient(&value));

        let mut opened = open_session(&config).await?;
        if let Some(selection) = selection {
            opened.session.replace_selection(selection);
        }
        let items = opened.session.items();
        let total = opened.session.total();

        // Read-only: drop the debounced write instead of flushing it.
        opened.session.shutdown();
        for pool in opened.pools {
            pool.close().await;
        }
        Ok::<_, Failure>((items, total))
    });

    match result {
        Ok((items, total)) => CommandResult::success_with(
            "price",
            format!("{} line(s), total {total}", items.len()),
            Some(json!({ "items": items, "total": total })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("price", error_class, message, exit_code)
        }
    }
}
