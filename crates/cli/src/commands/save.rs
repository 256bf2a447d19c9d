use std::path::PathBuf;

use poolcalc_core::config::LoadOptions;
use poolcalc_core::domain::selection::Selection;
use poolcalc_core::session::SessionError;
use serde_json::json;

use crate::commands::{
    build_runtime, load_config, open_session, read_json_file, CommandResult, Failure,
    EXIT_VALIDATION,
};

pub fn run(options: LoadOptions, name: &str, selection_path: Option<PathBuf>) -> CommandResult {
    let config = match load_config("save", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("save") {
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
        let saved = opened.session.save_estimate(name).await;
        opened.close().await;

        saved.map_err(|error| match error {
            SessionError::Domain(error) => ("validation", error.to_string(), EXIT_VALIDATION),
            other => ("save", other.to_string(), EXIT_VALIDATION),
        })
    });

    match result {
        Ok(receipt) => CommandResult::success_with(
            "save",
            format!("saved estimate `{}`", receipt.estimate.name),
            Some(json!({
                "id": receipt.estimate.id.0,
                "total": receipt.estimate.total,
                "items": receipt.estimate.items.len(),
                "sync": format!("{:?}", receipt.sync).to_lowercase(),
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("save", error_class, message, exit_code)
        }
    }
}
