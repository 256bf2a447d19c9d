use std::path::{Path, PathBuf};

use poolcalc_core::config::LoadOptions;
use poolcalc_core::session::SessionError;
use serde_json::json;

use crate::commands::{build_runtime, load_config, open_session, CommandResult, Failure, EXIT_INPUT};

const EXIT_BACKUP: u8 = 9;

pub fn export(options: LoadOptions, output: PathBuf) -> CommandResult {
    let config = match load_config("backup-export", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("backup-export") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let mut opened = open_session(&config).await?;
        let document = opened.session.export_backup();
        opened.close().await;

        let raw = document.to_json_pretty().map_err(|error| ("backup", error.to_string(), EXIT_BACKUP))?;
        write_file(&output, &raw)?;
        Ok::<_, Failure>((document.estimates.len(), document.templates.len()))
    });

    match result {
        Ok((estimates, templates)) => CommandResult::success_with(
            "backup-export",
            format!("wrote backup to `{}`", output.display()),
            Some(json!({ "estimates": estimates, "templates": templates })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("backup-export", error_class, message, exit_code)
        }
    }
}

pub fn import(options: LoadOptions, input: PathBuf) -> CommandResult {
    let config = match load_config("backup-import", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let raw = match std::fs::read_to_string(&input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "backup-import",
                "input",
                format!("could not read `{}`: {error}", input.display()),
                EXIT_INPUT,
            );
        }
    };
    let runtime = match build_runtime("backup-import") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let mut opened = open_session(&config).await?;
        let imported = opened.session.import_backup(&raw).await;
        opened.close().await;
        imported.map_err(|error| match error {
            SessionError::Backup(error) => ("backup_rejected", error.to_string(), EXIT_BACKUP),
            other => ("backup", other.to_string(), EXIT_BACKUP),
        })
    });

    match result {
        Ok(summary) => CommandResult::success_with(
            "backup-import",
            format!("imported {} estimate(s)", summary.estimates),
            Some(json!({
                "estimates": summary.estimates,
                "templates": summary.templates,
                "catalog_items": summary.catalog_items,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("backup-import", error_class, message, exit_code)
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), Failure> {
    std::fs::write(path, contents)
        .map_err(|error| ("output", format!("could not write `{}`: {error}", path.display()), EXIT_INPUT))
}
