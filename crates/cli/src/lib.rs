pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use poolcalc_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "poolcalc",
    about = "Pool estimate operator CLI",
    long_about = "Price pool configurations, save estimates, sync them with the shared store, and manage backups.",
    after_help = "Examples:\n  poolcalc migrate\n  poolcalc price --selection pool.json\n  poolcalc save --name \"Дача\" --selection pool.json\n  poolcalc doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to poolcalc.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override storage.url")]
    storage_url: Option<String>,
    #[arg(long, global = true, help = "Override remote.author")]
    author: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, price overrides, and storage/remote connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Derive estimate lines and total for a selection")]
    Price {
        #[arg(long, help = "Selection JSON file; defaults to the persisted in-progress selection")]
        selection: Option<PathBuf>,
    },
    #[command(about = "Save the current (or given) selection as a named estimate")]
    Save {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Selection JSON file to save instead of the persisted one")]
        selection: Option<PathBuf>,
    },
    #[command(about = "Pull remote estimates and merge them into the local list")]
    Sync,
    #[command(about = "Write a full backup document")]
    BackupExport {
        #[arg(long)]
        output: PathBuf,
    },
    #[command(about = "Replace local lists with a backup document")]
    BackupImport {
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                storage_url: self.storage_url.clone(),
                author: self.author.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);

    // try_init: a subscriber may already be installed when embedded.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(options, json) }
        }
        Command::Price { selection } => commands::price::run(options, selection),
        Command::Save { name, selection } => commands::save::run(options, &name, selection),
        Command::Sync => commands::sync::run(options),
        Command::BackupExport { output } => commands::backup::export(options, output),
        Command::BackupImport { input } => commands::backup::import(options, input),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
