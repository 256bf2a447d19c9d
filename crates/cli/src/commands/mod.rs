pub mod backup;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod price;
pub mod save;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use poolcalc_core::config::{AppConfig, LoadOptions};
use poolcalc_core::notice::TracingNoticeSink;
use poolcalc_core::persistence::KeyValueStore;
use poolcalc_core::pricing::PriceOverrideTable;
use poolcalc_core::session::{EstimatorSession, SessionDeps, SessionSettings};
use poolcalc_core::sync::RemoteEstimateStore;
use poolcalc_db::{
    connect_storage, connect_with_settings, migrations, DbPool, SqlKeyValueStore,
    SqlProductSource, SqlRemoteEstimateStore,
};
use serde::Serialize;
use serde_json::Value;

pub(crate) const EXIT_CONFIG: u8 = 2;
pub(crate) const EXIT_RUNTIME: u8 = 3;
pub(crate) const EXIT_STORAGE: u8 = 4;
pub(crate) const EXIT_MIGRATION: u8 = 5;
pub(crate) const EXIT_INPUT: u8 = 6;
pub(crate) const EXIT_VALIDATION: u8 = 7;
pub(crate) const EXIT_REMOTE: u8 = 8;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Failure triple carried out of async blocks: `(error_class, message, exit_code)`.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) fn read_json_file(path: &Path) -> Result<Value, Failure> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| ("input", format!("could not read `{}`: {error}", path.display()), EXIT_INPUT))?;
    serde_json::from_str(&raw)
        .map_err(|error| ("input", format!("`{}` is not valid JSON: {error}", path.display()), EXIT_INPUT))
}

pub(crate) fn load_overrides(config: &AppConfig) -> Result<PriceOverrideTable, Failure> {
    match &config.engine.price_overrides_path {
        Some(path) => PriceOverrideTable::load(path)
            .map_err(|error| ("price_overrides", error.to_string(), EXIT_INPUT)),
        None => Ok(PriceOverrideTable::default()),
    }
}

/// A session wired to the local SQLite database and, when enabled, the shared
/// estimates table. Pending migrations are applied first.
pub(crate) struct OpenSession {
    pub session: EstimatorSession,
    pub pools: Vec<DbPool>,
}

impl OpenSession {
    pub async fn close(mut self) {
        self.session.flush_now().await;
        self.session.shutdown();
        for pool in self.pools {
            pool.close().await;
        }
    }
}

pub(crate) async fn open_session(config: &AppConfig) -> Result<OpenSession, Failure> {
    let overrides = load_overrides(config)?;

    let pool = connect_storage(&config.storage)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_STORAGE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    let mut pools = vec![pool.clone()];

    let products = SqlProductSource::new(pool.clone())
        .load_catalog()
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_STORAGE))?;
    let catalog = (!products.is_empty()).then_some(products);

    let remote: Option<Arc<dyn RemoteEstimateStore>> = if config.remote.enabled {
        let remote_pool = if config.remote_url() == config.storage.url {
            pool.clone()
        } else {
            let remote_pool = connect_with_settings(
                config.remote_url(),
                config.storage.max_connections,
                config.storage.timeout_secs,
            )
            .await
            .map_err(|error| ("remote_connectivity", error.to_string(), EXIT_REMOTE))?;
            migrations::run_pending(&remote_pool)
                .await
                .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
            pools.push(remote_pool.clone());
            remote_pool
        };
        Some(Arc::new(SqlRemoteEstimateStore::new(remote_pool)))
    } else {
        None
    };

    let storage: Arc<dyn KeyValueStore> = Arc::new(SqlKeyValueStore::new(pool));
    let session = EstimatorSession::open(
        SessionDeps { storage, remote, notices: Arc::new(TracingNoticeSink), overrides, catalog },
        SessionSettings::from(config),
    )
    .await;

    Ok(OpenSession { session, pools })
}
