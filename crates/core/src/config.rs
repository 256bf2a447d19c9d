use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Local durable storage (the key-value mirror of browser storage).
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// Remote estimates store; falls back to the storage database when unset.
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub author: Option<String>,
    pub pull_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub history_cap: usize,
    pub debounce_ms: u64,
    pub autosave_secs: u64,
    pub estimates_cap: usize,
    pub ledger_cap: usize,
    pub price_overrides_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }
}

impl RemoteConfig {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub storage_url: Option<String>,
    pub remote_enabled: Option<bool>,
    pub remote_url: Option<String>,
    pub author: Option<String>,
    pub price_overrides_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                url: "sqlite://poolcalc.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            remote: RemoteConfig {
                enabled: false,
                url: None,
                api_key: None,
                author: None,
                pull_interval_secs: 60,
            },
            engine: EngineConfig {
                history_cap: 20,
                debounce_ms: 1000,
                autosave_secs: 30,
                estimates_cap: 1000,
                ledger_cap: 1000,
                price_overrides_path: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("poolcalc.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// URL of the remote estimates store, defaulting to local storage.
    pub fn remote_url(&self) -> &str {
        self.remote.url.as_deref().unwrap_or(&self.storage.url)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(url) = storage.url {
                self.storage.url = url;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(remote) = patch.remote {
            if let Some(enabled) = remote.enabled {
                self.remote.enabled = enabled;
            }
            if let Some(url) = remote.url {
                self.remote.url = Some(url);
            }
            if let Some(api_key) = remote.api_key {
                self.remote.api_key = Some(api_key.into());
            }
            if let Some(author) = remote.author {
                self.remote.author = Some(author);
            }
            if let Some(pull_interval_secs) = remote.pull_interval_secs {
                self.remote.pull_interval_secs = pull_interval_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(history_cap) = engine.history_cap {
                self.engine.history_cap = history_cap;
            }
            if let Some(debounce_ms) = engine.debounce_ms {
                self.engine.debounce_ms = debounce_ms;
            }
            if let Some(autosave_secs) = engine.autosave_secs {
                self.engine.autosave_secs = autosave_secs;
            }
            if let Some(estimates_cap) = engine.estimates_cap {
                self.engine.estimates_cap = estimates_cap;
            }
            if let Some(ledger_cap) = engine.ledger_cap {
                self.engine.ledger_cap = ledger_cap;
            }
            if let Some(path) = engine.price_overrides_path {
                self.engine.price_overrides_path = Some(path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("POOLCALC_STORAGE_URL") {
            self.storage.url = value;
        }
        if let Some(value) = read_env("POOLCALC_STORAGE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_u32("POOLCALC_STORAGE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("POOLCALC_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("POOLCALC_REMOTE_ENABLED") {
            self.remote.enabled = parse_bool("POOLCALC_REMOTE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_REMOTE_URL") {
            self.remote.url = Some(value);
        }
        if let Some(value) = read_env("POOLCALC_REMOTE_API_KEY") {
            self.remote.api_key = Some(value.into());
        }
        if let Some(value) = read_env("POOLCALC_REMOTE_AUTHOR") {
            self.remote.author = Some(value);
        }
        if let Some(value) = read_env("POOLCALC_REMOTE_PULL_INTERVAL_SECS") {
            self.remote.pull_interval_secs =
                parse_u64("POOLCALC_REMOTE_PULL_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("POOLCALC_ENGINE_HISTORY_CAP") {
            self.engine.history_cap = parse_usize("POOLCALC_ENGINE_HISTORY_CAP", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_ENGINE_DEBOUNCE_MS") {
            self.engine.debounce_ms = parse_u64("POOLCALC_ENGINE_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_ENGINE_AUTOSAVE_SECS") {
            self.engine.autosave_secs = parse_u64("POOLCALC_ENGINE_AUTOSAVE_SECS", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_ENGINE_ESTIMATES_CAP") {
            self.engine.estimates_cap = parse_usize("POOLCALC_ENGINE_ESTIMATES_CAP", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_ENGINE_LEDGER_CAP") {
            self.engine.ledger_cap = parse_usize("POOLCALC_ENGINE_LEDGER_CAP", &value)?;
        }
        if let Some(value) = read_env("POOLCALC_ENGINE_PRICE_OVERRIDES") {
            self.engine.price_overrides_path = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("POOLCALC_LOGGING_LEVEL").or_else(|| read_env("POOLCALC_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("POOLCALC_LOGGING_FORMAT").or_else(|| read_env("POOLCALC_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(storage_url) = overrides.storage_url {
            self.storage.url = storage_url;
        }
        if let Some(enabled) = overrides.remote_enabled {
            self.remote.enabled = enabled;
        }
        if let Some(remote_url) = overrides.remote_url {
            self.remote.url = Some(remote_url);
        }
        if let Some(author) = overrides.author {
            self.remote.author = Some(author);
        }
        if let Some(path) = overrides.price_overrides_path {
            self.engine.price_overrides_path = Some(path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_remote(&self.remote)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("poolcalc.toml"), PathBuf::from("config/poolcalc.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_sqlite_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:"
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if !is_sqlite_url(&storage.url) {
        return Err(ConfigError::Validation(
            "storage.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    if storage.timeout_secs == 0 || storage.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_remote(remote: &RemoteConfig) -> Result<(), ConfigError> {
    if let Some(url) = &remote.url {
        if !is_sqlite_url(url) {
            return Err(ConfigError::Validation(
                "remote.url must be a sqlite URL; leave it unset to share the storage database"
                    .to_string(),
            ));
        }
    }

    if remote.api_key.is_some() && !remote.has_api_key() {
        return Err(ConfigError::Validation(
            "remote.api_key is set but blank; remove it or provide a key".to_string(),
        ));
    }

    if remote.enabled && remote.pull_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "remote.pull_interval_secs must be greater than zero when remote sync is enabled"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.history_cap == 0 || engine.history_cap > 500 {
        return Err(ConfigError::Validation(
            "engine.history_cap must be in range 1..=500".to_string(),
        ));
    }

    if engine.debounce_ms == 0 || engine.debounce_ms > 60_000 {
        return Err(ConfigError::Validation(
            "engine.debounce_ms must be in range 1..=60000".to_string(),
        ));
    }

    if engine.autosave_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.autosave_secs must be greater than zero".to_string(),
        ));
    }

    if engine.estimates_cap == 0 || engine.ledger_cap == 0 {
        return Err(ConfigError::Validation(
            "engine.estimates_cap and engine.ledger_cap must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    remote: Option<RemotePatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RemotePatch {
    enabled: Option<bool>,
    url: Option<String>,
    api_key: Option<String>,
    author: Option<String>,
    pull_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    history_cap: Option<usize>,
    debounce_ms: Option<u64>,
    autosave_secs: Option<u64>,
    estimates_cap: Option<usize>,
    ledger_cap: Option<usize>,
    price_overrides_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
