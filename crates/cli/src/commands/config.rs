use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use poolcalc_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "storage.url",
        &config.storage.url,
        source("storage.url", "POOLCALC_STORAGE_URL"),
    ));
    lines.push(render_line(
        "storage.max_connections",
        &config.storage.max_connections.to_string(),
        source("storage.max_connections", "POOLCALC_STORAGE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "storage.timeout_secs",
        &config.storage.timeout_secs.to_string(),
        source("storage.timeout_secs", "POOLCALC_STORAGE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "remote.enabled",
        &config.remote.enabled.to_string(),
        source("remote.enabled", "POOLCALC_REMOTE_ENABLED"),
    ));
    lines.push(render_line("remote.url", config.remote_url(), source("remote.url", "POOLCALC_REMOTE_URL")));
    let api_key = if config.remote.has_api_key() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("remote.api_key", api_key, source("remote.api_key", "POOLCALC_REMOTE_API_KEY")));
    lines.push(render_line(
        "remote.author",
        config.remote.author.as_deref().unwrap_or("<unset>"),
        source("remote.author", "POOLCALC_REMOTE_AUTHOR"),
    ));
    lines.push(render_line(
        "remote.pull_interval_secs",
        &config.remote.pull_interval_secs.to_string(),
        source("remote.pull_interval_secs", "POOLCALC_REMOTE_PULL_INTERVAL_SECS"),
    ));

    lines.push(render_line(
        "engine.history_cap",
        &config.engine.history_cap.to_string(),
        source("engine.history_cap", "POOLCALC_ENGINE_HISTORY_CAP"),
    ));
    lines.push(render_line(
        "engine.debounce_ms",
        &config.engine.debounce_ms.to_string(),
        source("engine.debounce_ms", "POOLCALC_ENGINE_DEBOUNCE_MS"),
    ));
    lines.push(render_line(
        "engine.autosave_secs",
        &config.engine.autosave_secs.to_string(),
        source("engine.autosave_secs", "POOLCALC_ENGINE_AUTOSAVE_SECS"),
    ));
    lines.push(render_line(
        "engine.estimates_cap",
        &config.engine.estimates_cap.to_string(),
        source("engine.estimates_cap", "POOLCALC_ENGINE_ESTIMATES_CAP"),
    ));
    lines.push(render_line(
        "engine.ledger_cap",
        &config.engine.ledger_cap.to_string(),
        source("engine.ledger_cap", "POOLCALC_ENGINE_LEDGER_CAP"),
    ));
    let overrides_path = config
        .engine
        .price_overrides_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "engine.price_overrides_path",
        &overrides_path,
        source("engine.price_overrides_path", "POOLCALC_ENGINE_PRICE_OVERRIDES"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "POOLCALC_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "POOLCALC_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then_some(path);
    }

    let root = PathBuf::from("poolcalc.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/poolcalc.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
