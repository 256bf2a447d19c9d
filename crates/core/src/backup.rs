use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::catalog_item::CatalogItem;
use crate::domain::estimate::Estimate;
use crate::domain::template::Template;
use crate::persistence::Settings;
use crate::pricing::CatalogIndex;

pub const BACKUP_VERSION: &str = "3.0";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackupError {
    #[error("backup is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("backup document must be a JSON object")]
    NotAnObject,
    #[error("backup is missing `version`")]
    MissingVersion,
    #[error("backup is missing `timestamp`")]
    MissingTimestamp,
}

/// Full export of the locally stored lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub estimates: Vec<Estimate>,
    pub templates: Vec<Template>,
    pub catalog: Vec<CatalogItem>,
    pub settings: Settings,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl BackupDocument {
    pub fn new(
        estimates: Vec<Estimate>,
        templates: Vec<Template>,
        catalog: Vec<CatalogItem>,
        settings: Settings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            estimates,
            templates,
            catalog,
            settings,
            timestamp: now,
            version: BACKUP_VERSION.to_string(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        serde_json::to_string_pretty(self).map_err(|error| BackupError::InvalidJson(error.to_string()))
    }

    /// Checks the envelope before anything is decoded, then reads each list
    /// leniently. Nothing here writes; callers apply the result.
    pub fn parse(raw: &str) -> Result<Self, BackupError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|error| BackupError::InvalidJson(error.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, BackupError> {
        let object = value.as_object().ok_or(BackupError::NotAnObject)?;
        let version = object
            .get("version")
            .and_then(|version| match version {
                Value::String(version) if !version.trim().is_empty() => Some(version.clone()),
                Value::Number(version) => Some(version.to_string()),
                _ => None,
            })
            .ok_or(BackupError::MissingVersion)?;
        let timestamp = object
            .get("timestamp")
            .filter(|timestamp| !timestamp.is_null())
            .ok_or(BackupError::MissingTimestamp)?;
        let timestamp = timestamp
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        if version != BACKUP_VERSION {
            warn!(event_name = "backup.import.version_mismatch", version = %version, "importing backup from another version");
        }

        let estimates: Vec<Estimate> = object
            .get("estimates")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(Estimate::from_value_lenient).collect())
            .unwrap_or_default();
        let templates: Vec<Template> = object
            .get("templates")
            .and_then(Value::as_array)
            .map(|entries| {
                entries.iter().filter_map(|entry| serde_json::from_value(entry.clone()).ok()).collect()
            })
            .unwrap_or_default();
        let catalog = object
            .get("catalog")
            .map(|catalog| CatalogIndex::from_value_lenient(catalog).items().to_vec())
            .unwrap_or_default();
        let settings = match object.get("settings") {
            Some(Value::Object(settings)) => settings.clone(),
            _ => Settings::new(),
        };

        Ok(Self { estimates, templates, catalog, settings, timestamp, version })
    }
}
