use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::money;

#[derive(Debug, Error)]
pub enum OverrideLoadError {
    #[error("failed to read price overrides at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("price overrides at {path} are not a JSON object: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Static item-name → price table consulted before catalog prices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PriceOverrideTable {
    prices: HashMap<String, Decimal>,
}

impl PriceOverrideTable {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self { prices }
    }

    /// Non-numeric entries are dropped with a warning.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut prices = HashMap::with_capacity(object.len());
        for (name, raw) in object {
            match money::decimal_from_json(raw) {
                Some(price) => {
                    prices.insert(name.clone(), price);
                }
                None => warn!(
                    event_name = "pricing.overrides.entry_skipped",
                    name = %name,
                    "ignoring non-numeric price override"
                ),
            }
        }
        Some(Self { prices })
    }

    pub fn load(path: &Path) -> Result<Self, OverrideLoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| OverrideLoadError::Read { path: path.to_path_buf(), source })?;
        let value: Value = serde_json::from_str(&raw).map_err(|error| OverrideLoadError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Self::from_value(&value).ok_or_else(|| OverrideLoadError::Parse {
            path: path.to_path_buf(),
            message: "expected an object of name to price".to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.prices.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, price: Decimal) {
        self.prices.insert(name.into(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;
    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::{OverrideLoadError, PriceOverrideTable};

    #[test]
    fn numeric_entries_survive_garbage_is_dropped() {
        let table = PriceOverrideTable::from_value(&json!({
            "Теплообменник": 30000,
            "Лестница": "12000.50",
            "Прожектор": "n/a"
        }))
        .expect("object");

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Лестница"), Some(Decimal::new(1_200_050, 2)));
        assert_eq!(table.get("Прожектор"), None);
        assert!(PriceOverrideTable::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn load_reports_non_object_files() -> Result<(), String> {
        let mut file = NamedTempFile::new().map_err(|error| error.to_string())?;
        file.write_all(b"[1, 2, 3]").map_err(|error| error.to_string())?;

        match PriceOverrideTable::load(file.path()) {
            Err(OverrideLoadError::Parse { .. }) => Ok(()),
            other => Err(format!("expected parse error, got {other:?}")),
        }
    }
}
