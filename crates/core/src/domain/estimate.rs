use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::money;
use crate::domain::selection::Selection;

pub const MAX_ESTIMATE_NAME_LEN: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EstimateId(pub String);

impl EstimateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for EstimateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    #[default]
    Draft,
    InProgress,
    Completed,
    Archived,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "draft" => Some(Self::Draft),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Estimate sections in presentation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    #[serde(rename = "Чаша бассейна")]
    Bowl,
    #[serde(rename = "Оборудование")]
    Equipment,
    #[serde(rename = "Подогрев")]
    Heating,
    #[serde(rename = "Дополнительное оборудование")]
    Additional,
    #[serde(rename = "Строительные работы")]
    Works,
    #[serde(rename = "Монтажные работы")]
    Installation,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Bowl => "Чаша бассейна",
            Self::Equipment => "Оборудование",
            Self::Heating => "Подогрев",
            Self::Additional => "Дополнительное оборудование",
            Self::Works => "Строительные работы",
            Self::Installation => "Монтажные работы",
        }
    }
}

/// A priced line derived from a selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateItem {
    pub id: String,
    pub name: String,
    pub section: Section,
    #[serde(with = "money::number")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(with = "money::number")]
    pub price: Decimal,
    #[serde(with = "money::number")]
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub id: EstimateId,
    pub name: String,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub items: Vec<EstimateItem>,
    #[serde(default, with = "money::number")]
    pub total: Decimal,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub status: EstimateStatus,
}

impl Estimate {
    pub fn new(
        name: impl Into<String>,
        selection: Selection,
        items: Vec<EstimateItem>,
        total: Decimal,
        author: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EstimateId::generate(),
            name: name.into(),
            selection,
            items,
            total,
            created_at: now,
            updated_at: now,
            author,
            status: EstimateStatus::Draft,
        }
    }

    pub fn client_name(&self) -> Option<&str> {
        let name = self.selection.client_info.name.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_estimate(&self.name, self.total)
    }

    pub fn apply_patch(&mut self, patch: EstimatePatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(selection) = patch.selection {
            self.selection = selection;
        }
        if let Some(items) = patch.items {
            self.items = items;
        }
        if let Some(total) = patch.total {
            self.total = total;
        }
        self.updated_at = now;
    }

    /// Reads a stored or remote estimate. Only `id` is mandatory; a broken
    /// selection or item list degrades to its default instead of dropping the
    /// record.
    pub fn from_value_lenient(value: &Value) -> Option<Self> {
        if let Ok(estimate) = serde_json::from_value::<Self>(value.clone()) {
            return Some(estimate);
        }

        let object = value.as_object()?;
        let id = object.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())?;
        let created_at = read_timestamp(object.get("createdAt").or_else(|| object.get("created_at")));
        let updated_at = read_timestamp(object.get("updatedAt").or_else(|| object.get("updated_at")));
        let created_at = created_at.or(updated_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Some(Self {
            id: EstimateId(id.to_string()),
            name: object.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            selection: object
                .get("selection")
                .map(Selection::from_value_lenient)
                .unwrap_or_default(),
            items: object
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| serde_json::from_value(item.clone()).ok())
                        .collect()
                })
                .unwrap_or_default(),
            total: object.get("total").and_then(money::decimal_from_json).unwrap_or_default(),
            created_at,
            updated_at: updated_at.unwrap_or(created_at),
            author: object.get("author").and_then(Value::as_str).map(str::to_string),
            status: object
                .get("status")
                .and_then(Value::as_str)
                .and_then(EstimateStatus::parse)
                .unwrap_or_default(),
        })
    }
}

fn read_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|parsed| parsed.with_timezone(&Utc))
}

/// Partial update for a saved estimate. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EstimatePatch {
    pub name: Option<String>,
    pub status: Option<EstimateStatus>,
    pub selection: Option<Selection>,
    pub items: Option<Vec<EstimateItem>>,
    pub total: Option<Decimal>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("estimate name is required")]
    EmptyName,
    #[error("estimate name is {actual} characters long, at most {max} allowed")]
    NameTooLong { max: usize, actual: usize },
    #[error("estimate total must not be negative")]
    NegativeTotal,
}

pub fn validate_estimate(name: &str, total: Decimal) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let actual = name.chars().count();
    if actual > MAX_ESTIMATE_NAME_LEN {
        return Err(ValidationError::NameTooLong { max: MAX_ESTIMATE_NAME_LEN, actual });
    }
    if total < Decimal::ZERO {
        return Err(ValidationError::NegativeTotal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::domain::selection::Selection;

    use super::{
        validate_estimate, Estimate, EstimatePatch, EstimateStatus, Section, ValidationError,
    };

    #[test]
    fn validation_rejects_blank_long_and_negative() {
        assert_eq!(validate_estimate("   ", Decimal::ONE), Err(ValidationError::EmptyName));
        let long_name = "б".repeat(201);
        assert_eq!(
            validate_estimate(&long_name, Decimal::ONE),
            Err(ValidationError::NameTooLong { max: 200, actual: 201 })
        );
        assert_eq!(
            validate_estimate("Дача", Decimal::new(-1, 0)),
            Err(ValidationError::NegativeTotal)
        );
        assert_eq!(validate_estimate(&"б".repeat(200), Decimal::ZERO), Ok(()));
    }

    #[test]
    fn section_serializes_to_display_title() {
        let value = serde_json::to_value(Section::Installation).expect("section");
        assert_eq!(value, json!("Монтажные работы"));
        assert_eq!(Section::Bowl.title(), "Чаша бассейна");
    }

    #[test]
    fn patch_touches_only_given_fields() {
        let created = Utc::now();
        let mut estimate = Estimate::new(
            "Дача",
            Selection::default(),
            Vec::new(),
            Decimal::new(100, 0),
            None,
            created,
        );

        estimate.apply_patch(
            EstimatePatch { status: Some(EstimateStatus::Completed), ..EstimatePatch::default() },
            created + chrono::Duration::seconds(5),
        );

        assert_eq!(estimate.name, "Дача");
        assert_eq!(estimate.status, EstimateStatus::Completed);
        assert!(estimate.updated_at > estimate.created_at);
    }

    #[test]
    fn lenient_read_keeps_record_with_broken_selection() {
        let estimate = Estimate::from_value_lenient(&json!({
            "id": "e1",
            "name": "Коттедж",
            "selection": {"material": 42},
            "total": "150000",
            "created_at": "2026-03-01T10:00:00Z",
            "status": "in_progress"
        }))
        .expect("estimate with id");

        assert_eq!(estimate.id.0, "e1");
        assert_eq!(estimate.total, Decimal::new(150_000, 0));
        assert_eq!(estimate.status, EstimateStatus::InProgress);
        assert_eq!(estimate.updated_at, estimate.created_at);
        assert!(Estimate::from_value_lenient(&json!({"name": "no id"})).is_none());
    }

    #[test]
    fn record_without_timestamps_gets_a_stable_epoch_date() {
        let stored = json!({"id": "legacy", "name": "Старая смета", "selection": "broken"});

        let first = Estimate::from_value_lenient(&stored).expect("first read");
        let second = Estimate::from_value_lenient(&stored).expect("second read");

        assert_eq!(first.created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.updated_at, second.updated_at);
    }
}
