use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::selection::Selection;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A named, reusable selection preset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selection: Selection,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        selection: Selection,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TemplateId::generate(),
            name: name.into(),
            description: description.into(),
            selection,
            created_at: now,
            updated_at: now,
        }
    }
}
