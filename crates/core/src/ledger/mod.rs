use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_LEDGER_CAP: usize = 1000;
pub const MAX_SNAPSHOTS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerActionType {
    EstimateCreated,
    EstimateUpdated,
    EstimateDeleted,
    TemplateSaved,
    BackupExported,
    BackupImported,
}

impl LedgerActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EstimateCreated => "estimate_created",
            Self::EstimateUpdated => "estimate_updated",
            Self::EstimateDeleted => "estimate_deleted",
            Self::TemplateSaved => "template_saved",
            Self::BackupExported => "backup_exported",
            Self::BackupImported => "backup_imported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAction {
    #[serde(rename = "type")]
    pub action_type: LedgerActionType,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
    #[serde(default)]
    pub changes: Vec<String>,
}

impl LedgerAction {
    pub fn new(
        action_type: LedgerActionType,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            before: None,
            after: None,
            changes: Vec::new(),
        }
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_changes<I, S>(mut self, changes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changes = changes.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub action: LedgerAction,
    pub actor: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub types: Vec<LedgerActionType>,
    pub actors: Vec<String>,
    pub entity_ids: Vec<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search_text: Option<String>,
    pub tags: Vec<String>,
}

impl LedgerFilter {
    pub fn for_entity(entity_id: impl Into<String>) -> Self {
        Self { entity_ids: vec![entity_id.into()], ..Self::default() }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if !self.types.is_empty() && !self.types.contains(&entry.action.action_type) {
            return false;
        }
        if !self.actors.is_empty() && !self.actors.contains(&entry.actor) {
            return false;
        }
        if !self.entity_ids.is_empty() && !self.entity_ids.contains(&entry.action.entity_id) {
            return false;
        }
        if self.from.is_some_and(|from| entry.recorded_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.recorded_at > to) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|tag| entry.tags.contains(tag)) {
            return false;
        }
        match self.search_text.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => entry.description.to_lowercase().contains(&text.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub snapshot_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_actions: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    pub by_entity: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger snapshot {0} not found")]
    SnapshotNotFound(String),
}

/// Append-only log of domain actions, newest first, with FIFO eviction once
/// the cap is reached. Independent from selection undo/redo.
#[derive(Clone, Debug)]
pub struct HistoryLedger {
    entries: VecDeque<LedgerEntry>,
    snapshots: VecDeque<LedgerSnapshot>,
    cap: usize,
    recording: bool,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAP)
    }
}

impl HistoryLedger {
    pub fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), snapshots: VecDeque::new(), cap: cap.max(1), recording: true }
    }

    /// Returns `None` while recording is paused.
    pub fn record(
        &mut self,
        action: LedgerAction,
        actor: impl Into<String>,
        description: impl Into<String>,
    ) -> Option<String> {
        self.record_tagged(action, actor, description, Vec::new())
    }

    pub fn record_tagged(
        &mut self,
        action: LedgerAction,
        actor: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Option<String> {
        if !self.recording {
            return None;
        }

        let entry = LedgerEntry {
            entry_id: Uuid::new_v4().to_string(),
            action,
            actor: actor.into(),
            description: description.into(),
            tags,
            recorded_at: Utc::now(),
        };
        let entry_id = entry.entry_id.clone();
        debug!(
            event_name = "ledger.action.recorded",
            action = entry.action.action_type.as_str(),
            entity_id = %entry.action.entity_id,
            "ledger entry recorded"
        );

        self.entries.push_front(entry);
        self.entries.truncate(self.cap);
        Some(entry_id)
    }

    pub fn pause(&mut self) {
        self.recording = false;
    }

    pub fn resume(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self, filter: &LedgerFilter) -> Vec<LedgerEntry> {
        self.entries.iter().filter(|entry| filter.matches(entry)).cloned().collect()
    }

    pub fn search(&self, query: &str, filter: &LedgerFilter) -> Vec<LedgerEntry> {
        let filter = LedgerFilter { search_text: Some(query.to_string()), ..filter.clone() };
        self.list(&filter)
    }

    pub fn get_last_action(&self, entity_id: Option<&str>) -> Option<&LedgerEntry> {
        match entity_id {
            Some(entity_id) => self.entries.iter().find(|entry| entry.action.entity_id == entity_id),
            None => self.entries.front(),
        }
    }

    pub fn snapshot(&mut self, name: impl Into<String>) -> String {
        let snapshot = LedgerSnapshot {
            snapshot_id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            entries: self.entries.iter().cloned().collect(),
        };
        let snapshot_id = snapshot.snapshot_id.clone();
        self.snapshots.push_front(snapshot);
        self.snapshots.truncate(MAX_SNAPSHOTS);
        snapshot_id
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &LedgerSnapshot> {
        self.snapshots.iter()
    }

    pub fn restore(&mut self, snapshot_id: &str) -> Result<usize, LedgerError> {
        let snapshot = self
            .snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
            .ok_or_else(|| LedgerError::SnapshotNotFound(snapshot_id.to_string()))?;
        self.entries = snapshot.entries.iter().cloned().collect();
        self.entries.truncate(self.cap);
        Ok(self.entries.len())
    }

    pub fn delete_snapshot(&mut self, snapshot_id: &str) -> bool {
        let before = self.snapshots.len();
        self.snapshots.retain(|snapshot| snapshot.snapshot_id != snapshot_id);
        self.snapshots.len() != before
    }

    /// Removes matching entries; an empty filter clears everything.
    pub fn clear(&mut self, filter: &LedgerFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !filter.matches(entry));
        before - self.entries.len()
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats { total_actions: self.entries.len(), ..LedgerStats::default() };
        for entry in &self.entries {
            *stats.by_type.entry(entry.action.action_type.as_str().to_string()).or_default() += 1;
            *stats.by_actor.entry(entry.actor.clone()).or_default() += 1;
            *stats.by_entity.entry(entry.action.entity_type.clone()).or_default() += 1;
        }
        stats
    }
}
