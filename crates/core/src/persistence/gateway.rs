use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::catalog_item::CatalogItem;
use crate::domain::estimate::Estimate;
use crate::domain::selection::Selection;
use crate::domain::template::Template;
use crate::notice::{Notice, NoticeCategory, NoticeSink};
use crate::persistence::{
    KeyValueStore, StorageError, AUTOSAVE_KEY, CATALOG_KEY, ESTIMATES_KEY, SELECTION_KEY,
    SETTINGS_KEY, TEMPLATES_KEY,
};
use crate::pricing::CatalogIndex;
use crate::scheduler::{Scheduler, TimerId, TimerTask};

pub type Settings = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveSnapshot {
    pub selection: Selection,
    pub timestamp: DateTime<Utc>,
}

/// Durable local storage for the in-progress selection and the saved lists.
///
/// Selection writes are debounced on the trailing edge: every `save` re-arms
/// one flush timer, and the flush writes whatever value is latest when it
/// fires. Autosave writes only its own key. Reads never fail; missing or
/// malformed values come back as defaults.
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
    notices: Arc<dyn NoticeSink>,
    debounce: Duration,
    estimates_cap: usize,
    pending: Option<Selection>,
    flush_timer: Option<TimerId>,
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        notices: Arc<dyn NoticeSink>,
        debounce: Duration,
        estimates_cap: usize,
    ) -> Self {
        Self { store, notices, debounce, estimates_cap, pending: None, flush_timer: None }
    }

    pub async fn load(&self) -> Option<Selection> {
        if let Some(value) = self.read_json(SELECTION_KEY).await {
            if value.is_object() {
                return Some(Selection::from_value_lenient(&value));
            }
            warn!(event_name = "persistence.selection.malformed", "selection key is not an object");
        }

        let snapshot = self.read_json(AUTOSAVE_KEY).await?;
        let selection = snapshot.get("selection").filter(|value| value.is_object())?;
        debug!(event_name = "persistence.selection.restored_from_autosave", "using autosave snapshot");
        Some(Selection::from_value_lenient(selection))
    }

    pub fn save(&mut self, selection: Selection, scheduler: &mut Scheduler) {
        self.pending = Some(selection);
        if let Some(timer) = self.flush_timer.take() {
            scheduler.cancel(timer);
        }
        self.flush_timer = Some(scheduler.schedule_once(self.debounce, TimerTask::FlushSelection));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Writes the pending selection now. Returns whether a write happened.
    /// A failed write keeps the value pending and re-arms the flush timer.
    pub async fn flush(&mut self, scheduler: &mut Scheduler) -> bool {
        if let Some(timer) = self.flush_timer.take() {
            scheduler.cancel(timer);
        }
        let Some(selection) = self.pending.take() else {
            return false;
        };

        match self.write_json(SELECTION_KEY, &selection).await {
            Ok(()) => {
                debug!(event_name = "persistence.selection.flushed", "selection persisted");
                true
            }
            Err(error) => {
                self.report_write_failure(SELECTION_KEY, &error);
                self.pending = Some(selection);
                self.flush_timer = Some(scheduler.schedule_once(self.debounce, TimerTask::FlushSelection));
                false
            }
        }
    }

    /// Drops the pending write and its timer without persisting.
    pub fn discard_pending(&mut self, scheduler: &mut Scheduler) {
        if let Some(timer) = self.flush_timer.take() {
            scheduler.cancel(timer);
        }
        self.pending = None;
    }

    pub async fn autosave_tick(&self, selection: &Selection, now: DateTime<Utc>) -> bool {
        let snapshot = AutosaveSnapshot { selection: selection.clone(), timestamp: now };
        match self.write_json(AUTOSAVE_KEY, &snapshot).await {
            Ok(()) => {
                debug!(event_name = "persistence.autosave.written", "autosave snapshot persisted");
                true
            }
            Err(error) => {
                self.report_write_failure(AUTOSAVE_KEY, &error);
                false
            }
        }
    }

    pub async fn load_estimates(&self) -> Vec<Estimate> {
        let Some(Value::Array(entries)) = self.read_json(ESTIMATES_KEY).await else {
            return Vec::new();
        };
        let mut estimates: Vec<Estimate> = entries
            .iter()
            .filter_map(|entry| {
                let estimate = Estimate::from_value_lenient(entry);
                if estimate.is_none() {
                    warn!(event_name = "persistence.estimates.entry_skipped", "skipping estimate without id");
                }
                estimate
            })
            .collect();
        estimates.truncate(self.estimates_cap);
        estimates
    }

    pub async fn save_estimates(&self, estimates: &[Estimate]) -> Result<(), StorageError> {
        let capped = &estimates[..estimates.len().min(self.estimates_cap)];
        self.write_reported(ESTIMATES_KEY, &capped).await
    }

    pub async fn load_templates(&self) -> Vec<Template> {
        self.read_list(TEMPLATES_KEY).await
    }

    pub async fn save_templates(&self, templates: &[Template]) -> Result<(), StorageError> {
        self.write_reported(TEMPLATES_KEY, &templates).await
    }

    pub async fn load_catalog(&self) -> CatalogIndex {
        match self.read_json(CATALOG_KEY).await {
            Some(value) => CatalogIndex::from_value_lenient(&value),
            None => CatalogIndex::default(),
        }
    }

    pub async fn save_catalog(&self, items: &[CatalogItem]) -> Result<(), StorageError> {
        self.write_reported(CATALOG_KEY, &items).await
    }

    pub async fn load_settings(&self) -> Settings {
        match self.read_json(SETTINGS_KEY).await {
            Some(Value::Object(settings)) => settings,
            Some(_) => {
                warn!(event_name = "persistence.settings.malformed", "settings key is not an object");
                Settings::new()
            }
            None => Settings::new(),
        }
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        self.write_reported(SETTINGS_KEY, settings).await
    }

    async fn read_json(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(event_name = "persistence.read.failed", key, error = %error, "storage read failed");
                self.notices.emit(
                    Notice::warning(NoticeCategory::Storage, "Не удалось прочитать локальные данные")
                        .with_metadata("key", key),
                );
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(event_name = "persistence.read.malformed", key, error = %error, "stored value is not JSON");
                None
            }
        }
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(Value::Array(entries)) = self.read_json(key).await else {
            return Vec::new();
        };
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(parsed) => Some(parsed),
                Err(error) => {
                    warn!(event_name = "persistence.list.entry_skipped", key, error = %error, "skipping malformed entry");
                    None
                }
            })
            .collect()
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|error| StorageError::Backend(format!("failed to encode {key}: {error}")))?;
        self.store.set(key, &raw).await
    }

    async fn write_reported<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let result = self.write_json(key, value).await;
        if let Err(error) = &result {
            self.report_write_failure(key, error);
        }
        result
    }

    fn report_write_failure(&self, key: &str, error: &StorageError) {
        warn!(event_name = "persistence.write.failed", key, error = %error, "storage write failed");
        self.notices.emit(
            Notice::warning(NoticeCategory::Storage, "Не удалось сохранить данные локально")
                .with_metadata("key", key)
                .with_metadata("error", error.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    use crate::domain::selection::{ClientInfo, Selection};
    use crate::notice::{InMemoryNoticeSink, NoticeCategory};
    use crate::persistence::{
        InMemoryKeyValueStore, KeyValueStore, StorageError, AUTOSAVE_KEY, ESTIMATES_KEY,
        SELECTION_KEY,
    };
    use crate::scheduler::{Scheduler, TimerTask};

    use super::PersistenceGateway;

    fn named(name: &str) -> Selection {
        Selection {
            client_info: ClientInfo { name: name.to_string(), ..ClientInfo::default() },
            ..Selection::default()
        }
    }

    fn gateway(store: Arc<InMemoryKeyValueStore>) -> PersistenceGateway {
        PersistenceGateway::new(
            store,
            Arc::new(InMemoryNoticeSink::default()),
            Duration::from_secs(1),
            1000,
        )
    }

    #[tokio::test]
    async fn burst_of_saves_produces_one_write_of_latest_value() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let mut gateway = gateway(store.clone());
        let mut scheduler = Scheduler::new();

        for name in ["a", "b", "c"] {
            gateway.save(named(name), &mut scheduler);
            assert!(scheduler.advance(Duration::from_millis(400)).is_empty());
        }
        let fired = scheduler.advance(Duration::from_millis(600));
        assert_eq!(fired, vec![TimerTask::FlushSelection]);
        assert!(gateway.flush(&mut scheduler).await);

        assert_eq!(store.write_log().await, vec![SELECTION_KEY.to_string()]);
        assert_eq!(gateway.load().await.map(|selection| selection.client_info.name), Some("c".into()));
    }

    #[tokio::test]
    async fn autosave_never_touches_the_debounced_key() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let mut gateway = gateway(store.clone());
        let mut scheduler = Scheduler::new();

        gateway.save(named("saved"), &mut scheduler);
        assert!(gateway.flush(&mut scheduler).await);
        assert!(gateway.autosave_tick(&named("autosaved"), Utc::now()).await);

        let primary = store.get(SELECTION_KEY).await.expect("get").expect("selection key");
        let primary: Value = serde_json::from_str(&primary).expect("json");
        assert_eq!(primary["clientInfo"]["name"], "saved");
        assert_eq!(gateway.load().await.map(|selection| selection.client_info.name), Some("saved".into()));
    }

    #[tokio::test]
    async fn load_falls_back_to_autosave_when_primary_is_malformed() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.set(SELECTION_KEY, "{not json").await.expect("seed primary");
        store
            .set(
                AUTOSAVE_KEY,
                &json!({"selection": {"clientInfo": {"name": "из автосохранения"}}, "timestamp": "2026-05-01T09:00:00Z"})
                    .to_string(),
            )
            .await
            .expect("seed autosave");

        let restored = gateway(store).load().await.expect("autosave fallback");
        assert_eq!(restored.client_info.name, "из автосохранения");
    }

    #[tokio::test]
    async fn estimates_list_skips_entries_without_id_and_respects_cap() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store
            .set(
                ESTIMATES_KEY,
                &json!([
                    {"id": "e1", "name": "Первый", "total": 10, "createdAt": "2026-05-01T09:00:00Z", "updatedAt": "2026-05-01T09:00:00Z"},
                    {"name": "без id"},
                    {"id": "e2", "name": "Второй", "total": 20, "createdAt": "2026-05-02T09:00:00Z", "updatedAt": "2026-05-02T09:00:00Z"}
                ])
                .to_string(),
            )
            .await
            .expect("seed estimates");

        let gateway = PersistenceGateway::new(
            store,
            Arc::new(InMemoryNoticeSink::default()),
            Duration::from_secs(1),
            1,
        );

        let estimates = gateway.load_estimates().await;
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0].id.0, "e1");
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Backend("disk unavailable".to_string()))
        }

        async fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded(key.to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_failures_become_notices_and_defaults() {
        let notices = InMemoryNoticeSink::default();
        let mut gateway = PersistenceGateway::new(
            Arc::new(FailingStore),
            Arc::new(notices.clone()),
            Duration::from_secs(1),
            1000,
        );
        let mut scheduler = Scheduler::new();

        assert!(gateway.load().await.is_none());
        assert!(gateway.load_settings().await.is_empty());
        gateway.save(named("x"), &mut scheduler);
        assert!(!gateway.flush(&mut scheduler).await);
        assert!(gateway.has_pending());
        assert_eq!(scheduler.pending(), 1);

        let recorded = notices.notices();
        assert!(!recorded.is_empty());
        assert!(recorded.iter().all(|notice| notice.category == NoticeCategory::Storage));
    }

    struct FlakyStore {
        inner: InMemoryKeyValueStore,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StorageError::Backend("transient write error".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn failed_flush_is_retried_after_the_debounce() {
        let store =
            Arc::new(FlakyStore { inner: InMemoryKeyValueStore::new(), failures_left: AtomicUsize::new(1) });
        let mut gateway = PersistenceGateway::new(
            store.clone(),
            Arc::new(InMemoryNoticeSink::default()),
            Duration::from_secs(1),
            1000,
        );
        let mut scheduler = Scheduler::new();

        gateway.save(named("newest"), &mut scheduler);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), vec![TimerTask::FlushSelection]);
        assert!(!gateway.flush(&mut scheduler).await);

        assert_eq!(scheduler.advance(Duration::from_secs(1)), vec![TimerTask::FlushSelection]);
        assert!(gateway.flush(&mut scheduler).await);
        assert!(!gateway.has_pending());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(gateway.load().await.map(|selection| selection.client_info.name), Some("newest".into()));
    }
}
