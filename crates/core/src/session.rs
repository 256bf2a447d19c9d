//! Per-session facade over the estimator engine.
//!
//! An [`EstimatorSession`] owns the selection history, the saved estimate
//! list, templates, the action ledger and every timer. Callers drive time
//! through [`EstimatorSession::advance`]; nothing runs in the background.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backup::{BackupDocument, BackupError};
use crate::book::EstimateBook;
use crate::config::AppConfig;
use crate::domain::estimate::{Estimate, EstimateId, EstimateItem, EstimatePatch, ValidationError};
use crate::domain::selection::{EquipmentItem, Selection, SelectionPatch};
use crate::domain::template::{Template, TemplateId};
use crate::errors::DomainError;
use crate::ledger::{HistoryLedger, LedgerAction, LedgerActionType};
use crate::notice::{Notice, NoticeCategory, NoticeSeverity, NoticeSink};
use crate::persistence::{KeyValueStore, PersistenceGateway, Settings};
use crate::pricing::{CatalogIndex, DeterministicPricingEngine, PriceOverrideTable, PricingEngine};
use crate::scheduler::{Scheduler, TimerTask};
use crate::selection_store::SelectionStore;
use crate::sync::{RemoteChangeSender, RemoteError, RemoteEstimateStore, RemoteReconciler};

const GUEST_ACTOR: &str = "guest";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("remote sync is not configured for this session")]
    RemoteDisabled,
}

impl From<ValidationError> for SessionError {
    fn from(value: ValidationError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<SessionError> for crate::errors::ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Domain(error) => error.into(),
            SessionError::Backup(error) => error.into(),
            SessionError::Remote(error) => error.into(),
            error @ SessionError::RemoteDisabled => Self::Configuration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub history_cap: usize,
    pub debounce: Duration,
    pub autosave_interval: Duration,
    pub pull_interval: Option<Duration>,
    pub estimates_cap: usize,
    pub ledger_cap: usize,
    pub author: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_cap: config.engine.history_cap,
            debounce: config.engine.debounce(),
            autosave_interval: config.engine.autosave_interval(),
            pull_interval: config.remote.enabled.then(|| config.remote.pull_interval()),
            estimates_cap: config.engine.estimates_cap,
            ledger_cap: config.engine.ledger_cap,
            author: config.remote.author.clone(),
        }
    }
}

/// Collaborators a session is wired to.
pub struct SessionDeps {
    pub storage: Arc<dyn KeyValueStore>,
    pub remote: Option<Arc<dyn RemoteEstimateStore>>,
    pub notices: Arc<dyn NoticeSink>,
    pub overrides: PriceOverrideTable,
    /// Replaces the cached catalog when present, e.g. from the products table.
    pub catalog: Option<CatalogIndex>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    LocalOnly,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReceipt {
    pub estimate: Estimate,
    pub sync: SyncStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportSummary {
    pub estimates: usize,
    pub templates: usize,
    pub catalog_items: usize,
}

pub struct EstimatorSession<P = DeterministicPricingEngine> {
    settings: SessionSettings,
    engine: P,
    store: SelectionStore,
    catalog: CatalogIndex,
    overrides: PriceOverrideTable,
    gateway: PersistenceGateway,
    reconciler: Option<RemoteReconciler>,
    ledger: HistoryLedger,
    book: EstimateBook,
    templates: Vec<Template>,
    app_settings: Settings,
    scheduler: Scheduler,
    notices: Arc<dyn NoticeSink>,
    shut_down: bool,
}

impl EstimatorSession<DeterministicPricingEngine> {
    pub async fn open(deps: SessionDeps, settings: SessionSettings) -> Self {
        Self::open_with_engine(deps, settings, DeterministicPricingEngine).await
    }
}

impl<P: PricingEngine> EstimatorSession<P> {
    /// Restores local state, pulls remote estimates when a remote store is
    /// configured, and arms the autosave and pull timers.
    pub async fn open_with_engine(deps: SessionDeps, settings: SessionSettings, engine: P) -> Self {
        let gateway = PersistenceGateway::new(
            deps.storage,
            deps.notices.clone(),
            settings.debounce,
            settings.estimates_cap,
        );

        let initial = gateway.load().await.unwrap_or_default();
        let book = EstimateBook::with_estimates(gateway.load_estimates().await, settings.estimates_cap);
        let templates = gateway.load_templates().await;
        let app_settings = gateway.load_settings().await;
        let catalog = match deps.catalog {
            Some(catalog) => catalog,
            None => gateway.load_catalog().await,
        };
        let reconciler = deps.remote.map(|remote| {
            RemoteReconciler::new(
                remote,
                deps.notices.clone(),
                settings.author.clone(),
                settings.estimates_cap,
            )
        });

        let mut scheduler = Scheduler::new();
        scheduler.schedule_every(settings.autosave_interval, TimerTask::Autosave);
        if let (Some(_), Some(period)) = (&reconciler, settings.pull_interval) {
            scheduler.schedule_every(period, TimerTask::RemotePull);
        }

        let mut session = Self {
            store: SelectionStore::new(initial, settings.history_cap),
            ledger: HistoryLedger::new(settings.ledger_cap),
            settings,
            engine,
            catalog,
            overrides: deps.overrides,
            gateway,
            reconciler,
            book,
            templates,
            app_settings,
            scheduler,
            notices: deps.notices,
            shut_down: false,
        };

        if session.reconciler.is_some() {
            // Pull-on-connect; failures already surface as notices.
            let _ = session.sync_now().await;
        }

        info!(
            event_name = "session.opened",
            estimates = session.book.len(),
            templates = session.templates.len(),
            catalog_items = session.catalog.len(),
            remote = session.reconciler.is_some(),
            "estimator session opened"
        );
        session
    }

    pub fn selection(&self) -> &Selection {
        self.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.store.subscribe()
    }

    pub fn mutate(&mut self, patch: SelectionPatch) -> &Selection {
        self.store.mutate(patch);
        self.persist_selection()
    }

    pub fn add_item(&mut self, item: EquipmentItem) -> &Selection {
        self.store.add_item(item);
        self.persist_selection()
    }

    pub fn replace_selection(&mut self, selection: Selection) -> &Selection {
        self.store.replace(selection);
        self.persist_selection()
    }

    pub fn reset_selection(&mut self) -> &Selection {
        self.store.reset();
        self.persist_selection()
    }

    pub fn undo(&mut self) -> &Selection {
        if self.store.can_undo() {
            self.store.undo();
            return self.persist_selection();
        }
        self.store.current()
    }

    pub fn redo(&mut self) -> &Selection {
        if self.store.can_redo() {
            self.store.redo();
            return self.persist_selection();
        }
        self.store.current()
    }

    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }

    pub fn items(&self) -> Vec<EstimateItem> {
        self.engine.derive_items(self.store.current(), &self.catalog, &self.overrides)
    }

    pub fn total(&self) -> Decimal {
        self.engine.total(&self.items())
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn set_catalog(&mut self, catalog: CatalogIndex) {
        self.catalog = catalog;
    }

    pub fn set_overrides(&mut self, overrides: PriceOverrideTable) {
        self.overrides = overrides;
    }

    pub fn estimates(&self) -> &[Estimate] {
        self.book.all()
    }

    pub fn get_estimate(&self, id: &EstimateId) -> Option<&Estimate> {
        self.book.get(id)
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut HistoryLedger {
        &mut self.ledger
    }

    pub fn remote_inbox(&self) -> Option<RemoteChangeSender> {
        self.reconciler.as_ref().map(RemoteReconciler::inbox)
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Advances virtual time, runs every timer that came due, then applies
    /// queued realtime changes.
    pub async fn advance(&mut self, by: Duration) -> Vec<TimerTask> {
        let fired = self.scheduler.advance(by);
        for task in &fired {
            match task {
                TimerTask::FlushSelection => {
                    self.gateway.flush(&mut self.scheduler).await;
                }
                TimerTask::Autosave => {
                    self.gateway.autosave_tick(self.store.current(), Utc::now()).await;
                }
                TimerTask::RemotePull => {
                    let _ = self.sync_now().await;
                }
            }
        }
        self.apply_remote_changes().await;
        fired
    }

    pub async fn flush_now(&mut self) -> bool {
        self.gateway.flush(&mut self.scheduler).await
    }

    /// Cancels every timer. A pending debounced write is dropped; call
    /// [`Self::flush_now`] first to keep it.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        self.gateway.discard_pending(&mut self.scheduler);
        self.shut_down = true;
        info!(event_name = "session.shutdown", "estimator session shut down");
    }

    pub async fn save_estimate(&mut self, name: &str) -> Result<SaveReceipt, SessionError> {
        let items = self.items();
        let total = self.engine.total(&items);
        let estimate = Estimate::new(
            name.trim(),
            self.store.current().clone(),
            items,
            total,
            self.settings.author.clone(),
            Utc::now(),
        );
        if let Err(error) = estimate.validate() {
            self.notices.emit(
                Notice::new(NoticeCategory::Validation, NoticeSeverity::Warning, error.to_string())
                    .with_metadata("operation", "save_estimate"),
            );
            return Err(error.into());
        }

        let saved = self.book.save(estimate)?.clone();
        self.ledger.record(
            LedgerAction::new(LedgerActionType::EstimateCreated, "estimate", saved.id.0.clone())
                .with_after(to_json(&saved))
                .with_changes(["created"]),
            self.actor(),
            format!("Создана смета: {}", saved.name),
        );
        self.persist_estimates().await;
        let sync = self.push_remote(&saved).await;

        info!(
            event_name = "estimate.saved",
            estimate_id = %saved.id,
            total = %saved.total,
            sync = ?sync,
            "estimate saved"
        );
        Ok(SaveReceipt { estimate: saved, sync })
    }

    pub async fn update_estimate(
        &mut self,
        id: &EstimateId,
        patch: EstimatePatch,
    ) -> Result<Estimate, SessionError> {
        let changes = patch_fields(&patch);
        let (before, after) = self.book.update(id, patch, Utc::now())?;
        self.ledger.record(
            LedgerAction::new(LedgerActionType::EstimateUpdated, "estimate", id.0.clone())
                .with_before(to_json(&before))
                .with_after(to_json(&after))
                .with_changes(changes),
            self.actor(),
            format!("Обновлена смета: {}", before.name),
        );
        self.persist_estimates().await;
        self.push_remote(&after).await;
        Ok(after)
    }

    pub async fn delete_estimate(&mut self, id: &EstimateId) -> Result<Estimate, SessionError> {
        let removed = self.book.delete(id)?;
        self.ledger.record(
            LedgerAction::new(LedgerActionType::EstimateDeleted, "estimate", id.0.clone())
                .with_before(to_json(&removed))
                .with_changes(["deleted"]),
            self.actor(),
            format!("Удалена смета: {}", removed.name),
        );
        self.persist_estimates().await;
        if let Some(reconciler) = &self.reconciler {
            let _ = reconciler.delete(id).await;
        }
        Ok(removed)
    }

    pub async fn duplicate_estimate(&mut self, id: &EstimateId) -> Result<SaveReceipt, SessionError> {
        let original_name = self
            .book
            .get(id)
            .map(|estimate| estimate.name.clone())
            .ok_or_else(|| DomainError::EstimateNotFound(id.0.clone()))?;
        let copy = self.book.duplicate(id, self.settings.author.clone(), Utc::now())?.clone();
        self.ledger.record(
            LedgerAction::new(LedgerActionType::EstimateCreated, "estimate", copy.id.0.clone())
                .with_after(to_json(&copy))
                .with_changes(["duplicated"]),
            self.actor(),
            format!("Дублирована смета: {original_name}"),
        );
        self.persist_estimates().await;
        let sync = self.push_remote(&copy).await;
        Ok(SaveReceipt { estimate: copy, sync })
    }

    /// Loads a saved estimate's selection for further editing.
    pub fn open_estimate(&mut self, id: &EstimateId) -> Result<&Selection, SessionError> {
        let selection = self
            .book
            .get(id)
            .map(|estimate| estimate.selection.clone())
            .ok_or_else(|| DomainError::EstimateNotFound(id.0.clone()))?;
        Ok(self.replace_selection(selection))
    }

    /// Pulls remote estimates and merges them into the local list.
    pub async fn sync_now(&mut self) -> Result<usize, SessionError> {
        let reconciler = self.reconciler.as_ref().ok_or(SessionError::RemoteDisabled)?;
        let merged = reconciler.pull_and_merge(self.book.all()).await?;
        let changed = merged.as_slice() != self.book.all();
        self.book.replace_all(merged);
        if changed {
            self.persist_estimates().await;
        }
        Ok(self.book.len())
    }

    /// Drains realtime changes into the local list. Returns whether anything
    /// changed.
    pub async fn apply_remote_changes(&mut self) -> bool {
        let Some(reconciler) = self.reconciler.as_mut() else {
            return false;
        };
        let merged = reconciler.drain_inbox(self.book.all());
        if merged.as_slice() == self.book.all() {
            return false;
        }
        self.book.replace_all(merged);
        self.persist_estimates().await;
        true
    }

    pub async fn save_template(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<Template, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let template = Template::new(name, description, self.store.current().clone(), Utc::now());
        self.templates.insert(0, template.clone());
        self.ledger.record(
            LedgerAction::new(LedgerActionType::TemplateSaved, "template", template.id.0.clone())
                .with_after(to_json(&template))
                .with_changes(["created"]),
            self.actor(),
            format!("Сохранён шаблон: {}", template.name),
        );
        let _ = self.gateway.save_templates(&self.templates).await;
        Ok(template)
    }

    pub fn apply_template(&mut self, id: &TemplateId) -> Result<&Selection, SessionError> {
        let selection = self
            .templates
            .iter()
            .find(|template| &template.id == id)
            .map(|template| template.selection.clone())
            .ok_or_else(|| DomainError::TemplateNotFound(id.0.clone()))?;
        Ok(self.replace_selection(selection))
    }

    pub async fn delete_template(&mut self, id: &TemplateId) -> Result<Template, SessionError> {
        let position = self
            .templates
            .iter()
            .position(|template| &template.id == id)
            .ok_or_else(|| DomainError::TemplateNotFound(id.0.clone()))?;
        let removed = self.templates.remove(position);
        let _ = self.gateway.save_templates(&self.templates).await;
        Ok(removed)
    }

    pub fn export_backup(&mut self) -> BackupDocument {
        let document = BackupDocument::new(
            self.book.all().to_vec(),
            self.templates.clone(),
            self.catalog.items().to_vec(),
            self.app_settings.clone(),
            Utc::now(),
        );
        self.ledger.record(
            LedgerAction::new(LedgerActionType::BackupExported, "backup", document.timestamp.to_rfc3339())
                .with_changes(["exported"]),
            self.actor(),
            format!("Экспорт резервной копии: {} смет", document.estimates.len()),
        );
        document
    }

    /// Replaces local lists with the backup's content. The envelope is
    /// checked before anything is written.
    pub async fn import_backup(&mut self, raw: &str) -> Result<ImportSummary, SessionError> {
        let document = match BackupDocument::parse(raw) {
            Ok(document) => document,
            Err(error) => {
                warn!(event_name = "backup.import.rejected", error = %error, "backup rejected");
                self.notices.emit(
                    Notice::new(NoticeCategory::Backup, NoticeSeverity::Error, error.to_string())
                        .with_metadata("operation", "import_backup"),
                );
                return Err(error.into());
            }
        };

        let summary = ImportSummary {
            estimates: document.estimates.len(),
            templates: document.templates.len(),
            catalog_items: document.catalog.len(),
        };

        self.book.replace_all(document.estimates);
        self.templates = document.templates;
        self.app_settings = document.settings;
        if !document.catalog.is_empty() {
            self.catalog = CatalogIndex::new(document.catalog);
        }

        self.persist_estimates().await;
        let _ = self.gateway.save_templates(&self.templates).await;
        let _ = self.gateway.save_catalog(self.catalog.items()).await;
        let _ = self.gateway.save_settings(&self.app_settings).await;

        self.ledger.record(
            LedgerAction::new(LedgerActionType::BackupImported, "backup", document.timestamp.to_rfc3339())
                .with_changes(["estimates", "templates", "catalog", "settings"]),
            self.actor(),
            format!("Импорт резервной копии версии {}", document.version),
        );
        info!(
            event_name = "backup.imported",
            estimates = summary.estimates,
            templates = summary.templates,
            catalog_items = summary.catalog_items,
            "backup imported"
        );
        Ok(summary)
    }

    fn persist_selection(&mut self) -> &Selection {
        if !self.shut_down {
            self.gateway.save(self.store.current().clone(), &mut self.scheduler);
        }
        self.store.current()
    }

    async fn persist_estimates(&self) {
        let _ = self.gateway.save_estimates(self.book.all()).await;
    }

    async fn push_remote(&self, estimate: &Estimate) -> SyncStatus {
        match &self.reconciler {
            None => SyncStatus::LocalOnly,
            Some(reconciler) => match reconciler.push(estimate).await {
                Ok(()) => SyncStatus::Synced,
                Err(_) => SyncStatus::Failed,
            },
        }
    }

    fn actor(&self) -> String {
        self.settings.author.clone().unwrap_or_else(|| GUEST_ACTOR.to_string())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn patch_fields(patch: &EstimatePatch) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if patch.name.is_some() {
        fields.push("name");
    }
    if patch.status.is_some() {
        fields.push("status");
    }
    if patch.selection.is_some() {
        fields.push("selection");
    }
    if patch.items.is_some() {
        fields.push("items");
    }
    if patch.total.is_some() {
        fields.push("total");
    }
    fields
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::Value;

    use crate::domain::estimate::{EstimatePatch, EstimateStatus, ValidationError};
    use crate::domain::selection::{
        Bowl, ClientInfo, EquipmentItem, HeatingSelection, Material, SelectionPatch,
    };
    use crate::errors::DomainError;
    use crate::ledger::{LedgerActionType, LedgerFilter};
    use crate::notice::{InMemoryNoticeSink, NoticeCategory};
    use crate::persistence::{InMemoryKeyValueStore, KeyValueStore, SELECTION_KEY};
    use crate::pricing::PriceOverrideTable;
    use crate::scheduler::TimerTask;
    use crate::sync::{InMemoryRemoteStore, RemoteEstimateStore};

    use super::{EstimatorSession, SessionDeps, SessionError, SessionSettings, SyncStatus};

    struct Harness {
        storage: Arc<InMemoryKeyValueStore>,
        remote: Arc<InMemoryRemoteStore>,
        notices: InMemoryNoticeSink,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                storage: Arc::new(InMemoryKeyValueStore::new()),
                remote: Arc::new(InMemoryRemoteStore::new()),
                notices: InMemoryNoticeSink::default(),
            }
        }

        async fn open(&self, with_remote: bool) -> EstimatorSession {
            let remote: Option<Arc<dyn RemoteEstimateStore>> =
                with_remote.then(|| self.remote.clone() as Arc<dyn RemoteEstimateStore>);
            let settings = SessionSettings {
                pull_interval: with_remote.then(|| Duration::from_secs(60)),
                ..SessionSettings::default()
            };
            EstimatorSession::open(
                SessionDeps {
                    storage: self.storage.clone(),
                    remote,
                    notices: Arc::new(self.notices.clone()),
                    overrides: PriceOverrideTable::default(),
                    catalog: None,
                },
                settings,
            )
            .await
        }
    }

    fn configure_pool(session: &mut EstimatorSession) {
        session.mutate(SelectionPatch::Material(Some(Material::Composite {
            name: "Композит".to_string(),
        })));
        session.mutate(SelectionPatch::Bowl(Some(Bowl {
            name: "Лагуна 7".to_string(),
            price: Some(Decimal::new(200_000, 0)),
            ..Bowl::default()
        })));
        session.mutate(SelectionPatch::Heating(Some(HeatingSelection {
            name: Some("Теплообменник".to_string()),
            price: Some(Decimal::new(50_000, 0)),
            ..HeatingSelection::default()
        })));
        session.add_item(
            EquipmentItem::priced("a1", "Лестница", Decimal::new(10_000, 0))
                .with_quantity(Decimal::new(2, 0)),
        );
    }

    #[tokio::test]
    async fn configured_pool_totals_and_persists_after_debounce() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;
        configure_pool(&mut session);

        assert_eq!(session.total(), Decimal::new(270_000, 0));
        assert!(harness.storage.get(SELECTION_KEY).await.expect("get").is_none());

        let fired = session.advance(Duration::from_secs(1)).await;
        assert_eq!(fired, vec![TimerTask::FlushSelection]);

        let stored = harness.storage.get(SELECTION_KEY).await.expect("get").expect("flushed");
        let stored: Value = serde_json::from_str(&stored).expect("json");
        assert_eq!(stored["bowl"]["name"], "Лагуна 7");
        assert_eq!(stored["additional"][0]["name"], "Лестница");

        let reopened = harness.open(false).await;
        assert_eq!(reopened.total(), Decimal::new(270_000, 0));
    }

    #[tokio::test]
    async fn undo_and_redo_are_persisted_like_mutations() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;
        session.mutate(SelectionPatch::ClientInfo(ClientInfo {
            name: "Анна".to_string(),
            ..ClientInfo::default()
        }));
        session.undo();
        assert!(!session.can_undo());
        assert!(session.can_redo());

        session.advance(Duration::from_secs(2)).await;
        let reopened = harness.open(false).await;
        assert_eq!(reopened.selection().client_info.name, "");
    }

    #[tokio::test]
    async fn save_estimate_records_ledger_and_pushes_remote() {
        let harness = Harness::new();
        let mut session = harness.open(true).await;
        configure_pool(&mut session);

        let receipt = session.save_estimate("Дача Ивановых").await.expect("saved");

        assert_eq!(receipt.sync, SyncStatus::Synced);
        assert_eq!(receipt.estimate.total, Decimal::new(270_000, 0));
        assert_eq!(receipt.estimate.items.len(), 3);
        assert!(harness.remote.row(&receipt.estimate.id.0).await.is_some());

        let last = session.ledger().get_last_action(Some(receipt.estimate.id.0.as_str())).expect("ledger");
        assert_eq!(last.action.action_type, LedgerActionType::EstimateCreated);
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_save_and_raises_notice() {
        let harness = Harness::new();
        let mut session = harness.open(true).await;
        harness.remote.set_offline(true);

        let receipt = session.save_estimate("Офлайн").await.expect("local save succeeds");

        assert_eq!(receipt.sync, SyncStatus::Failed);
        assert_eq!(session.estimates().len(), 1);
        assert!(harness
            .notices
            .notices()
            .iter()
            .any(|notice| notice.category == NoticeCategory::Remote));
    }

    #[tokio::test]
    async fn invalid_name_blocks_only_that_save() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;

        let error = session.save_estimate("   ").await.err().expect("rejected");
        assert!(matches!(
            error,
            SessionError::Domain(DomainError::Validation(ValidationError::EmptyName))
        ));
        assert!(session.estimates().is_empty());

        let receipt = session.save_estimate("Нормальное имя").await.expect("saved");
        assert_eq!(receipt.sync, SyncStatus::LocalOnly);
    }

    #[tokio::test]
    async fn update_duplicate_delete_flow_through_ledger() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;
        let id = session.save_estimate("Коттедж").await.expect("saved").estimate.id;

        let updated = session
            .update_estimate(
                &id,
                EstimatePatch { status: Some(EstimateStatus::Completed), ..EstimatePatch::default() },
            )
            .await
            .expect("updated");
        assert_eq!(updated.status, EstimateStatus::Completed);

        let copy = session.duplicate_estimate(&id).await.expect("duplicated").estimate;
        assert_eq!(copy.name, "Коттедж (копия)");

        session.delete_estimate(&id).await.expect("deleted");
        assert_eq!(session.estimates().len(), 1);

        let stats = session.ledger().stats();
        assert_eq!(stats.by_type.get("estimate_created"), Some(&2));
        assert_eq!(stats.by_type.get("estimate_updated"), Some(&1));
        assert_eq!(stats.by_type.get("estimate_deleted"), Some(&1));
        let history = session.ledger().list(&LedgerFilter::for_entity(id.0.clone()));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn realtime_changes_from_other_devices_merge_on_advance() {
        let harness = Harness::new();
        let mut session = harness.open(true).await;
        let local = session.save_estimate("Локальная").await.expect("saved").estimate;

        let mut other_device = harness.open(true).await;
        harness.remote.subscribe(session.remote_inbox().expect("inbox"));
        other_device.save_estimate("С другого устройства").await.expect("saved elsewhere");

        session.advance(Duration::from_millis(10)).await;

        let names: Vec<&str> = session.estimates().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"С другого устройства"));
        assert!(session.get_estimate(&local.id).is_some());
    }

    #[tokio::test]
    async fn templates_apply_as_a_single_history_frame() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;
        configure_pool(&mut session);
        let template = session.save_template("Стандарт", "композит + подогрев").await.expect("saved");

        session.reset_selection();
        assert_eq!(session.total(), Decimal::ZERO);

        session.apply_template(&template.id).expect("applied");
        assert_eq!(session.total(), Decimal::new(270_000, 0));
        session.undo();
        assert_eq!(session.total(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn backup_round_trip_and_rejection_before_write() {
        let harness = Harness::new();
        let mut session = harness.open(false).await;
        session.save_estimate("Для бэкапа").await.expect("saved");
        let raw = session.export_backup().to_json_pretty().expect("export");

        let mut fresh = Harness::new().open(false).await;
        assert!(fresh.import_backup("{\"estimates\": []}").await.is_err());
        assert!(fresh.estimates().is_empty());

        let summary = fresh.import_backup(&raw).await.expect("import");
        assert_eq!(summary.estimates, 1);
        assert_eq!(fresh.estimates()[0].name, "Для бэкапа");
    }

    #[tokio::test]
    async fn shutdown_cancels_every_timer() {
        let harness = Harness::new();
        let mut session = harness.open(true).await;
        session.mutate(SelectionPatch::ClientInfo(ClientInfo::default()));
        assert!(session.pending_timers() >= 3);

        session.shutdown();

        assert_eq!(session.pending_timers(), 0);
        assert!(session.advance(Duration::from_secs(600)).await.is_empty());
    }
}
