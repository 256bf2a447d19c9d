//! Reconciliation of saved estimates with the remote row store.
//!
//! The remote side is a dumb upsert-by-id table. Every merge, whether it comes
//! from a pull or from realtime notifications, goes through
//! [`merge_estimates`]: local records win, the result is ordered newest first
//! and capped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::domain::estimate::{Estimate, EstimateId, EstimateStatus};
use crate::notice::{Notice, NoticeCategory, NoticeSink};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store rejected credentials")]
    Unauthorized,
    #[error("remote store rejected the request: {0}")]
    Rejected(String),
    #[error("failed to encode estimate for remote store: {0}")]
    Encode(String),
}

/// One row of the remote `estimates` collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEstimateRow {
    pub id: String,
    pub name: String,
    pub client_name: Option<String>,
    pub data: Value,
    pub total: Decimal,
    pub status: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteEstimateRow {
    pub fn from_estimate(estimate: &Estimate, actor: Option<&str>) -> Result<Self, RemoteError> {
        let data =
            serde_json::to_value(estimate).map_err(|error| RemoteError::Encode(error.to_string()))?;
        Ok(Self {
            id: estimate.id.0.clone(),
            name: estimate.name.clone(),
            client_name: estimate.client_name().map(str::to_string),
            data,
            total: estimate.total,
            status: estimate.status.as_str().to_string(),
            created_by: actor.map(str::to_string).or_else(|| estimate.author.clone()),
            updated_by: actor.map(str::to_string),
            created_at: estimate.created_at,
            updated_at: estimate.updated_at,
        })
    }

    /// Decodes the embedded estimate document, falling back to the row columns
    /// when `data` is unusable. The row's creator becomes the author.
    pub fn into_estimate(self) -> Estimate {
        let mut estimate = Estimate::from_value_lenient(&self.data)
            .filter(|estimate| estimate.id.0 == self.id)
            .unwrap_or_else(|| Estimate {
                id: EstimateId(self.id.clone()),
                name: self.name.clone(),
                selection: Default::default(),
                items: Vec::new(),
                total: self.total,
                created_at: self.created_at,
                updated_at: self.updated_at,
                author: None,
                status: EstimateStatus::parse(&self.status).unwrap_or_default(),
            });
        estimate.created_at = self.created_at;
        if self.created_by.is_some() {
            estimate.author = self.created_by;
        }
        estimate
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteChange {
    Upserted(RemoteEstimateRow),
    Deleted(EstimateId),
}

pub type RemoteChangeSender = mpsc::UnboundedSender<RemoteChange>;

#[async_trait]
pub trait RemoteEstimateStore: Send + Sync {
    /// Insert or replace by `id`.
    async fn upsert(&self, row: RemoteEstimateRow) -> Result<(), RemoteError>;
    /// Most recently created rows first.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RemoteEstimateRow>, RemoteError>;
    async fn delete(&self, id: &EstimateId) -> Result<(), RemoteError>;
}

/// Pure merge: local ∪ remote de-duplicated by id with local winning, stable
/// sorted by creation time descending, truncated to `cap`.
pub fn merge_estimates(local: &[Estimate], remote: &[Estimate], cap: usize) -> Vec<Estimate> {
    let mut seen: HashSet<&EstimateId> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged: Vec<Estimate> = Vec::with_capacity(local.len() + remote.len());
    for estimate in local.iter().chain(remote.iter()) {
        if seen.insert(&estimate.id) {
            merged.push(estimate.clone());
        }
    }
    merged.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    merged.truncate(cap);
    merged
}

pub struct RemoteReconciler {
    remote: Arc<dyn RemoteEstimateStore>,
    notices: Arc<dyn NoticeSink>,
    actor: Option<String>,
    cap: usize,
    inbox_tx: RemoteChangeSender,
    inbox_rx: mpsc::UnboundedReceiver<RemoteChange>,
}

impl RemoteReconciler {
    pub fn new(
        remote: Arc<dyn RemoteEstimateStore>,
        notices: Arc<dyn NoticeSink>,
        actor: Option<String>,
        cap: usize,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self { remote, notices, actor, cap, inbox_tx, inbox_rx }
    }

    /// Handle for a realtime subscription to deliver changes into the inbox.
    pub fn inbox(&self) -> RemoteChangeSender {
        self.inbox_tx.clone()
    }

    pub fn on_remote_change(&self, change: RemoteChange) {
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.inbox_tx.send(change);
    }

    pub async fn push(&self, estimate: &Estimate) -> Result<(), RemoteError> {
        let result = async {
            let row = RemoteEstimateRow::from_estimate(estimate, self.actor.as_deref())?;
            self.remote.upsert(row).await
        }
        .await;

        match &result {
            Ok(()) => debug!(event_name = "sync.push.completed", estimate_id = %estimate.id, "estimate pushed"),
            Err(error) => self.report(
                "sync.push.failed",
                "Смета сохранена локально, но не отправлена в облако",
                error,
                Some(&estimate.id),
            ),
        }
        result
    }

    pub async fn delete(&self, id: &EstimateId) -> Result<(), RemoteError> {
        let result = self.remote.delete(id).await;
        if let Err(error) = &result {
            self.report("sync.delete.failed", "Не удалось удалить смету в облаке", error, Some(id));
        }
        result
    }

    pub async fn pull_and_merge(&self, local: &[Estimate]) -> Result<Vec<Estimate>, RemoteError> {
        let rows = match self.remote.fetch_recent(self.cap).await {
            Ok(rows) => rows,
            Err(error) => {
                self.report("sync.pull.failed", "Не удалось синхронизироваться с облаком", &error, None);
                return Err(error);
            }
        };
        let fetched = rows.len();
        let remote: Vec<Estimate> = rows.into_iter().map(RemoteEstimateRow::into_estimate).collect();
        let merged = merge_estimates(local, &remote, self.cap);
        info!(
            event_name = "sync.pull.merged",
            fetched,
            local = local.len(),
            merged = merged.len(),
            "remote estimates merged"
        );
        Ok(merged)
    }

    /// Applies every queued realtime change to `local`. Deletions are not
    /// propagated; a record disappears locally only through a local delete.
    pub fn drain_inbox(&mut self, local: &[Estimate]) -> Vec<Estimate> {
        let mut batch = Vec::new();
        let mut ignored_deletes = 0usize;
        while let Ok(change) = self.inbox_rx.try_recv() {
            match change {
                RemoteChange::Upserted(row) => batch.push(row.into_estimate()),
                RemoteChange::Deleted(_) => ignored_deletes += 1,
            }
        }
        if batch.is_empty() && ignored_deletes == 0 {
            return local.to_vec();
        }
        debug!(
            event_name = "sync.inbox.drained",
            upserts = batch.len(),
            ignored_deletes,
            "realtime changes applied"
        );
        merge_estimates(local, &batch, self.cap)
    }

    fn report(&self, event_name: &'static str, message: &str, error: &RemoteError, id: Option<&EstimateId>) {
        warn!(event_name, error = %error, estimate_id = ?id.map(|id| id.0.as_str()), "remote operation failed");
        let mut notice = Notice::warning(NoticeCategory::Remote, message).with_metadata("error", error.to_string());
        if let Some(id) = id {
            notice = notice.with_metadata("estimate_id", id.0.clone());
        }
        self.notices.emit(notice);
    }
}

/// Row store kept in process memory. Registered listeners receive a change
/// for every successful write, the way a realtime subscription would.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    rows: RwLock<HashMap<String, RemoteEstimateRow>>,
    listeners: Mutex<Vec<RemoteChangeSender>>,
    offline: AtomicBool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sender: RemoteChangeSender) {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(sender),
            Err(poisoned) => poisoned.into_inner().push(sender),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn row(&self, id: &str) -> Option<RemoteEstimateRow> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    fn ensure_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        Ok(())
    }

    fn broadcast(&self, change: RemoteChange) {
        let mut listeners = match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|listener| listener.send(change.clone()).is_ok());
    }
}

#[async_trait]
impl RemoteEstimateStore for InMemoryRemoteStore {
    async fn upsert(&self, row: RemoteEstimateRow) -> Result<(), RemoteError> {
        self.ensure_online()?;
        self.rows.write().await.insert(row.id.clone(), row.clone());
        self.broadcast(RemoteChange::Upserted(row));
        Ok(())
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RemoteEstimateRow>, RemoteError> {
        self.ensure_online()?;
        let mut rows: Vec<RemoteEstimateRow> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, id: &EstimateId) -> Result<(), RemoteError> {
        self.ensure_online()?;
        if self.rows.write().await.remove(&id.0).is_some() {
            self.broadcast(RemoteChange::Deleted(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::estimate::{Estimate, EstimateId, EstimateStatus};
    use crate::domain::selection::Selection;
    use crate::notice::{InMemoryNoticeSink, NoticeCategory};

    use super::{
        merge_estimates, InMemoryRemoteStore, RemoteChange, RemoteEstimateRow,
        RemoteEstimateStore, RemoteReconciler,
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).single().expect("valid timestamp")
    }

    fn estimate(id: &str, total: i64, created_at: DateTime<Utc>) -> Estimate {
        Estimate {
            id: EstimateId(id.to_string()),
            name: format!("Смета {id}"),
            selection: Selection::default(),
            items: Vec::new(),
            total: Decimal::new(total, 0),
            created_at,
            updated_at: created_at,
            author: None,
            status: EstimateStatus::Draft,
        }
    }

    #[test]
    fn merge_keeps_local_version_on_id_conflict() {
        let local = vec![estimate("e1", 100, at(9))];
        let remote = vec![estimate("e1", 999, at(9)), estimate("e2", 50, at(10))];

        let merged = merge_estimates(&local, &remote, 1000);

        let ids: Vec<&str> = merged.iter().map(|estimate| estimate.id.0.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        assert_eq!(merged[1].total, Decimal::new(100, 0));
    }

    #[test]
    fn merge_is_idempotent_and_capped() {
        let local = vec![estimate("a", 1, at(8)), estimate("b", 2, at(8))];
        let remote = vec![estimate("c", 3, at(12)), estimate("a", 4, at(8))];

        let once = merge_estimates(&local, &remote, 2);
        let twice = merge_estimates(&once, &remote, 2);

        assert_eq!(once, twice);
        let ids: Vec<&str> = once.iter().map(|estimate| estimate.id.0.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn row_round_trips_estimate_and_takes_creator_as_author() {
        let original = estimate("e7", 1234, at(11));
        let row = RemoteEstimateRow::from_estimate(&original, Some("manager@example.com"))
            .expect("row encodes");
        assert_eq!(row.status, "draft");

        let decoded = row.into_estimate();
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.total, original.total);
        assert_eq!(decoded.author.as_deref(), Some("manager@example.com"));
    }

    #[tokio::test]
    async fn pull_merges_remote_rows_into_local_list() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let reconciler =
            RemoteReconciler::new(remote.clone(), Arc::new(InMemoryNoticeSink::default()), None, 1000);
        reconciler.push(&estimate("e1", 999, at(9))).await.expect("push e1");
        reconciler.push(&estimate("e2", 50, at(10))).await.expect("push e2");

        let local = vec![estimate("e1", 100, at(9))];
        let merged = reconciler.pull_and_merge(&local).await.expect("pull");

        assert_eq!(merged.len(), 2);
        let e1 = merged.iter().find(|estimate| estimate.id.0 == "e1").expect("e1 kept");
        assert_eq!(e1.total, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn offline_push_raises_remote_notice_without_panicking() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        remote.set_offline(true);
        let notices = InMemoryNoticeSink::default();
        let reconciler = RemoteReconciler::new(remote.clone(), Arc::new(notices.clone()), None, 1000);

        assert!(reconciler.push(&estimate("e1", 1, at(9))).await.is_err());
        assert!(reconciler.pull_and_merge(&[]).await.is_err());

        let raised = notices.notices();
        assert_eq!(raised.len(), 2);
        assert!(raised.iter().all(|notice| notice.category == NoticeCategory::Remote));
        assert_eq!(remote.len().await, 0);
    }

    #[tokio::test]
    async fn realtime_changes_flow_through_inbox_with_local_winning() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let mut reconciler =
            RemoteReconciler::new(remote.clone(), Arc::new(InMemoryNoticeSink::default()), None, 1000);
        remote.subscribe(reconciler.inbox());

        let local = vec![estimate("e1", 100, at(9))];
        remote
            .upsert(RemoteEstimateRow::from_estimate(&estimate("e1", 500, at(9)), None).expect("row"))
            .await
            .expect("upsert e1");
        remote
            .upsert(
                RemoteEstimateRow::from_estimate(&estimate("e3", 70, at(9) + Duration::hours(3)), None)
                    .expect("row"),
            )
            .await
            .expect("upsert e3");
        reconciler.on_remote_change(RemoteChange::Deleted(EstimateId("e1".to_string())));

        let merged = reconciler.drain_inbox(&local);

        let ids: Vec<&str> = merged.iter().map(|estimate| estimate.id.0.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e1"]);
        assert_eq!(merged[1].total, Decimal::new(100, 0));
        assert_eq!(reconciler.drain_inbox(&merged), merged);
    }
}
