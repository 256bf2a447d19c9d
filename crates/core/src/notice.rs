use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCategory {
    Storage,
    Remote,
    Validation,
    Backup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

/// A non-fatal, user-visible notification. Raising one never aborts the
/// operation that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub notice_id: String,
    pub category: NoticeCategory,
    pub severity: NoticeSeverity,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(
        category: NoticeCategory,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notice_id: Uuid::new_v4().to_string(),
            category,
            severity,
            message: message.into(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn warning(category: NoticeCategory, message: impl Into<String>) -> Self {
        Self::new(category, NoticeSeverity::Warning, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait NoticeSink: Send + Sync {
    fn emit(&self, notice: Notice);
}

#[derive(Clone, Default)]
pub struct InMemoryNoticeSink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl InMemoryNoticeSink {
    pub fn notices(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn take(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NoticeSink for InMemoryNoticeSink {
    fn emit(&self, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

/// Forwards notices to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn emit(&self, notice: Notice) {
        let category = format!("{:?}", notice.category).to_lowercase();
        match notice.severity {
            NoticeSeverity::Info => tracing::info!(
                event_name = "notice.raised",
                category = %category,
                metadata = ?notice.metadata,
                "{}",
                notice.message
            ),
            NoticeSeverity::Warning => tracing::warn!(
                event_name = "notice.raised",
                category = %category,
                metadata = ?notice.metadata,
                "{}",
                notice.message
            ),
            NoticeSeverity::Error => tracing::error!(
                event_name = "notice.raised",
                category = %category,
                metadata = ?notice.metadata,
                "{}",
                notice.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryNoticeSink, Notice, NoticeCategory, NoticeSeverity, NoticeSink};

    #[test]
    fn in_memory_sink_keeps_notices_until_taken() {
        let sink = InMemoryNoticeSink::default();
        sink.emit(
            Notice::warning(NoticeCategory::Remote, "remote store unreachable")
                .with_metadata("estimate_id", "e1"),
        );
        sink.emit(Notice::new(NoticeCategory::Backup, NoticeSeverity::Info, "backup exported"));

        let notices = sink.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].metadata.get("estimate_id").map(String::as_str), Some("e1"));

        assert_eq!(sink.take().len(), 2);
        assert!(sink.notices().is_empty());
    }
}
