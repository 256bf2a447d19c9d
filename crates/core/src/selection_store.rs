use tokio::sync::watch;
use tracing::debug;

use crate::domain::selection::{EquipmentItem, Selection, SelectionPatch};

pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryFrame {
    pub selection: Selection,
    pub index: usize,
}

/// Owns the current selection and a bounded linear undo/redo history of full
/// snapshots. Invariant: `cursor < history.len()` and `history.len() <= cap`.
#[derive(Debug)]
pub struct SelectionStore {
    history: Vec<Selection>,
    cursor: usize,
    cap: usize,
    changes: watch::Sender<Selection>,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new(Selection::default(), DEFAULT_HISTORY_CAP)
    }
}

impl SelectionStore {
    pub fn new(initial: Selection, cap: usize) -> Self {
        let (changes, _) = watch::channel(initial.clone());
        Self { history: vec![initial], cursor: 0, cap: cap.max(1), changes }
    }

    /// Rebuilds a store from persisted frames. An empty history is reseeded
    /// with a default frame and an out-of-range cursor is clamped.
    pub fn from_history(mut frames: Vec<Selection>, index: usize, cap: usize) -> Self {
        let cap = cap.max(1);
        if frames.is_empty() {
            frames.push(Selection::default());
        }
        let mut cursor = index.min(frames.len() - 1);
        if frames.len() > cap {
            let overflow = frames.len() - cap;
            frames.drain(..overflow);
            cursor = cursor.saturating_sub(overflow);
        }

        let (changes, _) = watch::channel(frames[cursor].clone());
        Self { history: frames, cursor, cap, changes }
    }

    pub fn current(&self) -> &Selection {
        &self.history[self.cursor]
    }

    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.changes.subscribe()
    }

    pub fn mutate(&mut self, patch: SelectionPatch) -> &Selection {
        let field = patch.field_name();
        let mut next = self.current().clone();
        next.apply(patch);
        debug!(event_name = "selection.mutated", field, "selection field updated");
        self.record(next)
    }

    pub fn add_item(&mut self, item: EquipmentItem) -> &Selection {
        let mut next = self.current().clone();
        next.additional.push(item);
        self.record(next)
    }

    /// Replaces the whole selection, e.g. when a template is applied.
    pub fn replace(&mut self, selection: Selection) -> &Selection {
        self.record(selection)
    }

    pub fn reset(&mut self) -> &Selection {
        self.record(Selection::default())
    }

    pub fn undo(&mut self) -> &Selection {
        if self.can_undo() {
            self.cursor -= 1;
            self.publish();
        }
        self.current()
    }

    pub fn redo(&mut self) -> &Selection {
        if self.can_redo() {
            self.cursor += 1;
            self.publish();
        }
        self.current()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn frames(&self) -> Vec<HistoryFrame> {
        self.history
            .iter()
            .enumerate()
            .map(|(index, selection)| HistoryFrame { selection: selection.clone(), index })
            .collect()
    }

    fn record(&mut self, next: Selection) -> &Selection {
        self.history.truncate(self.cursor + 1);
        self.history.push(next);
        if self.history.len() > self.cap {
            let overflow = self.history.len() - self.cap;
            self.history.drain(..overflow);
        }
        self.cursor = self.history.len() - 1;
        self.publish();
        self.current()
    }

    fn publish(&self) {
        self.changes.send_replace(self.history[self.cursor].clone());
    }
}
