//! Multi-select state over the displayed results.

use std::collections::HashSet;

use crate::types::PhotoId;

/// What a toggle did to the set, including selection-mode edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    /// Empty set became non-empty: selection mode entered.
    Entered,
    Added,
    Removed,
    /// Last id removed: selection mode exited.
    Exited,
}

impl SelectionChange {
    pub fn is_selected(self) -> bool {
        matches!(self, SelectionChange::Entered | SelectionChange::Added)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    ids: HashSet<PhotoId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` if absent, remove it if present.
    pub fn toggle(&mut self, id: &PhotoId) -> SelectionChange {
        if self.ids.remove(id) {
            if self.ids.is_empty() {
                SelectionChange::Exited
            } else {
                SelectionChange::Removed
            }
        } else {
            let was_empty = self.ids.is_empty();
            self.ids.insert(id.clone());
            if was_empty {
                SelectionChange::Entered
            } else {
                SelectionChange::Added
            }
        }
    }

    /// Empty the set. Returns whether anything was selected.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.ids.is_empty();
        self.ids.clear();
        had_any
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_selection_mode(&self) -> bool {
        !self.ids.is_empty()
    }
}
