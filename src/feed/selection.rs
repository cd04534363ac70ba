use super::model::{NotificationId, Page};
use std::collections::BTreeSet;

/// Renderable state of the "select all" checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAll {
    None,
    Indeterminate,
    All,
}

/// Checked rows of the current page.
///
/// Always a subset of the page's ids: toggles for ids that are not on the
/// page are ignored and [`retain`](Self::retain) prunes after local deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionModel {
    checked: BTreeSet<NotificationId>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one row. Returns false if `id` is not on `page`.
    pub fn toggle(&mut self, id: &NotificationId, page: &Page) -> bool {
        if !page.contains(id) {
            return false;
        }
        if !self.checked.remove(id) {
            self.checked.insert(id.clone());
        }
        true
    }

    /// Tri-state select-all: indeterminate clears, otherwise none <-> all.
    pub fn toggle_all(&mut self, page: &Page) {
        match self.tri_state(page) {
            SelectAll::Indeterminate | SelectAll::All => self.checked.clear(),
            SelectAll::None => self.checked = page.ids().cloned().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.checked.clear();
    }

    pub fn deselect(&mut self, ids: &BTreeSet<NotificationId>) {
        self.checked.retain(|id| !ids.contains(id));
    }

    /// Drop ids that are no longer on `page`.
    pub fn retain(&mut self, page: &Page) {
        self.checked.retain(|id| page.contains(id));
    }

    pub fn is_checked(&self, id: &NotificationId) -> bool {
        self.checked.contains(id)
    }

    pub fn checked_ids(&self) -> &BTreeSet<NotificationId> {
        &self.checked
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_empty()
    }

    pub fn tri_state(&self, page: &Page) -> SelectAll {
        if self.checked.is_empty() {
            SelectAll::None
        } else if page.ids().all(|id| self.checked.contains(id)) {
            SelectAll::All
        } else {
            SelectAll::Indeterminate
        }
    }

    pub fn all_checked(&self, page: &Page) -> bool {
        self.tri_state(page) == SelectAll::All
    }

    pub fn indeterminate(&self, page: &Page) -> bool {
        self.tri_state(page) == SelectAll::Indeterminate
    }
}
