//! Page window bookkeeping: which page is shown, which request may replace
//! it, and what the pager controls should offer.

use super::model::{NotificationId, NotificationPage, Page};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What the list area renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// Nothing loaded yet this visit.
    Unloaded,
    /// Server reported zero records. Distinct from page 1 with no rows.
    Empty,
    Loaded(Arc<Page>),
}

/// Issued by [`PaginationController::begin_load`]; the completion must hand
/// it back so stale responses can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub page: u32,
    pub generation: u64,
}

/// `(lowerBound, rowCount, totalRecords)` for the "1-10 of 25" label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLabel {
    pub lower_bound: u64,
    pub row_count: u64,
    pub total_records: u64,
}

/// Result of handing a list response to [`PaginationController::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed,
    /// Response to an outdated request. Nothing changed.
    Stale,
    /// A later page came back without rows while records remain: the window
    /// lies past the end of the feed. Nothing changed; the caller should
    /// load this page instead.
    PastEnd(u32),
}

/// Result of applying a confirmed delete to the page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Rows were dropped in memory; no request needed.
    Truncated,
    /// The window is gone; the caller must load this page.
    Reload(u32),
}

#[derive(Debug)]
pub struct PaginationController {
    page_size: u32,
    state: PageState,
    /// Latest issued request generation. Only its completion may commit.
    generation: u64,
    pending: Option<PageTicket>,
    /// Generation of the request that produced the current state.
    loaded_generation: Option<u64>,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            state: PageState::Unloaded,
            generation: 0,
            pending: None,
            loaded_generation: None,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn page(&self) -> Option<&Arc<Page>> {
        match &self.state {
            PageState::Loaded(page) => Some(page),
            _ => None,
        }
    }

    /// Current page number; 1 until something has been loaded.
    pub fn current_page(&self) -> u32 {
        self.page().map_or(1, |p| p.number())
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_page(&self) -> Option<u32> {
        self.pending.map(|t| t.page)
    }

    pub fn loaded_generation(&self) -> Option<u64> {
        self.loaded_generation
    }

    /// Start a request for page `page` (clamped to >= 1). Any earlier
    /// in-flight request becomes stale.
    pub fn begin_load(&mut self, page: u32) -> PageTicket {
        self.generation += 1;
        let ticket = PageTicket {
            page: page.max(1),
            generation: self.generation,
        };
        self.pending = Some(ticket);
        ticket
    }

    pub fn is_current(&self, ticket: PageTicket) -> bool {
        self.pending == Some(ticket)
    }

    /// Replace the window wholesale with a response. A stale ticket or a
    /// page past the end leaves the window as it was.
    pub fn commit(&mut self, ticket: PageTicket, response: NotificationPage) -> LoadOutcome {
        if !self.is_current(ticket) {
            tracing::debug!(
                page = ticket.page,
                generation = ticket.generation,
                latest = self.generation,
                "Ignoring stale page load (generation mismatch)"
            );
            return LoadOutcome::Stale;
        }
        self.pending = None;

        if ticket.page > 1 && response.rows.is_empty() && response.total_records > 0 {
            tracing::debug!(
                page = ticket.page,
                total = response.total_records,
                "Page lies past the end of the feed, going back to page 1"
            );
            return LoadOutcome::PastEnd(1);
        }

        self.loaded_generation = Some(ticket.generation);
        self.state = if response.total_records == 0 && response.rows.is_empty() {
            PageState::Empty
        } else {
            PageState::Loaded(Arc::new(Page::new(ticket.page, self.page_size, response)))
        };
        LoadOutcome::Committed
    }

    /// A request failed. The previous window stays as it was. Returns
    /// whether the failure belongs to the current request (and so should be
    /// surfaced).
    pub fn fail(&mut self, ticket: PageTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Make every in-flight request stale (blur, unmount, sign-out).
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    /// Forget the window entirely.
    pub fn reset(&mut self) {
        self.invalidate();
        self.state = PageState::Unloaded;
        self.loaded_generation = None;
    }

    pub fn range_label(&self) -> Option<RangeLabel> {
        self.page().map(|p| RangeLabel {
            lower_bound: p.lower_bound(),
            row_count: p.displayed_count(),
            total_records: p.total_records(),
        })
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_page() > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.page()
            .is_some_and(|p| p.displayed_count() < p.total_records())
    }

    /// Swap in a derived snapshot of the current page (same window).
    pub fn replace_page(&mut self, page: Page) {
        self.state = PageState::Loaded(Arc::new(page));
    }

    /// Apply a server-confirmed delete of `deleted`.
    ///
    /// When the deletion emptied the window and either this is not page 1
    /// or records remain behind it, the caller is told to reload page 1.
    /// Otherwise the rows are dropped locally and the total shrinks by the
    /// deleted count.
    pub fn after_delete(
        &mut self,
        deleted: &BTreeSet<NotificationId>,
        was_full_page: bool,
    ) -> DeleteOutcome {
        let Some(page) = self.page().cloned() else {
            return DeleteOutcome::Reload(1);
        };

        let remaining_total = page.total_records().saturating_sub(deleted.len() as u64);
        if was_full_page && (page.number() > 1 || remaining_total > 0) {
            return DeleteOutcome::Reload(1);
        }

        let next = page.without(deleted);
        self.state = if next.total_records() == 0 {
            PageState::Empty
        } else {
            PageState::Loaded(Arc::new(next))
        };
        DeleteOutcome::Truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::test_support::{ids, notification};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn response(first: usize, rows: usize, total: u64) -> NotificationPage {
        NotificationPage {
            total_records: total,
            rows: (first..first + rows)
                .map(|i| notification(&format!("n{i}"), false))
                .collect(),
        }
    }

    fn loaded(page: u32, size: u32, rows: usize, total: u64) -> PaginationController {
        let mut pc = PaginationController::new(size);
        let t = pc.begin_load(page);
        let first = (page as usize - 1) * size as usize;
        assert_eq!(pc.commit(t, response(first, rows, total)), LoadOutcome::Committed);
        pc
    }

    #[test]
    fn test_scenario_first_page_of_25() {
        let pc = loaded(1, 10, 10, 25);
        assert_eq!(
            pc.range_label(),
            Some(RangeLabel {
                lower_bound: 1,
                row_count: 10,
                total_records: 25
            })
        );
        assert!(pc.can_go_next());
        assert!(!pc.can_go_prev());
    }

    #[test]
    fn test_last_partial_page() {
        let pc = loaded(3, 10, 5, 25);
        let label = pc.range_label().unwrap();
        assert_eq!(label.lower_bound, 21);
        assert_eq!(label.row_count, 25);
        assert!(!pc.can_go_next());
        assert!(pc.can_go_prev());
    }

    #[test]
    fn test_zero_total_is_empty_state() {
        let mut pc = PaginationController::new(10);
        let t = pc.begin_load(1);
        pc.commit(t, NotificationPage::empty());
        assert_eq!(pc.state(), &PageState::Empty);
        assert!(pc.range_label().is_none());
        assert!(!pc.can_go_next());
        assert!(!pc.can_go_prev());
    }

    #[test]
    fn test_stale_ticket_does_not_commit() {
        let mut pc = PaginationController::new(10);
        let first = pc.begin_load(2);
        let second = pc.begin_load(3);

        assert_eq!(pc.commit(second, response(20, 5, 25)), LoadOutcome::Committed);
        assert_eq!(pc.commit(first, response(10, 10, 25)), LoadOutcome::Stale);
        assert_eq!(pc.current_page(), 3);
        assert!(!pc.is_loading());
    }

    #[test]
    fn test_page_past_end_is_not_committed() {
        let mut pc = loaded(3, 10, 5, 25);
        let t = pc.begin_load(10);
        assert_eq!(pc.commit(t, response(90, 0, 25)), LoadOutcome::PastEnd(1));

        // Window and server total untouched.
        assert!(!pc.is_loading());
        assert_eq!(
            pc.range_label(),
            Some(RangeLabel {
                lower_bound: 21,
                row_count: 25,
                total_records: 25
            })
        );
    }

    #[test]
    fn test_later_page_of_empty_feed_is_empty_state() {
        let mut pc = loaded(2, 10, 10, 25);
        let t = pc.begin_load(2);
        assert_eq!(pc.commit(t, NotificationPage::empty()), LoadOutcome::Committed);
        assert_eq!(pc.state(), &PageState::Empty);
    }

    #[test]
    fn test_failure_keeps_previous_page() {
        let mut pc = loaded(1, 10, 10, 25);
        let before = pc.page().cloned();
        let t = pc.begin_load(2);
        assert!(pc.fail(t));
        assert_eq!(pc.page().cloned(), before);
        assert!(!pc.is_loading());
    }

    #[test]
    fn test_stale_failure_is_not_reported() {
        let mut pc = PaginationController::new(10);
        let old = pc.begin_load(1);
        let _new = pc.begin_load(2);
        assert!(!pc.fail(old));
        assert!(pc.is_loading());
    }

    #[test]
    fn test_invalidate_drops_pending() {
        let mut pc = PaginationController::new(10);
        let t = pc.begin_load(1);
        pc.invalidate();
        assert_eq!(pc.commit(t, response(0, 10, 25)), LoadOutcome::Stale);
        assert_eq!(pc.state(), &PageState::Unloaded);
    }

    #[test]
    fn test_full_page_delete_beyond_first_page_reloads() {
        let mut pc = loaded(2, 10, 10, 25);
        let all: BTreeSet<NotificationId> = pc.page().unwrap().ids().cloned().collect();
        assert_eq!(pc.after_delete(&all, true), DeleteOutcome::Reload(1));
        // Window untouched until the reload lands.
        assert_eq!(pc.current_page(), 2);
    }

    #[test]
    fn test_partial_delete_truncates_locally() {
        let mut pc = loaded(1, 10, 10, 25);
        let outcome = pc.after_delete(&ids(&["n2", "n3", "n7"]), false);
        assert_eq!(outcome, DeleteOutcome::Truncated);
        let page = pc.page().unwrap();
        assert_eq!(page.len(), 7);
        assert_eq!(page.total_records(), 22);
    }

    #[test]
    fn test_deleting_everything_on_only_page_is_empty() {
        let mut pc = loaded(1, 10, 3, 3);
        let outcome = pc.after_delete(&ids(&["n0", "n1", "n2"]), true);
        assert_eq!(outcome, DeleteOutcome::Truncated);
        assert_eq!(pc.state(), &PageState::Empty);
    }

    #[test]
    fn test_emptying_first_page_with_more_behind_reloads() {
        let mut pc = loaded(1, 2, 2, 5);
        let outcome = pc.after_delete(&ids(&["n0", "n1"]), true);
        assert_eq!(outcome, DeleteOutcome::Reload(1));
    }

    proptest! {
        #[test]
        fn prop_displayed_never_exceeds_total(
            page in 1u32..20,
            size in 1u32..50,
            rows in 0usize..60,
            total in 0u64..2000,
        ) {
            prop_assume!(page == 1 || rows > 0 || total == 0);
            let pc = loaded(page, size, rows, total);
            if let Some(label) = pc.range_label() {
                let shown = (rows as u64).min(u64::from(size));
                prop_assert_eq!(label.row_count, u64::from(page - 1) * u64::from(size) + shown);
                prop_assert!(label.row_count <= label.total_records);
                prop_assert_eq!(pc.can_go_next(), label.row_count < label.total_records);
            }
            prop_assert_eq!(pc.can_go_prev(), pc.current_page() > 1);
        }

        #[test]
        fn prop_local_delete_drops_exactly_k(
            rows in 1usize..20,
            extra in 0u64..100,
            picks in proptest::collection::vec(any::<bool>(), 20),
        ) {
            let total = rows as u64 + extra;
            let mut pc = loaded(1, 20, rows, total);
            let chosen: BTreeSet<NotificationId> = (0..rows)
                .filter(|i| picks[*i])
                .map(|i| NotificationId(format!("n{i}")))
                .collect();
            prop_assume!(!chosen.is_empty() && chosen.len() < rows);

            prop_assert_eq!(pc.after_delete(&chosen, false), DeleteOutcome::Truncated);
            let page = pc.page().unwrap();
            prop_assert_eq!(page.total_records(), total - chosen.len() as u64);
            prop_assert_eq!(page.len(), rows - chosen.len());
            prop_assert!(chosen.iter().all(|id| !page.contains(id)));
        }
    }
}
