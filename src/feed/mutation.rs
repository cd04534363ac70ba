//! Batch read/unread/delete.
//!
//! A mutation is planned against the page the user is looking at, sent as a
//! single batched request, and only applied locally once the server has
//! confirmed it. Nothing is written ahead of confirmation, so a rejected
//! batch leaves every row untouched.

use super::model::{NotificationId, Page, UserId};
use crate::api::{Transport, TransportError};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    MarkRead,
    MarkUnread,
    Delete,
}

impl MutationKind {
    /// Short verb for notices ("Couldn't mark as read: ...").
    pub fn verb(&self) -> &'static str {
        match self {
            MutationKind::MarkRead => "mark as read",
            MutationKind::MarkUnread => "mark as unread",
            MutationKind::Delete => "delete",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("No notifications selected")]
    EmptySelection,
}

/// A mutation as issued, with the local facts captured before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub ids: BTreeSet<NotificationId>,
    /// Ids on the page that were unread when the call was issued.
    pub prior_unread: usize,
    /// Ids on the page that were read when the call was issued.
    pub prior_read: usize,
    /// Ids not on the page; their prior state is unknown to the client.
    pub unknown: usize,
    /// Ids that were on the page when the plan was made.
    pub on_page: BTreeSet<NotificationId>,
    /// Generation of the page window the plan was made against.
    pub page_generation: Option<u64>,
    /// The ids cover every row of a non-empty page.
    pub was_full_page: bool,
}

impl MutationPlan {
    pub fn new(
        kind: MutationKind,
        ids: BTreeSet<NotificationId>,
        page: Option<&Page>,
        page_generation: Option<u64>,
    ) -> Result<Self, PlanError> {
        if ids.is_empty() {
            return Err(PlanError::EmptySelection);
        }
        Ok(Self::tally(kind, ids, page, page_generation))
    }

    /// Re-read the plan against the page as it stands at confirmation.
    ///
    /// Earlier confirmations in the same window have already patched the
    /// row flags, so a second mark-read of a row that is now read counts
    /// zero. Rows that were on the page when the plan was made but are gone
    /// now were removed by an earlier confirmed delete and drop out.
    pub fn rebase(&self, page: Option<&Page>) -> Self {
        let ids = self
            .ids
            .iter()
            .filter(|id| !self.on_page.contains(*id) || page.is_some_and(|p| p.contains(id)))
            .cloned()
            .collect();
        Self::tally(self.kind, ids, page, self.page_generation)
    }

    fn tally(
        kind: MutationKind,
        ids: BTreeSet<NotificationId>,
        page: Option<&Page>,
        page_generation: Option<u64>,
    ) -> Self {
        let (mut prior_unread, mut prior_read, mut unknown) = (0, 0, 0);
        let mut on_page = BTreeSet::new();
        for id in &ids {
            match page.and_then(|p| p.row(id)) {
                Some(n) => {
                    on_page.insert(id.clone());
                    if n.read {
                        prior_read += 1;
                    } else {
                        prior_unread += 1;
                    }
                }
                None => unknown += 1,
            }
        }
        let was_full_page =
            page.is_some_and(|p| !p.is_empty() && p.ids().all(|id| ids.contains(id)));

        Self {
            kind,
            ids,
            prior_unread,
            prior_read,
            unknown,
            on_page,
            page_generation,
            was_full_page,
        }
    }

    /// Badge adjustment once the server has confirmed this plan.
    pub fn counter_delta(&self) -> i64 {
        match self.kind {
            MutationKind::MarkRead | MutationKind::Delete => -(self.prior_unread as i64),
            MutationKind::MarkUnread => self.prior_read as i64,
        }
    }

    /// Read/unread effect on a page snapshot. Deletes go through
    /// [`PaginationController::after_delete`](super::PaginationController::after_delete).
    pub fn apply_flags(&self, page: &Page) -> Page {
        match self.kind {
            MutationKind::MarkRead => page.with_read(&self.ids, true),
            MutationKind::MarkUnread => page.with_read(&self.ids, false),
            MutationKind::Delete => page.clone(),
        }
    }
}

/// Handle for an issued mutation; its completion hands it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationTicket(u64);

/// Tracks issued mutations until the server answers.
#[derive(Debug, Default)]
pub struct BatchMutationEngine {
    next: u64,
    in_flight: HashMap<MutationTicket, MutationPlan>,
}

impl BatchMutationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, plan: MutationPlan) -> MutationTicket {
        self.next += 1;
        let ticket = MutationTicket(self.next);
        self.in_flight.insert(ticket, plan);
        ticket
    }

    /// Take the plan back for a completed call. `None` if it was abandoned.
    pub fn finish(&mut self, ticket: MutationTicket) -> Option<MutationPlan> {
        self.in_flight.remove(&ticket)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget every outstanding plan; their completions will be ignored.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}

/// Issue the single batched request for `kind`.
pub async fn execute<T>(
    transport: &T,
    user: &UserId,
    kind: MutationKind,
    ids: &[NotificationId],
) -> Result<(), TransportError>
where
    T: Transport + ?Sized,
{
    match kind {
        MutationKind::MarkRead => transport.mark_read(user, ids).await,
        MutationKind::MarkUnread => transport.mark_unread(user, ids).await,
        MutationKind::Delete => transport.delete_notifications(user, ids).await,
    }
}
