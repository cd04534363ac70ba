//! The notification feed's view-state owner.
//!
//! [`NotificationStore`] is the only writer of the page window, the
//! selection and the unread counter. User actions start background calls on
//! the tokio runtime; each call reports back with exactly one [`FeedEvent`]
//! on the store's channel, and [`NotificationStore::handle_event`] commits it.
//!
//! Completions are tagged twice:
//!
//! - an epoch, bumped on every focus, blur, unmount and forced sign-out, so
//!   anything that finishes after the user has left is dropped silently
//! - a per-operation generation (page loads, counter refreshes) or ticket
//!   (mutations), so an older overlapping request never replaces a newer one

use crate::api::{Recovery, SessionSource, SessionView, Transport, TransportError};
use crate::config::{Config, CounterPolicy};
use crate::feed::mutation;
use crate::feed::{
    BatchMutationEngine, BookingId, CounterReconciler, DeleteOutcome, LoadOutcome, MutationKind,
    MutationPlan, MutationTicket, Notification, NotificationId, NotificationPage, Page, PageState, PageTicket,
    PaginationController, PlanError, RangeLabel, SelectAll, SelectionModel, UserId,
};
use crate::push::{PushAction, PushPayload};
use crate::session::{GateDecision, GateState, SessionGate, SignOutReason};
use futures::FutureExt;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Notices disappear after this long.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

static NO_CHECKS: BTreeSet<NotificationId> = BTreeSet::new();

/// Everything the store needs from the backend.
pub trait Backend: Transport + SessionSource + 'static {}

impl<T: Transport + SessionSource + 'static> Backend for T {}

// ============================================================================
// Public Types
// ============================================================================

/// Navigation the screen should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Booking(BookingId),
    Feed,
    SignIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub page_size: u32,
    pub counter_policy: CounterPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            counter_policy: CounterPolicy::Incremental,
        }
    }
}

impl From<&Config> for StoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            counter_policy: config.counter_policy,
        }
    }
}

/// A user action the store refused synchronously. Nothing was sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("The feed is not available for this session")]
    NotAdmitted,
    #[error("No page is loaded")]
    NoPage,
    #[error("A page is loading")]
    Loading,
    #[error("Page {0} is out of range")]
    PageOutOfRange(u32),
    #[error("Notification {0} is not on this page")]
    NotOnPage(NotificationId),
    #[error("Validation can only be resent for an unverified account")]
    NotUnverified,
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Completion of a background call.
#[derive(Debug)]
pub enum FeedEvent {
    SessionResolved {
        epoch: u64,
        result: Result<SessionView, TransportError>,
    },
    PageLoaded {
        epoch: u64,
        ticket: PageTicket,
        result: Result<NotificationPage, TransportError>,
    },
    CounterRefreshed {
        epoch: u64,
        generation: u64,
        result: Result<u64, TransportError>,
    },
    /// A batch mutation answered. `then` is the navigation to perform once
    /// it has (tap-to-open, push).
    MutationCompleted {
        epoch: u64,
        ticket: MutationTicket,
        then: Option<Route>,
        result: Result<(), TransportError>,
    },
    ValidationResent {
        epoch: u64,
        result: Result<(), TransportError>,
    },
    SignedOut {
        result: Result<(), TransportError>,
    },
    TaskPanicked {
        task: &'static str,
        error: String,
    },
}

/// Non-blocking message for a toast.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: Cow<'static, str>,
    pub raised_at: Instant,
}

/// One list row as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub notification: Notification,
    pub selected: bool,
}

/// Read-only snapshot handed to the screen.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub gate: GateState,
    pub page: PageState,
    pub rows: Vec<FeedRow>,
    pub range: Option<RangeLabel>,
    pub can_go_prev: bool,
    pub can_go_next: bool,
    pub select_all: SelectAll,
    pub checked: Vec<NotificationId>,
    pub unread_count: u64,
    pub loading: bool,
}

// ============================================================================
// Store
// ============================================================================

pub struct NotificationStore<B: Backend> {
    backend: Arc<B>,
    settings: StoreSettings,
    tx: mpsc::Sender<FeedEvent>,

    epoch: u64,
    focused: bool,
    /// Spawned calls whose event has not been handled yet.
    in_flight: usize,

    gate: SessionGate,
    pagination: PaginationController,
    selection: SelectionModel,
    mutations: BatchMutationEngine,
    counter: CounterReconciler,

    route: Option<Route>,
    notice: Option<Notice>,
}

impl<B: Backend> NotificationStore<B> {
    pub fn new(backend: Arc<B>, settings: StoreSettings, tx: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            backend,
            settings,
            tx,
            epoch: 0,
            focused: false,
            in_flight: 0,
            gate: SessionGate::new(),
            pagination: PaginationController::new(settings.page_size),
            selection: SelectionModel::new(),
            mutations: BatchMutationEngine::new(),
            counter: CounterReconciler::new(),
            route: None,
            notice: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn gate_state(&self) -> &GateState {
        self.gate.state()
    }

    pub fn page_state(&self) -> &PageState {
        self.pagination.state()
    }

    pub fn page(&self) -> Option<Arc<Page>> {
        self.pagination.page().cloned()
    }

    pub fn range_label(&self) -> Option<RangeLabel> {
        self.pagination.range_label()
    }

    pub fn can_go_prev(&self) -> bool {
        self.pagination.can_go_prev()
    }

    pub fn can_go_next(&self) -> bool {
        self.pagination.can_go_next()
    }

    /// Checked rows. Empty while a page load is pending: the checks are
    /// dropped when it commits and come back if it fails.
    pub fn checked_ids(&self) -> &BTreeSet<NotificationId> {
        if self.pagination.is_loading() {
            &NO_CHECKS
        } else {
            self.selection.checked_ids()
        }
    }

    pub fn unread_count(&self) -> u64 {
        self.counter.value()
    }

    /// Badge feed for the header; updates on every counter change.
    pub fn counter_receiver(&self) -> watch::Receiver<u64> {
        self.counter.subscribe()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// No background call is outstanding.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    pub fn take_route(&mut self) -> Option<Route> {
        self.route.take()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Returns true if a notice was actually cleared.
    pub fn clear_expired_notice(&mut self) -> bool {
        if let Some(notice) = &self.notice {
            if notice.raised_at.elapsed() >= NOTICE_TTL {
                self.notice = None;
                return true;
            }
        }
        false
    }

    pub fn view(&self) -> FeedView {
        let checks_shown = !self.pagination.is_loading();
        let (rows, select_all) = match self.pagination.page() {
            Some(page) => (
                page.rows()
                    .iter()
                    .map(|n| FeedRow {
                        notification: n.clone(),
                        selected: checks_shown && self.selection.is_checked(&n.id),
                    })
                    .collect(),
                if checks_shown {
                    self.selection.tri_state(page)
                } else {
                    SelectAll::None
                },
            ),
            None => (Vec::new(), SelectAll::None),
        };

        FeedView {
            gate: self.gate.state().clone(),
            page: self.pagination.state().clone(),
            rows,
            range: self.pagination.range_label(),
            can_go_prev: self.pagination.can_go_prev(),
            can_go_next: self.pagination.can_go_next(),
            select_all,
            checked: self.checked_ids().iter().cloned().collect(),
            unread_count: self.counter.value(),
            loading: self.pagination.is_loading(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Screen entry or re-focus: resolve the session again. Admission
    /// reloads the current page and refreshes the counter.
    pub fn focus(&mut self) {
        self.epoch += 1;
        self.focused = true;
        self.gate.begin();

        let backend = Arc::clone(&self.backend);
        let epoch = self.epoch;
        self.spawn("session", async move {
            FeedEvent::SessionResolved {
                epoch,
                result: backend.current_session().await,
            }
        });
    }

    /// Screen lost focus. In-flight completions will be dropped.
    pub fn blur(&mut self) {
        self.focused = false;
        self.abandon_in_flight();
    }

    /// Screen is gone. Like [`blur`](Self::blur) and forgets the window.
    pub fn unmount(&mut self) {
        self.blur();
        self.pagination.reset();
        self.selection.clear();
        self.route = None;
        self.notice = None;
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    /// Request page `page`. The current window stays until the response lands.
    pub fn load_page(&mut self, page: u32) -> Result<(), StoreError> {
        let user = self.admitted_user()?;
        self.request_page(user, page);
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.load_page(self.pagination.current_page())
    }

    pub fn next_page(&mut self) -> Result<(), StoreError> {
        let next = self.pagination.current_page() + 1;
        if !self.pagination.can_go_next() {
            return Err(StoreError::PageOutOfRange(next));
        }
        self.load_page(next)
    }

    pub fn prev_page(&mut self) -> Result<(), StoreError> {
        let current = self.pagination.current_page();
        if !self.pagination.can_go_prev() {
            return Err(StoreError::PageOutOfRange(current.saturating_sub(1)));
        }
        self.load_page(current - 1)
    }

    // ------------------------------------------------------------------
    // Counter
    // ------------------------------------------------------------------

    pub fn refresh_counter(&mut self) -> Result<(), StoreError> {
        let user = self.admitted_user()?;
        self.request_counter(user);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn toggle(&mut self, id: &NotificationId) -> Result<(), StoreError> {
        let page = self.checkable_page()?;
        if self.selection.toggle(id, &page) {
            Ok(())
        } else {
            Err(StoreError::NotOnPage(id.clone()))
        }
    }

    pub fn toggle_all(&mut self) -> Result<(), StoreError> {
        let page = self.checkable_page()?;
        self.selection.toggle_all(&page);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn mark_read<I>(&mut self, ids: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = NotificationId>,
    {
        self.mutate(MutationKind::MarkRead, ids.into_iter().collect())
    }

    pub fn mark_unread<I>(&mut self, ids: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = NotificationId>,
    {
        self.mutate(MutationKind::MarkUnread, ids.into_iter().collect())
    }

    pub fn delete<I>(&mut self, ids: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = NotificationId>,
    {
        self.mutate(MutationKind::Delete, ids.into_iter().collect())
    }

    /// Run `kind` over the checked rows.
    pub fn mutate_selection(&mut self, kind: MutationKind) -> Result<(), StoreError> {
        let ids = self.checked_ids().clone();
        self.mutate(kind, ids)
    }

    /// Tap on a row. Unread rows are marked read first; the booking opens
    /// once the server has answered. Read rows open immediately.
    pub fn open(&mut self, id: &NotificationId) -> Result<(), StoreError> {
        let page = self.pagination.page().cloned().ok_or(StoreError::NoPage)?;
        let row = page
            .row(id)
            .ok_or_else(|| StoreError::NotOnPage(id.clone()))?;
        let then = row.booking_id.clone().map(Route::Booking);

        if row.read {
            if then.is_some() {
                self.route = then;
            }
            return Ok(());
        }

        let user = self.admitted_user()?;
        self.issue_mutation(user, MutationKind::MarkRead, BTreeSet::from([id.clone()]), then)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Push / session actions
    // ------------------------------------------------------------------

    /// A push notification was opened.
    pub fn handle_push(&mut self, payload: &PushPayload) {
        match payload.action() {
            PushAction::MarkReadThenOpen {
                user_id,
                notification_id,
                booking_id,
            } => {
                tracing::debug!(
                    notification_id = %notification_id,
                    booking_id = %booking_id,
                    "Push opened, marking read before navigation"
                );
                let then = Some(Route::Booking(booking_id.clone()));
                if let Err(e) = self.issue_mutation(
                    user_id,
                    MutationKind::MarkRead,
                    BTreeSet::from([notification_id]),
                    then,
                ) {
                    tracing::warn!(error = %e, "Push mark-read not issued");
                    self.route = Some(Route::Booking(booking_id));
                }
            }
            PushAction::OpenFeed => {
                self.route = Some(Route::Feed);
            }
        }

        if let Some(user) = self.active_user() {
            self.request_counter(user);
        }
    }

    pub fn resend_validation(&mut self) -> Result<(), StoreError> {
        if !self.focused || self.gate.state() != &GateState::Unverified {
            return Err(StoreError::NotUnverified);
        }
        let backend = Arc::clone(&self.backend);
        let epoch = self.epoch;
        self.spawn("resend_validation", async move {
            FeedEvent::ValidationResent {
                epoch,
                result: backend.resend_validation().await,
            }
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    /// Commit one completion. Stale completions change nothing.
    pub fn handle_event(&mut self, event: FeedEvent) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match event {
            FeedEvent::SessionResolved { epoch, result } => {
                if self.is_stale(epoch, "session") {
                    return;
                }
                self.on_session_resolved(result);
            }
            FeedEvent::PageLoaded {
                epoch,
                ticket,
                result,
            } => {
                if self.is_stale(epoch, "page_load") {
                    return;
                }
                self.on_page_loaded(ticket, result);
            }
            FeedEvent::CounterRefreshed {
                epoch,
                generation,
                result,
            } => {
                if self.is_stale(epoch, "counter_refresh") {
                    return;
                }
                self.on_counter_refreshed(generation, result);
            }
            FeedEvent::MutationCompleted {
                epoch,
                ticket,
                then,
                result,
            } => {
                if self.is_stale(epoch, "mutation") {
                    // Feed state is rebuilt on the next focus, but a pending
                    // navigation (push opened off-screen) still happens.
                    let auth_failed = matches!(&result, Err(e) if e.is_auth_failure());
                    if then.is_some() && !auth_failed && self.route.is_none() {
                        self.route = then;
                    }
                    return;
                }
                self.on_mutation_completed(ticket, then, result);
            }
            FeedEvent::ValidationResent { epoch, result } => {
                if self.is_stale(epoch, "resend_validation") {
                    return;
                }
                match result {
                    Ok(()) => self.set_notice("Validation email sent"),
                    Err(e) => self.recover(e, "resend the validation email"),
                }
            }
            FeedEvent::SignedOut { result } => match result {
                Ok(()) => tracing::info!("Signed out"),
                Err(e) => tracing::warn!(error = %e, "Server sign-out failed, local session cleared"),
            },
            FeedEvent::TaskPanicked { task, error } => {
                tracing::error!(task, error = %error, "Background task panicked");
                self.set_notice(format!("Internal error in {} task", task));
            }
        }
    }

    /// Handle events until every outstanding call has reported back.
    pub async fn settle(&mut self, rx: &mut mpsc::Receiver<FeedEvent>) {
        while !self.is_idle() {
            match rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    fn on_session_resolved(&mut self, result: Result<SessionView, TransportError>) {
        match self.gate.resolve(result) {
            GateDecision::Admit(user) => {
                tracing::info!(user_id = %user, "Session admitted to feed");
                self.request_page(user.clone(), self.pagination.current_page());
                self.request_counter(user);
            }
            GateDecision::Blocked => {
                tracing::info!("Account unverified, feed blocked");
            }
            GateDecision::SignOut(reason) => self.force_sign_out(reason),
        }
    }

    fn on_page_loaded(
        &mut self,
        ticket: PageTicket,
        result: Result<NotificationPage, TransportError>,
    ) {
        match result {
            Ok(response) => {
                let rows = response.rows.len();
                match self.pagination.commit(ticket, response) {
                    LoadOutcome::Committed => {
                        self.selection.clear();
                        tracing::debug!(page = ticket.page, rows, "Page loaded");
                    }
                    LoadOutcome::Stale => {}
                    LoadOutcome::PastEnd(page) => {
                        if let Some(user) = self.active_user() {
                            self.request_page(user, page);
                        }
                    }
                }
            }
            Err(e) => {
                if !self.pagination.fail(ticket) {
                    tracing::debug!(page = ticket.page, error = %e, "Ignoring stale page failure");
                    return;
                }
                self.recover(e, "load notifications");
            }
        }
    }

    fn on_counter_refreshed(&mut self, generation: u64, result: Result<u64, TransportError>) {
        match result {
            Ok(count) => {
                self.counter.commit_refresh(generation, count);
            }
            Err(e) => {
                if self.counter.fail_refresh(generation) {
                    self.recover(e, "refresh the unread count");
                }
            }
        }
    }

    fn on_mutation_completed(
        &mut self,
        ticket: MutationTicket,
        then: Option<Route>,
        result: Result<(), TransportError>,
    ) {
        let Some(plan) = self.mutations.finish(ticket) else {
            tracing::debug!(?ticket, "Ignoring completion of abandoned mutation");
            return;
        };

        match result {
            Ok(()) => {
                self.apply_confirmed(plan);
                if then.is_some() {
                    self.route = then;
                }
            }
            Err(e) => {
                tracing::warn!(kind = ?plan.kind, count = plan.ids.len(), error = %e, "Batch mutation failed");
                let signs_out = e.recovery() == Recovery::SignOut;
                self.recover(e, plan.kind.verb());
                if !signs_out && then.is_some() {
                    self.route = then;
                }
            }
        }
    }

    /// Write the effect of a server-confirmed mutation.
    ///
    /// In the window the plan was made against, the plan is re-read against
    /// the current rows first, so overlapping mutations of the same rows
    /// move the badge once. In any other window the plan-time delta is kept
    /// and the counter refreshed.
    fn apply_confirmed(&mut self, plan: MutationPlan) {
        let same_window = plan.page_generation.is_some()
            && plan.page_generation == self.pagination.loaded_generation();
        let plan = if same_window {
            plan.rebase(self.pagination.page().map(|p| &**p))
        } else {
            plan
        };

        let delta = plan.counter_delta();
        let badge = self.counter.apply_delta(delta);
        tracing::info!(
            kind = ?plan.kind,
            count = plan.ids.len(),
            delta,
            badge,
            "Batch mutation confirmed"
        );

        match plan.kind {
            MutationKind::MarkRead | MutationKind::MarkUnread => {
                if let Some(page) = self.pagination.page().cloned() {
                    self.pagination.replace_page(plan.apply_flags(&page));
                }
                self.selection.deselect(&plan.ids);
            }
            MutationKind::Delete if same_window && plan.ids.is_empty() => {
                tracing::debug!("Delete confirmed for rows already removed");
            }
            MutationKind::Delete if same_window => {
                match self.pagination.after_delete(&plan.ids, plan.was_full_page) {
                    DeleteOutcome::Truncated => {
                        if let Some(page) = self.pagination.page().cloned() {
                            self.selection.retain(&page);
                        } else {
                            self.selection.clear();
                        }
                    }
                    DeleteOutcome::Reload(page) => {
                        self.selection.clear();
                        if let Some(user) = self.active_user() {
                            self.request_page(user, page);
                        }
                    }
                }
            }
            MutationKind::Delete => {
                self.selection.deselect(&plan.ids);
                if self.pagination.page().is_some() {
                    // The window changed while the delete was in flight.
                    if let Some(user) = self.active_user() {
                        self.request_page(user, self.pagination.current_page());
                    }
                }
            }
        }

        // Another window, or a refresh still in flight, may or may not
        // include this mutation.
        let refresh = plan.unknown > 0
            || !same_window
            || self.counter.is_refreshing()
            || self.settings.counter_policy == CounterPolicy::Refresh;
        if refresh {
            if let Some(user) = self.active_user() {
                self.request_counter(user);
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// The page toggles act on. Checks are frozen while a load is pending.
    fn checkable_page(&self) -> Result<Arc<Page>, StoreError> {
        let page = self.pagination.page().cloned().ok_or(StoreError::NoPage)?;
        if self.pagination.is_loading() {
            return Err(StoreError::Loading);
        }
        Ok(page)
    }

    fn admitted_user(&self) -> Result<UserId, StoreError> {
        self.active_user().ok_or(StoreError::NotAdmitted)
    }

    fn active_user(&self) -> Option<UserId> {
        if self.focused {
            self.gate.user_id().cloned()
        } else {
            None
        }
    }

    fn is_stale(&self, epoch: u64, what: &'static str) -> bool {
        if epoch != self.epoch || !self.focused {
            tracing::debug!(
                event = what,
                epoch,
                current = self.epoch,
                focused = self.focused,
                "Dropping completion from an earlier visit"
            );
            return true;
        }
        false
    }

    fn abandon_in_flight(&mut self) {
        self.epoch += 1;
        self.pagination.invalidate();
        self.counter.invalidate();
        self.mutations.clear();
    }

    fn request_page(&mut self, user: UserId, page: u32) {
        let ticket = self.pagination.begin_load(page);
        tracing::debug!(page = ticket.page, generation = ticket.generation, "Loading page");

        let backend = Arc::clone(&self.backend);
        let epoch = self.epoch;
        let page_size = self.settings.page_size;
        self.spawn("page_load", async move {
            let result = backend
                .list_notifications(&user, ticket.page, page_size)
                .await;
            FeedEvent::PageLoaded {
                epoch,
                ticket,
                result,
            }
        });
    }

    fn request_counter(&mut self, user: UserId) {
        let generation = self.counter.begin_refresh();
        let backend = Arc::clone(&self.backend);
        let epoch = self.epoch;
        self.spawn("counter_refresh", async move {
            FeedEvent::CounterRefreshed {
                epoch,
                generation,
                result: backend.unread_count(&user).await,
            }
        });
    }

    fn mutate(&mut self, kind: MutationKind, ids: BTreeSet<NotificationId>) -> Result<(), StoreError> {
        let user = self.admitted_user()?;
        self.issue_mutation(user, kind, ids, None)?;
        Ok(())
    }

    fn issue_mutation(
        &mut self,
        user: UserId,
        kind: MutationKind,
        ids: BTreeSet<NotificationId>,
        then: Option<Route>,
    ) -> Result<MutationTicket, StoreError> {
        let plan = MutationPlan::new(
            kind,
            ids,
            self.pagination.page().map(|p| &**p),
            self.pagination.loaded_generation(),
        )?;
        let ids: Vec<NotificationId> = plan.ids.iter().cloned().collect();
        let ticket = self.mutations.begin(plan);
        tracing::debug!(?kind, count = ids.len(), "Issuing batch mutation");

        let backend = Arc::clone(&self.backend);
        let epoch = self.epoch;
        self.spawn("mutation", async move {
            let result = mutation::execute(backend.as_ref(), &user, kind, &ids).await;
            FeedEvent::MutationCompleted {
                epoch,
                ticket,
                then,
                result,
            }
        });
        Ok(ticket)
    }

    /// Apply the single failure policy: auth failures sign out, the rest
    /// become a notice with state left as it was.
    fn recover(&mut self, error: TransportError, action: &'static str) {
        match error.recovery() {
            Recovery::SignOut => {
                tracing::error!(error = %error, action, "Auth failure, forcing sign-out");
                self.force_sign_out(SignOutReason::Expired);
            }
            Recovery::Notice => {
                tracing::warn!(error = %error, action, "Feed call failed");
                self.set_notice(format!("Couldn't {}: {}", action, error));
            }
        }
    }

    fn force_sign_out(&mut self, reason: SignOutReason) {
        tracing::warn!(?reason, "Signing out");
        self.abandon_in_flight();
        if reason == SignOutReason::Expired {
            self.gate.expire();
        }
        self.pagination.reset();
        self.selection.clear();
        self.counter.reset();
        self.route = Some(Route::SignIn);

        let backend = Arc::clone(&self.backend);
        self.spawn("sign_out", async move {
            FeedEvent::SignedOut {
                result: backend.sign_out().await,
            }
        });
    }

    fn set_notice(&mut self, message: impl Into<Cow<'static, str>>) {
        self.notice = Some(Notice {
            message: message.into(),
            raised_at: Instant::now(),
        });
    }

    /// Run `work` on the runtime; its event (or a panic report) always
    /// comes back on the channel.
    fn spawn<F>(&mut self, task: &'static str, work: F)
    where
        F: Future<Output = FeedEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match catch_task_panic(work).await {
                Ok(event) => event,
                Err(error) => FeedEvent::TaskPanicked { task, error },
            };
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, task, "Channel send failed (receiver dropped)");
            }
        });
    }
}

/// Run `future`, turning a panic into its message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
