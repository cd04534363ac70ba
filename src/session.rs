//! Session gate: decides, once per visit, whether the feed may run.

use crate::api::{SessionView, TransportError};
use crate::feed::UserId;

/// Gate state for the current visit. Every state except `Loading` is
/// terminal until the next [`SessionGate::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Loading,
    Active { user_id: UserId },
    Unauthenticated,
    Unverified,
    Blacklisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    Unauthenticated,
    Blacklisted,
    /// A feed call came back with an auth failure mid-visit.
    Expired,
}

/// What the store must do once the gate has resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the feed pipeline for this user.
    Admit(UserId),
    /// Feed blocked; offer the resend-validation action.
    Blocked,
    /// Clear the session and redirect, no further feed work.
    SignOut(SignOutReason),
}

#[derive(Debug, Clone)]
pub struct SessionGate {
    state: GateState,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Loading,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Start a new visit (screen entry or re-focus).
    pub fn begin(&mut self) {
        self.state = GateState::Loading;
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match &self.state {
            GateState::Active { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, GateState::Active { .. })
    }

    /// Resolve the lookup. A failed lookup fails closed as unauthenticated.
    pub fn resolve(&mut self, lookup: Result<SessionView, TransportError>) -> GateDecision {
        let view = match lookup {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, treating as unauthenticated");
                SessionView::Unauthenticated
            }
        };

        let (state, decision) = match view {
            SessionView::Active { user_id } => (
                GateState::Active {
                    user_id: user_id.clone(),
                },
                GateDecision::Admit(user_id),
            ),
            SessionView::Unverified => (GateState::Unverified, GateDecision::Blocked),
            SessionView::Unauthenticated => (
                GateState::Unauthenticated,
                GateDecision::SignOut(SignOutReason::Unauthenticated),
            ),
            SessionView::Blacklisted => (
                GateState::Blacklisted,
                GateDecision::SignOut(SignOutReason::Blacklisted),
            ),
        };
        self.state = state;
        decision
    }

    /// Mid-visit auth failure: the session is gone for the rest of the visit.
    pub fn expire(&mut self) {
        self.state = GateState::Unauthenticated;
    }
}
