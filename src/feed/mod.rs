//! Notification feed core.
//!
//! Synchronous building blocks that the [`store`](crate::store) composes:
//!
//! - [`model`] - Notifications, ids and the immutable [`Page`] window
//! - [`pagination`] - Which page is shown and which request may replace it
//! - [`selection`] - Checked rows and the tri-state select-all flag
//! - [`mutation`] - Batch read/unread/delete planning and counter deltas
//! - [`counter`] - The unread badge value and its refresh generations
//!
//! None of these perform I/O except [`mutation::execute`], which issues the
//! batched request through a [`Transport`](crate::api::Transport).

pub mod counter;
pub mod model;
pub mod mutation;
pub mod pagination;
pub mod selection;

pub use counter::CounterReconciler;
pub use model::{BookingId, Notification, NotificationId, NotificationPage, Page, UserId};
pub use mutation::{BatchMutationEngine, MutationKind, MutationPlan, MutationTicket, PlanError};
pub use pagination::{
    DeleteOutcome, LoadOutcome, PageState, PageTicket, PaginationController, RangeLabel,
};
pub use selection::{SelectAll, SelectionModel};
