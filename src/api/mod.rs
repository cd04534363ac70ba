//! Backend contracts consumed by the feed.
//!
//! - [`Transport`] - list, counter and batch mutation calls
//! - [`SessionSource`] - current-session lookup, sign-out and the
//!   resend-validation action for unverified accounts
//! - [`HttpTransport`] - the reqwest implementation of both
//!
//! Endpoint naming lives entirely inside [`http`]; the rest of the crate only
//! sees the traits.

mod error;
mod http;
mod wire;

pub use error::{Recovery, TransportError};
pub use http::HttpTransport;
pub use wire::SessionView;

use crate::feed::{NotificationId, NotificationPage, UserId};
use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + Sync {
    /// One page of the user's feed. Empty or malformed envelopes come back
    /// as [`NotificationPage::empty`], not as an error.
    async fn list_notifications(
        &self,
        user: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage, TransportError>;

    async fn unread_count(&self, user: &UserId) -> Result<u64, TransportError>;

    async fn mark_read(&self, user: &UserId, ids: &[NotificationId])
        -> Result<(), TransportError>;

    async fn mark_unread(
        &self,
        user: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), TransportError>;

    async fn delete_notifications(
        &self,
        user: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_session(&self) -> Result<SessionView, TransportError>;

    /// Clear persisted session state server- and client-side.
    async fn sign_out(&self) -> Result<(), TransportError>;

    async fn resend_validation(&self) -> Result<(), TransportError>;
}
