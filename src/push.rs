//! Inbound push-notification payloads.

use crate::feed::{BookingId, NotificationId, UserId};
use serde::Deserialize;

/// Data block of a delivered push notification. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub booking_id: Option<BookingId>,
    pub user_id: Option<UserId>,
    pub notification_id: Option<NotificationId>,
}

/// What opening a push should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    /// Mark the one notification read, then open its booking.
    MarkReadThenOpen {
        user_id: UserId,
        notification_id: NotificationId,
        booking_id: BookingId,
    },
    /// Open the feed itself; no mutation.
    OpenFeed,
}

impl PushPayload {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// A booking with both the notification and user ids marks read then
    /// opens the booking; anything less opens the feed.
    pub fn action(&self) -> PushAction {
        match (&self.booking_id, &self.notification_id, &self.user_id) {
            (Some(booking_id), Some(notification_id), Some(user_id)) => {
                PushAction::MarkReadThenOpen {
                    user_id: user_id.clone(),
                    notification_id: notification_id.clone(),
                    booking_id: booking_id.clone(),
                }
            }
            _ => PushAction::OpenFeed,
        }
    }
}
