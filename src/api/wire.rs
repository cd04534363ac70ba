//! JSON envelopes exchanged with the backend.

use super::TransportError;
use crate::feed::{Notification, NotificationId, NotificationPage, UserId};
use serde::{Deserialize, Serialize};

/// Result of the current-session lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionView {
    Active {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    Unauthenticated,
    Unverified,
    Blacklisted,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationMeta {
    total_records: u64,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    pagination: Option<PaginationMeta>,
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
struct CountEnvelope {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct IdsBody<'a> {
    pub ids: &'a [NotificationId],
}

/// Decode a list response. Anything without pagination metadata is treated
/// as zero results so the screen still has a defined empty state.
pub(super) fn parse_list(body: &str) -> NotificationPage {
    match serde_json::from_str::<ListEnvelope>(body) {
        Ok(ListEnvelope {
            pagination: Some(meta),
            notifications,
        }) => NotificationPage {
            total_records: meta.total_records,
            rows: notifications,
        },
        Ok(_) => {
            tracing::warn!("List response has no pagination metadata, treating as empty");
            NotificationPage::empty()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed list response, treating as empty");
            NotificationPage::empty()
        }
    }
}

/// Decode `{ "count": n }`; negative counts clamp to zero.
pub(super) fn parse_count(body: &str) -> Result<u64, TransportError> {
    let envelope: CountEnvelope =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok(envelope.count.max(0) as u64)
}

/// Mutation acknowledgement: an empty body or `{"status": "ok"}`.
pub(super) fn parse_status(body: &str) -> Result<(), TransportError> {
    if body.trim().is_empty() {
        return Ok(());
    }
    let envelope: StatusEnvelope =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))?;
    if envelope.status.eq_ignore_ascii_case("ok") {
        Ok(())
    } else {
        Err(TransportError::Rejected(envelope.status))
    }
}

pub(super) fn parse_session(body: &str) -> Result<SessionView, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))
}
