use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque server-assigned notification identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

/// Booking a notification refers to (tap-to-open target).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

/// Account the feed belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

macro_rules! string_id {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            impl From<String> for $name {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }

            impl $name {
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }
        )*
    };
}

string_id!(NotificationId, BookingId, UserId);

// ============================================================================
// Notification
// ============================================================================

/// A server-originated feed event as delivered by the list endpoint.
///
/// The client-only `selected` flag is not part of this type; it lives in
/// [`SelectionModel`](super::SelectionModel) and is joined in at view time
/// so a page reload can never carry it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
}

/// One list response: the server's authoritative total plus this page's rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPage {
    pub total_records: u64,
    pub rows: Vec<Notification>,
}

impl NotificationPage {
    /// The zero-result page used for empty and malformed envelopes.
    pub fn empty() -> Self {
        Self::default()
    }
}

// ============================================================================
// Page
// ============================================================================

/// Immutable page window. Every change produces a new `Page`; holders of an
/// older `Arc<Page>` keep seeing the snapshot they were handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    number: u32,
    size: u32,
    total_records: u64,
    rows: Vec<Notification>,
}

impl Page {
    /// Build a page from a list response.
    ///
    /// Rows beyond `size` are dropped and a total smaller than the displayed
    /// count is raised to it, so `displayed_count() <= total_records()` holds
    /// whatever the server sent.
    pub fn new(number: u32, size: u32, response: NotificationPage) -> Self {
        let number = number.max(1);
        let size = size.max(1);
        let mut rows = response.rows;
        if rows.len() > size as usize {
            tracing::warn!(
                page = number,
                page_size = size,
                received = rows.len(),
                "Server returned more rows than the page size, truncating"
            );
            rows.truncate(size as usize);
        }
        let displayed = u64::from(number - 1) * u64::from(size) + rows.len() as u64;
        let total_records = if response.total_records < displayed {
            tracing::warn!(
                page = number,
                total = response.total_records,
                displayed,
                "Server total is below the displayed row count, raising it"
            );
            displayed
        } else {
            response.total_records
        };

        Self {
            number,
            size,
            total_records,
            rows,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn rows(&self) -> &[Notification] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 1-based index of the first row on this page.
    pub fn lower_bound(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size) + 1
    }

    /// Rows shown so far, counting every earlier page as full.
    pub fn displayed_count(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size) + self.rows.len() as u64
    }

    pub fn row(&self, id: &NotificationId) -> Option<&Notification> {
        self.rows.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.row(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NotificationId> {
        self.rows.iter().map(|n| &n.id)
    }

    /// Copy of this page with `read` set on every row in `ids`.
    pub fn with_read(&self, ids: &BTreeSet<NotificationId>, read: bool) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|n| {
                if ids.contains(&n.id) && n.read != read {
                    Notification {
                        read,
                        ..n.clone()
                    }
                } else {
                    n.clone()
                }
            })
            .collect();
        Self {
            rows,
            ..self.clone_header()
        }
    }

    /// Copy of this page without the rows in `ids`; the total drops by
    /// `ids.len()` (every id was deleted server-side, shown here or not).
    pub fn without(&self, ids: &BTreeSet<NotificationId>) -> Self {
        let rows: Vec<Notification> = self
            .rows
            .iter()
            .filter(|n| !ids.contains(&n.id))
            .cloned()
            .collect();
        let total_records = self
            .total_records
            .saturating_sub(ids.len() as u64)
            .max(u64::from(self.number - 1) * u64::from(self.size) + rows.len() as u64);
        Self {
            number: self.number,
            size: self.size,
            total_records,
            rows,
        }
    }

    fn clone_header(&self) -> Self {
        Self {
            number: self.number,
            size: self.size,
            total_records: self.total_records,
            rows: Vec::new(),
        }
    }
}
