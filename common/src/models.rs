// Data models shared across the dispatcher components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Push notification title applied to every dispatched reminder.
pub const REMINDER_TITLE: &str = "Scheduled Reminder";

/// A notification record persisted by an external producer and dispatched
/// by this service once its due time has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledNotification {
    /// Store-assigned identifier
    pub id: Uuid,
    /// Due time; the record becomes eligible once `timestamp <= now`
    pub timestamp: DateTime<Utc>,
    /// Freeform text body delivered to the recipient
    pub message: String,
    /// Opaque device token identifying the delivery destination
    pub fcm_token: String,
    /// When the record was created by the producer
    pub created_at: DateTime<Utc>,
}

impl ScheduledNotification {
    /// Whether this record is eligible for dispatch at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.timestamp <= now
    }
}

/// A single push message submitted to the push collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Destination device token
    pub token: String,
}

impl PushMessage {
    /// Build the reminder message for a due notification record
    pub fn reminder(notification: &ScheduledNotification) -> Self {
        Self {
            title: REMINDER_TITLE.to_string(),
            body: notification.message.clone(),
            token: notification.fcm_token.clone(),
        }
    }
}

/// Per-message delivery result surfaced by the push collaborator.
///
/// Consumed for logging and metrics only; the dispatch cycle never branches
/// on it when deciding which records to delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(token: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Result of one dispatch cycle invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Number of messages handed to the push collaborator (0 if none were due)
    pub sent: usize,
    /// Number of records successfully removed from the store
    pub deleted: usize,
    /// Number of delete attempts that failed; these records will be observed
    /// again on the next cycle
    pub delete_failures: usize,
}

impl DispatchSummary {
    pub fn any_sent(&self) -> bool {
        self.sent > 0
    }
}
