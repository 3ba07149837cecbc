//! Notification rows backing the unread counter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notification row as stored by the backend
///
/// Only the fields the realtime layer inspects are modeled; unknown fields
/// in the wire payload are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRow {
	pub id: Uuid,
	/// Recipient the subscription is scoped to
	pub user_id: Uuid,
	/// Notification kind, e.g. "mention", "club_invite"
	pub kind: String,
	pub is_read: bool,
	pub created_at: DateTime<Utc>,
}
