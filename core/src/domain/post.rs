//! Feed post rows backing the list-shaped feed cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feed post row as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
	pub id: Uuid,
	/// Feed owner the subscription is scoped to
	pub user_id: Uuid,
	pub author_id: Uuid,
	pub body: String,
	pub created_at: DateTime<Utc>,
}
