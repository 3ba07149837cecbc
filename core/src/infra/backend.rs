//! Baseline and bulk mutation backend interfaces

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// A point-in-time seed for a local aggregate
///
/// `watermark` is the stream position the snapshot reflects: events at or
/// below it are already folded into `seed` and must be discarded by the
/// subscription worker, otherwise a row would be counted twice (once from
/// the baseline, once from a replayed event).
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline<S> {
	pub seed: S,
	pub watermark: u64,
}

/// The point-in-time query used to seed local state before trusting the
/// live stream
#[async_trait]
pub trait BaselineFetch: Send + Sync + 'static {
	/// Shape of the seed: a count for counter feeds, a page of rows for
	/// list feeds
	type Seed: Send + 'static;

	async fn fetch(&self, user_id: Uuid) -> Result<Baseline<Self::Seed>>;
}

/// Bulk corrective writes against the backend
#[async_trait]
pub trait BulkMutation: Send + Sync + 'static {
	/// Mark every unread row owned by `user_id` as read
	async fn mark_all_read(&self, user_id: Uuid) -> Result<()>;
}
