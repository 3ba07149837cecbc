//! List-shaped feed cache

use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::domain::PostRow;

/// An observable snapshot of the feed
///
/// `cursor` is advisory pagination state carried over from the baseline
/// query; the live stream makes no gap-filling guarantee around it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
	pub items: Vec<PostRow>,
	pub cursor: Option<String>,
}

/// Locally cached, ordered feed for one user
///
/// New posts are prepended; updates and deletes match on primary key.
/// Every structural change also pulses the invalidation channel so
/// downstream query caches can refresh.
#[derive(Debug)]
pub struct FeedCache {
	snapshot_tx: watch::Sender<FeedSnapshot>,
	invalidate_tx: broadcast::Sender<()>,
}

impl FeedCache {
	pub fn new() -> Self {
		let (snapshot_tx, _) = watch::channel(FeedSnapshot::default());
		let (invalidate_tx, _) = broadcast::channel(16);
		Self {
			snapshot_tx,
			invalidate_tx,
		}
	}

	/// Current feed contents
	pub fn read(&self) -> FeedSnapshot {
		self.snapshot_tx.borrow().clone()
	}

	/// Observe the feed as it changes
	pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
		self.snapshot_tx.subscribe()
	}

	/// Observe cache invalidation pulses
	pub fn invalidations(&self) -> broadcast::Receiver<()> {
		self.invalidate_tx.subscribe()
	}

	/// Seed the feed from a baseline page
	pub(crate) fn seed(&self, snapshot: FeedSnapshot) {
		self.snapshot_tx.send_replace(snapshot);
		self.invalidate();
	}

	/// Prepend a newly created post
	pub(crate) fn prepend(&self, row: PostRow) {
		self.snapshot_tx
			.send_modify(|snapshot| snapshot.items.insert(0, row));
		self.invalidate();
	}

	/// Replace the post with the same primary key, if cached
	pub(crate) fn replace(&self, row: PostRow) {
		let mut changed = false;
		self.snapshot_tx.send_modify(|snapshot| {
			if let Some(existing) = snapshot.items.iter_mut().find(|item| item.id == row.id) {
				*existing = row;
				changed = true;
			}
		});
		if changed {
			self.invalidate();
		}
	}

	/// Remove the post with this primary key, if cached
	pub(crate) fn remove(&self, id: Uuid) {
		let mut changed = false;
		self.snapshot_tx.send_modify(|snapshot| {
			let before = snapshot.items.len();
			snapshot.items.retain(|item| item.id != id);
			changed = snapshot.items.len() != before;
		});
		if changed {
			self.invalidate();
		}
	}

	/// Drop all cached items, e.g. when the session ends
	pub(crate) fn clear(&self) {
		self.snapshot_tx.send_replace(FeedSnapshot::default());
		self.invalidate();
	}

	fn invalidate(&self) {
		// No receivers is fine
		self.invalidate_tx.send(()).ok();
	}
}

impl Default for FeedCache {
	fn default() -> Self {
		Self::new()
	}
}
