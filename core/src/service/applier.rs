//! Event application onto local aggregates
//!
//! One applier per feed shape. Appliers are the only code that interprets
//! row payloads; a malformed row is logged and dropped so it can never take
//! the subscription down with it.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
	domain::{ChangeEvent, NotificationRow, Operation, PostRow, Table},
	store::{FeedCache, FeedSnapshot, UnreadCounter},
};

/// Corrective transitions issued by the mutation gateway after an
/// acknowledged backend write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
	/// Every unread row for this user was marked read server-side
	AllRead,
}

/// Converts delivered change events into aggregate transitions
///
/// Implementations run exclusively on the subscription worker task, which
/// is what makes the aggregate single-writer.
pub trait EventApplier: Send + 'static {
	/// Baseline seed shape: a count for counter feeds, a page of rows for
	/// list feeds
	type Seed: Send + 'static;

	fn table(&self) -> Table;

	/// Replace aggregate state with a baseline snapshot
	fn seed(&mut self, seed: Self::Seed);

	/// Fold one live event into the aggregate
	fn apply(&mut self, event: &ChangeEvent);

	/// Apply a corrective transition from the mutation gateway
	fn reconcile(&mut self, correction: Correction);

	/// Destroy aggregate state at session end
	fn reset(&mut self);
}

fn parse_row<T: DeserializeOwned>(
	event: &ChangeEvent,
	side: &'static str,
	row: Option<&Value>,
) -> Option<T> {
	let Some(value) = row else {
		warn!(
			table = %event.table,
			op = event.op.as_ref(),
			sequence = event.sequence,
			side,
			"dropping change event with missing row snapshot"
		);
		return None;
	};

	match serde_json::from_value(value.clone()) {
		Ok(row) => Some(row),
		Err(e) => {
			warn!(
				table = %event.table,
				op = event.op.as_ref(),
				sequence = event.sequence,
				side,
				error = %e,
				"dropping malformed change event"
			);
			None
		}
	}
}

/// Applier for the counter-shaped unread notifications feed
#[derive(Clone)]
pub struct UnreadApplier {
	counter: Arc<UnreadCounter>,
}

impl UnreadApplier {
	pub fn new(counter: Arc<UnreadCounter>) -> Self {
		Self { counter }
	}
}

impl EventApplier for UnreadApplier {
	type Seed = u64;

	fn table(&self) -> Table {
		Table::Notifications
	}

	fn seed(&mut self, seed: u64) {
		self.counter.seed(seed);
	}

	fn apply(&mut self, event: &ChangeEvent) {
		match event.op {
			Operation::Insert => {
				if let Some(row) =
					parse_row::<NotificationRow>(event, "new", event.new_row.as_ref())
				{
					self.counter.increment(row);
				}
			}
			Operation::Update => {
				let old = parse_row::<NotificationRow>(event, "old", event.old_row.as_ref());
				let new = parse_row::<NotificationRow>(event, "new", event.new_row.as_ref());

				if let (Some(old), Some(new)) = (old, new) {
					if !old.is_read && new.is_read {
						self.counter.decrement();
					} else {
						trace!(
							sequence = event.sequence,
							"update without a read transition, ignoring"
						);
					}
				}
			}
			Operation::Delete => {
				// A deleted unread row must not leave a phantom count behind
				if let Some(old) =
					parse_row::<NotificationRow>(event, "old", event.old_row.as_ref())
				{
					if !old.is_read {
						self.counter.decrement();
					}
				}
			}
		}
	}

	fn reconcile(&mut self, correction: Correction) {
		match correction {
			Correction::AllRead => self.counter.clear(),
		}
	}

	fn reset(&mut self) {
		self.counter.clear();
	}
}

/// Applier for the list-shaped posts feed
#[derive(Clone)]
pub struct FeedApplier {
	cache: Arc<FeedCache>,
}

impl FeedApplier {
	pub fn new(cache: Arc<FeedCache>) -> Self {
		Self { cache }
	}
}

impl EventApplier for FeedApplier {
	type Seed = FeedSnapshot;

	fn table(&self) -> Table {
		Table::Posts
	}

	fn seed(&mut self, seed: FeedSnapshot) {
		self.cache.seed(seed);
	}

	fn apply(&mut self, event: &ChangeEvent) {
		match event.op {
			Operation::Insert => {
				if let Some(row) = parse_row::<PostRow>(event, "new", event.new_row.as_ref()) {
					self.cache.prepend(row);
				}
			}
			Operation::Update => {
				if let Some(row) = parse_row::<PostRow>(event, "new", event.new_row.as_ref()) {
					self.cache.replace(row);
				}
			}
			Operation::Delete => {
				if let Some(row) = parse_row::<PostRow>(event, "old", event.old_row.as_ref()) {
					self.cache.remove(row.id);
				}
			}
		}
	}

	fn reconcile(&mut self, correction: Correction) {
		debug!(?correction, "feed cache has no corrective transitions");
	}

	fn reset(&mut self) {
		self.cache.clear();
	}
}
