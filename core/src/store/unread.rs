//! Unread notification counter

use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::domain::NotificationRow;

/// Locally cached unread count for one user
///
/// The value is observable through a `watch` channel; newly arrived rows
/// fan out on a `broadcast` channel so the UI can surface them (toast,
/// badge pulse) without polling. The counter can never go negative: a
/// decrement at zero is clamped and logged, which is the correct outcome
/// when a bulk mark-all-read races an in-flight read event.
#[derive(Debug)]
pub struct UnreadCounter {
	value_tx: watch::Sender<u64>,
	items_tx: broadcast::Sender<NotificationRow>,
}

impl UnreadCounter {
	pub fn new(item_capacity: usize) -> Self {
		let (value_tx, _) = watch::channel(0);
		let (items_tx, _) = broadcast::channel(item_capacity);
		Self { value_tx, items_tx }
	}

	/// Current unread count
	pub fn read(&self) -> u64 {
		*self.value_tx.borrow()
	}

	/// Observe the unread count as it changes
	pub fn watch(&self) -> watch::Receiver<u64> {
		self.value_tx.subscribe()
	}

	/// Observe newly arrived notifications
	pub fn new_items(&self) -> broadcast::Receiver<NotificationRow> {
		self.items_tx.subscribe()
	}

	/// Seed the counter from a baseline snapshot
	pub(crate) fn seed(&self, value: u64) {
		self.value_tx.send_replace(value);
	}

	/// Count a newly arrived unread notification
	pub(crate) fn increment(&self, row: NotificationRow) {
		self.value_tx.send_modify(|value| *value += 1);
		// Nobody listening is fine; the count is the contract
		self.items_tx.send(row).ok();
	}

	/// Remove one unread notification from the count, clamped at zero
	pub(crate) fn decrement(&self) {
		self.value_tx.send_modify(|value| {
			if *value == 0 {
				warn!("unread counter decrement at zero, clamping");
			} else {
				*value -= 1;
			}
		});
	}

	/// Collapse the count to zero after an acknowledged mark-all-read
	pub(crate) fn clear(&self) {
		self.value_tx.send_replace(0);
	}
}
