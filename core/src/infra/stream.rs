//! Change stream consumption interface
//!
//! The backend exposes a push feed of row-level changes. Delivery is
//! at-least-once and in order within one subscription; no ordering is
//! guaranteed across a reconnect, which is why the subscription worker
//! pairs every new handle with a fresh baseline snapshot.

use async_channel as chan;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
	domain::{ChangeEvent, Operation, Table},
	error::Result,
};

/// Discrete status transitions reported by a subscription channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum ChannelStatus {
	Connecting,
	Subscribed,
	/// Transient failure; the worker schedules a reconnect
	Error,
	/// Terminal; the channel will deliver nothing further
	Closed,
}

/// Row filter applied server-side to a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFilter {
	pub column: String,
	pub equals: Value,
}

impl StreamFilter {
	/// Scope a subscription to rows owned by `user_id` (`user_id = $user`)
	pub fn owner(user_id: Uuid) -> Self {
		Self {
			column: "user_id".to_string(),
			equals: Value::String(user_id.to_string()),
		}
	}
}

/// A live subscription handle
///
/// Events and status transitions arrive on separate channels so the worker
/// can multiplex them in one select loop. Dropping the handle severs
/// delivery; `close` does the same explicitly and is idempotent.
pub struct Subscription {
	events: chan::Receiver<ChangeEvent>,
	statuses: chan::Receiver<ChannelStatus>,
	closer: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	pub fn new(
		events: chan::Receiver<ChangeEvent>,
		statuses: chan::Receiver<ChannelStatus>,
		on_close: impl FnOnce() + Send + Sync + 'static,
	) -> Self {
		Self {
			events,
			statuses,
			closer: Some(Box::new(on_close)),
		}
	}

	pub fn events(&self) -> &chan::Receiver<ChangeEvent> {
		&self.events
	}

	pub fn statuses(&self) -> &chan::Receiver<ChannelStatus> {
		&self.statuses
	}

	/// Close the subscription and stop delivery
	pub fn close(&mut self) {
		if let Some(close) = self.closer.take() {
			close();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.close();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("closed", &self.closer.is_none())
			.finish()
	}
}

/// The backend change-data-capture push API
#[async_trait]
pub trait ChangeStream: Send + Sync + 'static {
	/// Open a subscription for `kinds` of changes on `table`, filtered
	/// server-side by `filter`
	async fn subscribe(
		&self,
		table: Table,
		filter: StreamFilter,
		kinds: &[Operation],
	) -> Result<Subscription>;
}
