//! Row-level change events delivered by the backend change stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend tables the realtime layer subscribes to
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
	Notifications,
	Posts,
}

impl Table {
	/// Table name as it appears in the backend schema
	pub fn name(&self) -> &'static str {
		match self {
			Self::Notifications => "notifications",
			Self::Posts => "posts",
		}
	}
}

impl std::fmt::Display for Table {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Row operation kinds emitted by the change stream
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
	Insert,
	Update,
	Delete,
}

/// A single row-level change delivered on a subscription
///
/// Immutable once received. `sequence` is the monotonic stream position the
/// backend assigns to each change; it is what lets the client discard
/// redelivered events and events already folded into a baseline snapshot.
///
/// Row snapshots travel as raw JSON and are parsed into typed rows by the
/// appliers, so a malformed row can be dropped without tearing down the
/// subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
	pub table: Table,
	pub op: Operation,
	/// Row state before the change (UPDATE and DELETE)
	pub old_row: Option<Value>,
	/// Row state after the change (INSERT and UPDATE)
	pub new_row: Option<Value>,
	/// Monotonic stream position assigned by the backend
	pub sequence: u64,
	pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
	pub fn new(table: Table, op: Operation, sequence: u64) -> Self {
		Self {
			table,
			op,
			old_row: None,
			new_row: None,
			sequence,
			received_at: Utc::now(),
		}
	}

	#[must_use]
	pub fn with_old_row(mut self, row: Value) -> Self {
		self.old_row = Some(row);
		self
	}

	#[must_use]
	pub fn with_new_row(mut self, row: Value) -> Self {
		self.new_row = Some(row);
		self
	}
}
