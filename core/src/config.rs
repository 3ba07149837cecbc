//! Realtime layer configuration
//!
//! Nested sections with serde defaults so partial config files stay valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the realtime synchronization layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
	#[serde(default)]
	pub reconnect: ReconnectConfig,
	#[serde(default)]
	pub channels: ChannelConfig,
	#[serde(default)]
	pub shutdown: ShutdownConfig,
}

/// Reconnect policy applied after a channel error
///
/// The default is a fixed 5 second interval with no growth and no attempt
/// cap. Growth is available (`multiplier` > 1.0) but deliberately not the
/// default; the policy is configuration, not a hardcoded assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
	/// Delay before the first reconnect attempt, in milliseconds
	#[serde(default = "default_reconnect_delay_ms")]
	pub delay_ms: u64,
	/// Per-attempt delay growth factor; 1.0 keeps the interval fixed
	#[serde(default = "default_reconnect_multiplier")]
	pub multiplier: f64,
	/// Upper bound on the grown delay, in milliseconds
	#[serde(default = "default_reconnect_max_delay_ms")]
	pub max_delay_ms: u64,
	/// Give up after this many consecutive failed attempts; `None` retries forever
	#[serde(default)]
	pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
	/// Delay to wait before reconnect attempt `attempt` (zero-based)
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let grown = self.delay_ms as f64 * self.multiplier.powi(attempt as i32);
		let capped = grown.min(self.max_delay_ms as f64).max(0.0);
		Duration::from_millis(capped as u64)
	}

	/// Whether another attempt is allowed after `failed` consecutive failures
	pub fn allows_attempt(&self, failed: u32) -> bool {
		match self.max_attempts {
			Some(max) => failed < max,
			None => true,
		}
	}
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			delay_ms: default_reconnect_delay_ms(),
			multiplier: default_reconnect_multiplier(),
			max_delay_ms: default_reconnect_max_delay_ms(),
			max_attempts: None,
		}
	}
}

/// Channel capacities for the worker mailbox and store fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
	/// Commands queued for the subscription worker (refetch, reconcile)
	#[serde(default = "default_command_capacity")]
	pub command_capacity: usize,
	/// New-item broadcast towards UI observers
	#[serde(default = "default_item_capacity")]
	pub item_capacity: usize,
	/// Events buffered while the baseline fetch is in flight; overflow
	/// drops the oldest buffered event with a warning
	#[serde(default = "default_arming_buffer")]
	pub arming_buffer: usize,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			command_capacity: default_command_capacity(),
			item_capacity: default_item_capacity(),
			arming_buffer: default_arming_buffer(),
		}
	}
}

/// Worker teardown behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
	/// How long to wait for a worker to stop gracefully before aborting it
	#[serde(default = "default_grace_ms")]
	pub grace_ms: u64,
}

impl ShutdownConfig {
	pub fn grace(&self) -> Duration {
		Duration::from_millis(self.grace_ms)
	}
}

impl Default for ShutdownConfig {
	fn default() -> Self {
		Self {
			grace_ms: default_grace_ms(),
		}
	}
}

fn default_reconnect_delay_ms() -> u64 {
	5_000
}

fn default_reconnect_multiplier() -> f64 {
	1.0
}

fn default_reconnect_max_delay_ms() -> u64 {
	60_000
}

fn default_command_capacity() -> usize {
	16
}

fn default_item_capacity() -> usize {
	64
}

fn default_arming_buffer() -> usize {
	1_024
}

fn default_grace_ms() -> u64 {
	5_000
}
