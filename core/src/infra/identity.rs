//! Identity event source
//!
//! Session transitions arrive from the host application's auth layer. The
//! realtime core only consumes them; issuing or refreshing sessions is not
//! its business.

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Session lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
	SignedIn { user_id: Uuid },
	SignedOut,
}

/// Broadcast bus for identity events
///
/// Kept separate from any general-purpose event bus so a burst of unrelated
/// events can never starve a sign-out, which has teardown obligations.
#[derive(Debug, Clone)]
pub struct IdentityBus {
	sender: broadcast::Sender<AuthEvent>,
}

impl IdentityBus {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(16);
		Self { sender }
	}

	/// Emit an identity transition to all subscribers
	///
	/// Returns the number of subscribers that received the event.
	pub fn emit(&self, event: AuthEvent) -> usize {
		match self.sender.send(event) {
			Ok(count) => count,
			Err(_) => {
				// No subscribers yet; normal during startup
				debug!(?event, "identity event emitted with no subscribers");
				0
			}
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
		self.sender.subscribe()
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for IdentityBus {
	fn default() -> Self {
		Self::new()
	}
}
