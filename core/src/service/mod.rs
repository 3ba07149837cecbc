//! Background services driving the realtime layer

pub mod applier;
pub mod coordinator;
pub mod gateway;
pub mod session;
pub mod subscription;

use async_trait::async_trait;

pub use applier::{Correction, EventApplier, FeedApplier, UnreadApplier};
pub use coordinator::{ManagedFeed, RealtimeCoordinator};
pub use gateway::MutationGateway;
pub use session::{Session, Stopper};
pub use subscription::SubscriptionManager;

/// Lifecycle contract for long-running background services
#[async_trait]
pub trait Service: Send + Sync {
	fn name(&self) -> &'static str;

	fn is_running(&self) -> bool;

	async fn start(&self) -> anyhow::Result<()>;

	async fn stop(&self) -> anyhow::Result<()>;
}
