//! Identity-driven realtime coordinator
//!
//! Binds the identity event source to the feed subscriptions: a session
//! established starts every registered feed for that user, a session ended
//! tears them all down. Feeds never observe auth state directly.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
	config::RealtimeConfig,
	infra::{AuthEvent, BaselineFetch, ChangeStream, IdentityBus},
	service::{
		applier::EventApplier,
		session::{Session, Stopper},
		subscription::SubscriptionManager,
		Service,
	},
};

/// Object-safe view of a feed subscription for the coordinator
#[async_trait]
pub trait ManagedFeed: Send + Sync + 'static {
	fn name(&self) -> &'static str;

	async fn start(&self, user_id: Uuid);

	async fn stop(&self);

	async fn is_subscribed(&self) -> bool;
}

#[async_trait]
impl<A, S, B> ManagedFeed for SubscriptionManager<A, S, B>
where
	A: EventApplier + Clone + Sync,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	fn name(&self) -> &'static str {
		self.table().name()
	}

	async fn start(&self, user_id: Uuid) {
		SubscriptionManager::start(self, user_id).await;
	}

	async fn stop(&self) {
		SubscriptionManager::stop(self).await;
	}

	async fn is_subscribed(&self) -> bool {
		SubscriptionManager::is_subscribed(self).await
	}
}

/// Drives feed subscriptions from identity transitions
pub struct RealtimeCoordinator {
	identity: IdentityBus,
	feeds: Arc<Vec<Arc<dyn ManagedFeed>>>,
	config: RealtimeConfig,
	is_running: Arc<AtomicBool>,
	listener: Mutex<Option<Session>>,
}

impl RealtimeCoordinator {
	pub fn new(
		identity: IdentityBus,
		feeds: Vec<Arc<dyn ManagedFeed>>,
		config: RealtimeConfig,
	) -> Self {
		Self {
			identity,
			feeds: Arc::new(feeds),
			config,
			is_running: Arc::new(AtomicBool::new(false)),
			listener: Mutex::new(None),
		}
	}

	async fn run_listener(
		feeds: Arc<Vec<Arc<dyn ManagedFeed>>>,
		mut events: broadcast::Receiver<AuthEvent>,
		stop: Stopper,
	) {
		loop {
			tokio::select! {
				_ = stop.wait() => break,
				event = events.recv() => match event {
					Ok(AuthEvent::SignedIn { user_id }) => {
						info!(user_id = %user_id, "session established, starting feeds");
						join_all(feeds.iter().map(|feed| feed.start(user_id))).await;
					}
					Ok(AuthEvent::SignedOut) => {
						info!("session ended, tearing down feeds");
						join_all(feeds.iter().map(|feed| feed.stop())).await;
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						// Identity events are rare; lag means trouble upstream
						warn!(skipped, "identity event stream lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				},
			}
		}

		// Teardown on every exit path, not just an observed sign-out
		join_all(feeds.iter().map(|feed| feed.stop())).await;
	}
}

#[async_trait]
impl Service for RealtimeCoordinator {
	fn name(&self) -> &'static str {
		"realtime_coordinator"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.load(Ordering::SeqCst) {
			warn!("realtime coordinator already running");
			return Ok(());
		}

		let events = self.identity.subscribe();
		let feeds = Arc::clone(&self.feeds);
		let session = Session::spawn(
			"identity-listener",
			self.config.shutdown.grace(),
			move |stop| Self::run_listener(feeds, events, stop),
		);
		*self.listener.lock().await = Some(session);
		self.is_running.store(true, Ordering::SeqCst);

		info!(feeds = self.feeds.len(), "realtime coordinator started");
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(session) = self.listener.lock().await.take() {
			session.close().await;
		}
		join_all(self.feeds.iter().map(|feed| feed.stop())).await;
		self.is_running.store(false, Ordering::SeqCst);

		info!("realtime coordinator stopped");
		Ok(())
	}
}
