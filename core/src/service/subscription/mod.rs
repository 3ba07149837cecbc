//! Subscription lifecycle management
//!
//! One `SubscriptionManager` per feed. The manager owns at most one live
//! worker session at a time and enforces the handle invariant: starting a
//! subscription always tears the previous one down first, so a stale
//! handle can never keep counting for a user who switched accounts.

mod worker;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::{
	config::RealtimeConfig,
	error::{Error, Result},
	infra::{BaselineFetch, ChangeStream},
	service::{
		applier::{Correction, EventApplier},
		session::Session,
	},
};

use worker::{Command, Worker};

/// One live feed: the worker session plus the channels into it
struct ActiveFeed {
	user_id: Uuid,
	commands: mpsc::Sender<Command>,
	subscribed: watch::Receiver<bool>,
	session: Session,
}

/// Owns the lifecycle of one change-stream subscription per user
pub struct SubscriptionManager<A, S, B>
where
	A: EventApplier + Clone + Sync,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	stream: Arc<S>,
	fetcher: Arc<B>,
	applier: A,
	config: RealtimeConfig,
	active: Mutex<Option<ActiveFeed>>,
}

impl<A, S, B> SubscriptionManager<A, S, B>
where
	A: EventApplier + Clone + Sync,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	pub fn new(stream: Arc<S>, fetcher: Arc<B>, applier: A, config: RealtimeConfig) -> Self {
		Self {
			stream,
			fetcher,
			applier,
			config,
			active: Mutex::new(None),
		}
	}

	/// Table this manager subscribes to
	pub fn table(&self) -> crate::domain::Table {
		self.applier.table()
	}

	/// Start a subscription for `user_id`, tearing down any previous one
	pub async fn start(&self, user_id: Uuid) {
		let mut active = self.active.lock().await;

		if let Some(previous) = active.take() {
			debug!(
				user_id = %previous.user_id,
				table = %self.applier.table(),
				"tearing down previous subscription"
			);
			previous.session.close().await;
		}

		let (command_tx, command_rx) = mpsc::channel(self.config.channels.command_capacity);
		let (subscribed_tx, subscribed_rx) = watch::channel(false);

		let worker = Worker {
			user_id,
			stream: Arc::clone(&self.stream),
			fetcher: Arc::clone(&self.fetcher),
			applier: self.applier.clone(),
			config: self.config.clone(),
			commands: command_rx,
			subscribed: subscribed_tx,
			watermark: 0,
		};
		let session = Session::spawn(
			"feed-subscription",
			self.config.shutdown.grace(),
			move |stop| worker.run(stop),
		);

		*active = Some(ActiveFeed {
			user_id,
			commands: command_tx,
			subscribed: subscribed_rx,
			session,
		});
	}

	/// Stop the active subscription; safe to call when none exists
	pub async fn stop(&self) {
		let previous = self.active.lock().await.take();
		if let Some(previous) = previous {
			previous.session.close().await;
		}
	}

	/// User the active subscription is scoped to, if any
	pub async fn current_user(&self) -> Option<Uuid> {
		self.active.lock().await.as_ref().map(|feed| feed.user_id)
	}

	/// Whether the live stream is armed: baseline applied, events flowing
	pub async fn is_subscribed(&self) -> bool {
		self.active
			.lock()
			.await
			.as_ref()
			.map(|feed| *feed.subscribed.borrow())
			.unwrap_or(false)
	}

	/// Observe arming state changes for the active subscription
	pub async fn subscribed_watch(&self) -> Option<watch::Receiver<bool>> {
		self.active
			.lock()
			.await
			.as_ref()
			.map(|feed| feed.subscribed.clone())
	}

	/// Re-run the baseline query and reseed the aggregate
	pub async fn refetch(&self) -> Result<()> {
		let (ack_tx, ack_rx) = oneshot::channel();
		self.send(Command::Refetch { ack: ack_tx }).await?;
		ack_rx.await.map_err(|_| Error::WorkerGone)?
	}

	/// Serialize a corrective transition through the worker mailbox
	pub(crate) async fn reconcile(&self, correction: Correction) -> Result<()> {
		let (ack_tx, ack_rx) = oneshot::channel();
		self.send(Command::Reconcile {
			correction,
			ack: ack_tx,
		})
		.await?;
		ack_rx.await.map_err(|_| Error::WorkerGone)
	}

	async fn send(&self, command: Command) -> Result<()> {
		// Clone the sender out so the lock is not held across the send
		let commands = {
			let active = self.active.lock().await;
			let feed = active.as_ref().ok_or(Error::NoActiveSession)?;
			feed.commands.clone()
		};
		commands.send(command).await.map_err(|_| Error::WorkerGone)
	}
}
