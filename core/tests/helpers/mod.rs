//! Shared test harness: controllable in-memory collaborators
//!
//! The mocks stand in for the backend push API and query surface so tests
//! can script deliveries, failures, and status transitions precisely.

#![allow(dead_code)]

use std::{
	future::Future,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_channel as chan;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use plaza_core::{
	config::RealtimeConfig,
	domain::{ChangeEvent, NotificationRow, Operation, PostRow, Table},
	error::{Error, Result},
	infra::{Baseline, BaselineFetch, BulkMutation, ChangeStream, ChannelStatus, StreamFilter, Subscription},
	service::{FeedApplier, MutationGateway, SubscriptionManager, UnreadApplier},
	store::{FeedCache, FeedSnapshot, UnreadCounter},
};

/// Poll `check` until it holds, advancing (possibly paused) time
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	for _ in 0..400 {
		if check().await {
			return;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("timed out waiting for: {what}");
}

//
// Change stream mock
//

struct LiveChannel {
	events: chan::Sender<ChangeEvent>,
	statuses: chan::Sender<ChannelStatus>,
	closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct StreamState {
	subscribes: usize,
	current: Option<LiveChannel>,
}

/// In-memory change stream with scriptable delivery and status
pub struct MockChangeStream {
	state: Mutex<StreamState>,
}

impl MockChangeStream {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(StreamState::default()),
		}
	}

	/// How many subscriptions have been opened so far
	pub fn subscribe_count(&self) -> usize {
		self.state.lock().unwrap().subscribes
	}

	/// Deliver an event on the current subscription
	///
	/// Returns false when there is no live subscription to deliver on,
	/// which is exactly what a closed handle must look like.
	pub fn emit(&self, event: ChangeEvent) -> bool {
		let state = self.state.lock().unwrap();
		match &state.current {
			Some(channel) if !channel.closed.load(Ordering::SeqCst) => {
				channel.events.try_send(event).is_ok()
			}
			_ => false,
		}
	}

	/// Report a status transition on the current subscription
	pub fn emit_status(&self, status: ChannelStatus) -> bool {
		let state = self.state.lock().unwrap();
		match &state.current {
			Some(channel) if !channel.closed.load(Ordering::SeqCst) => {
				channel.statuses.try_send(status).is_ok()
			}
			_ => false,
		}
	}

	/// Whether the most recent subscription handle has been closed
	pub fn current_closed(&self) -> bool {
		let state = self.state.lock().unwrap();
		state.current.as_ref().map_or(true, |channel| {
			channel.closed.load(Ordering::SeqCst) || channel.events.is_closed()
		})
	}
}

#[async_trait]
impl ChangeStream for MockChangeStream {
	async fn subscribe(
		&self,
		_table: Table,
		_filter: StreamFilter,
		_kinds: &[Operation],
	) -> Result<Subscription> {
		let (event_tx, event_rx) = chan::bounded(256);
		let (status_tx, status_rx) = chan::bounded(16);
		let closed = Arc::new(AtomicBool::new(false));

		status_tx.try_send(ChannelStatus::Connecting).ok();
		status_tx.try_send(ChannelStatus::Subscribed).ok();

		let mut state = self.state.lock().unwrap();
		state.subscribes += 1;
		state.current = Some(LiveChannel {
			events: event_tx,
			statuses: status_tx,
			closed: Arc::clone(&closed),
		});

		Ok(Subscription::new(event_rx, status_rx, move || {
			closed.store(true, Ordering::SeqCst);
		}))
	}
}

//
// Notification backend mock
//

#[derive(Default)]
struct NotificationState {
	rows: Vec<NotificationRow>,
	sequence: u64,
	baseline_fetches: usize,
	fail_baselines: usize,
	fail_mutations: usize,
	baseline_delay: Duration,
}

/// In-memory notifications table with a scriptable baseline/mutation API
pub struct MockNotificationBackend {
	state: Mutex<NotificationState>,
}

impl MockNotificationBackend {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(NotificationState::default()),
		}
	}

	/// Create `count` unread rows for `user_id` without emitting events,
	/// as if they predate the subscription
	pub fn seed_unread(&self, user_id: Uuid, count: usize) {
		let mut state = self.state.lock().unwrap();
		for _ in 0..count {
			state.sequence += 1;
			state.rows.push(NotificationRow {
				id: Uuid::new_v4(),
				user_id,
				kind: "mention".to_string(),
				is_read: false,
				created_at: Utc::now(),
			});
		}
	}

	/// Insert an unread row and return the change event a live
	/// subscription would deliver for it
	pub fn insert_unread(&self, user_id: Uuid) -> ChangeEvent {
		let mut state = self.state.lock().unwrap();
		let row = NotificationRow {
			id: Uuid::new_v4(),
			user_id,
			kind: "mention".to_string(),
			is_read: false,
			created_at: Utc::now(),
		};
		state.rows.push(row.clone());
		state.sequence += 1;
		ChangeEvent::new(Table::Notifications, Operation::Insert, state.sequence)
			.with_new_row(serde_json::to_value(&row).unwrap())
	}

	/// Mark one row read and return the corresponding update event
	pub fn mark_read(&self, id: Uuid) -> ChangeEvent {
		let mut state = self.state.lock().unwrap();
		let row = state
			.rows
			.iter_mut()
			.find(|row| row.id == id)
			.expect("row to mark read");
		let old = row.clone();
		row.is_read = true;
		let new = row.clone();
		state.sequence += 1;
		ChangeEvent::new(Table::Notifications, Operation::Update, state.sequence)
			.with_old_row(serde_json::to_value(&old).unwrap())
			.with_new_row(serde_json::to_value(&new).unwrap())
	}

	pub fn first_unread(&self, user_id: Uuid) -> Option<NotificationRow> {
		self.state
			.lock()
			.unwrap()
			.rows
			.iter()
			.find(|row| row.user_id == user_id && !row.is_read)
			.cloned()
	}

	pub fn unread_count(&self, user_id: Uuid) -> u64 {
		self.state
			.lock()
			.unwrap()
			.rows
			.iter()
			.filter(|row| row.user_id == user_id && !row.is_read)
			.count() as u64
	}

	pub fn all_read(&self, user_id: Uuid) -> bool {
		self.unread_count(user_id) == 0
	}

	pub fn baseline_fetches(&self) -> usize {
		self.state.lock().unwrap().baseline_fetches
	}

	pub fn fail_next_baseline(&self) {
		self.state.lock().unwrap().fail_baselines += 1;
	}

	pub fn fail_next_mutation(&self) {
		self.state.lock().unwrap().fail_mutations += 1;
	}

	/// Stretch the baseline fetch so tests can exercise the arming window
	pub fn set_baseline_delay(&self, delay: Duration) {
		self.state.lock().unwrap().baseline_delay = delay;
	}
}

#[async_trait]
impl BaselineFetch for MockNotificationBackend {
	type Seed = u64;

	async fn fetch(&self, user_id: Uuid) -> Result<Baseline<u64>> {
		// Snapshot first: events arriving while the (possibly delayed)
		// fetch is in flight are post-snapshot and must not be folded in
		let (delay, outcome) = {
			let mut state = self.state.lock().unwrap();
			state.baseline_fetches += 1;

			if state.fail_baselines > 0 {
				state.fail_baselines -= 1;
				(state.baseline_delay, None)
			} else {
				let value = state
					.rows
					.iter()
					.filter(|row| row.user_id == user_id && !row.is_read)
					.count() as u64;
				(
					state.baseline_delay,
					Some(Baseline {
						seed: value,
						watermark: state.sequence,
					}),
				)
			}
		};

		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}

		outcome.ok_or_else(|| Error::Baseline(anyhow::anyhow!("scripted baseline failure")))
	}
}

#[async_trait]
impl BulkMutation for MockNotificationBackend {
	async fn mark_all_read(&self, user_id: Uuid) -> Result<()> {
		let mut state = self.state.lock().unwrap();

		if state.fail_mutations > 0 {
			state.fail_mutations -= 1;
			return Err(Error::Mutation(anyhow::anyhow!(
				"scripted mutation failure"
			)));
		}

		state.sequence += 1;
		for row in state.rows.iter_mut().filter(|row| row.user_id == user_id) {
			row.is_read = true;
		}
		Ok(())
	}
}

//
// Feed backend mock
//

#[derive(Default)]
struct FeedState {
	posts: Vec<PostRow>,
	sequence: u64,
}

/// In-memory posts table with a baseline page API
pub struct MockFeedBackend {
	state: Mutex<FeedState>,
}

impl MockFeedBackend {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(FeedState::default()),
		}
	}

	/// Create `count` posts for `user_id` without emitting events
	pub fn seed_posts(&self, user_id: Uuid, count: usize) {
		let mut state = self.state.lock().unwrap();
		for i in 0..count {
			state.sequence += 1;
			state.posts.push(PostRow {
				id: Uuid::new_v4(),
				user_id,
				author_id: Uuid::new_v4(),
				body: format!("seed-{i}"),
				created_at: Utc::now(),
			});
		}
	}

	pub fn insert_post(&self, user_id: Uuid, body: &str) -> ChangeEvent {
		let mut state = self.state.lock().unwrap();
		let row = PostRow {
			id: Uuid::new_v4(),
			user_id,
			author_id: Uuid::new_v4(),
			body: body.to_string(),
			created_at: Utc::now(),
		};
		state.posts.push(row.clone());
		state.sequence += 1;
		ChangeEvent::new(Table::Posts, Operation::Insert, state.sequence)
			.with_new_row(serde_json::to_value(&row).unwrap())
	}

	pub fn edit_post(&self, id: Uuid, body: &str) -> ChangeEvent {
		let mut state = self.state.lock().unwrap();
		let row = state
			.posts
			.iter_mut()
			.find(|post| post.id == id)
			.expect("post to edit");
		let old = row.clone();
		row.body = body.to_string();
		let new = row.clone();
		state.sequence += 1;
		ChangeEvent::new(Table::Posts, Operation::Update, state.sequence)
			.with_old_row(serde_json::to_value(&old).unwrap())
			.with_new_row(serde_json::to_value(&new).unwrap())
	}

	pub fn delete_post(&self, id: Uuid) -> ChangeEvent {
		let mut state = self.state.lock().unwrap();
		let index = state
			.posts
			.iter()
			.position(|post| post.id == id)
			.expect("post to delete");
		let old = state.posts.remove(index);
		state.sequence += 1;
		ChangeEvent::new(Table::Posts, Operation::Delete, state.sequence)
			.with_old_row(serde_json::to_value(&old).unwrap())
	}
}

#[async_trait]
impl BaselineFetch for MockFeedBackend {
	type Seed = FeedSnapshot;

	async fn fetch(&self, user_id: Uuid) -> Result<Baseline<FeedSnapshot>> {
		let state = self.state.lock().unwrap();
		let mut items: Vec<PostRow> = state
			.posts
			.iter()
			.filter(|post| post.user_id == user_id)
			.cloned()
			.collect();
		// Newest first, matching what the feed query returns
		items.reverse();

		Ok(Baseline {
			seed: FeedSnapshot {
				items,
				cursor: None,
			},
			watermark: state.sequence,
		})
	}
}

//
// Harnesses
//

pub type UnreadManager =
	SubscriptionManager<UnreadApplier, MockChangeStream, MockNotificationBackend>;
pub type UnreadGateway =
	MutationGateway<MockNotificationBackend, UnreadApplier, MockChangeStream, MockNotificationBackend>;

/// Full unread-counter stack wired against the mocks
pub struct UnreadHarness {
	pub stream: Arc<MockChangeStream>,
	pub backend: Arc<MockNotificationBackend>,
	pub counter: Arc<UnreadCounter>,
	pub manager: Arc<UnreadManager>,
}

impl UnreadHarness {
	pub fn new() -> Self {
		Self::with_config(RealtimeConfig::default())
	}

	pub fn with_config(config: RealtimeConfig) -> Self {
		let stream = Arc::new(MockChangeStream::new());
		let backend = Arc::new(MockNotificationBackend::new());
		let counter = Arc::new(UnreadCounter::new(config.channels.item_capacity));
		let applier = UnreadApplier::new(Arc::clone(&counter));
		let manager = Arc::new(SubscriptionManager::new(
			Arc::clone(&stream),
			Arc::clone(&backend),
			applier,
			config,
		));

		Self {
			stream,
			backend,
			counter,
			manager,
		}
	}

	pub fn gateway(&self) -> UnreadGateway {
		MutationGateway::new(Arc::clone(&self.backend), Arc::clone(&self.manager))
	}

	pub async fn start_and_arm(&self, user_id: Uuid) {
		self.manager.start(user_id).await;
		self.wait_armed().await;
	}

	pub async fn wait_armed(&self) {
		let manager = Arc::clone(&self.manager);
		eventually("subscription armed", move || {
			let manager = Arc::clone(&manager);
			async move { manager.is_subscribed().await }
		})
		.await;
	}

	pub async fn wait_count(&self, want: u64) {
		let what = format!("unread count == {want}");
		eventually(&what, || {
			let ok = self.counter.read() == want;
			async move { ok }
		})
		.await;
	}
}

pub type FeedManager = SubscriptionManager<FeedApplier, MockChangeStream, MockFeedBackend>;

/// Full feed-cache stack wired against the mocks
pub struct FeedHarness {
	pub stream: Arc<MockChangeStream>,
	pub backend: Arc<MockFeedBackend>,
	pub cache: Arc<FeedCache>,
	pub manager: Arc<FeedManager>,
}

impl FeedHarness {
	pub fn new() -> Self {
		let stream = Arc::new(MockChangeStream::new());
		let backend = Arc::new(MockFeedBackend::new());
		let cache = Arc::new(FeedCache::new());
		let applier = FeedApplier::new(Arc::clone(&cache));
		let manager = Arc::new(SubscriptionManager::new(
			Arc::clone(&stream),
			Arc::clone(&backend),
			applier,
			RealtimeConfig::default(),
		));

		Self {
			stream,
			backend,
			cache,
			manager,
		}
	}

	pub async fn start_and_arm(&self, user_id: Uuid) {
		self.manager.start(user_id).await;
		let manager = Arc::clone(&self.manager);
		eventually("feed subscription armed", move || {
			let manager = Arc::clone(&manager);
			async move { manager.is_subscribed().await }
		})
		.await;
	}

	pub async fn wait_items(&self, want: usize) {
		let what = format!("feed items == {want}");
		eventually(&what, || {
			let ok = self.cache.read().items.len() == want;
			async move { ok }
		})
		.await;
	}
}
