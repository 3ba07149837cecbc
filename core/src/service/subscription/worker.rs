//! Subscription worker: the single-writer loop for one (table, user) feed
//!
//! Every trigger the feed reacts to (stream events, status transitions,
//! gateway commands, the reconnect timer, the stop signal) is multiplexed
//! through one select loop on one task. Aggregate mutation only ever
//! happens from this loop, so interleavings that would race a counter are
//! impossible rather than unlikely.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
	config::RealtimeConfig,
	domain::{ChangeEvent, Operation},
	error::Result,
	infra::{BaselineFetch, ChangeStream, ChannelStatus, StreamFilter, Subscription},
	service::{
		applier::{Correction, EventApplier},
		session::Stopper,
	},
};

/// Commands accepted by a running worker, serialized with event
/// application through the same mailbox
#[derive(Debug)]
pub(crate) enum Command {
	/// Re-run the baseline query and reseed the aggregate
	Refetch { ack: oneshot::Sender<Result<()>> },
	/// Apply a corrective transition after an acknowledged backend write
	Reconcile {
		correction: Correction,
		ack: oneshot::Sender<()>,
	},
}

/// Outcome of the armed sequence
enum Armed {
	Live(Subscription),
	Retry,
	Stopped,
	Closed,
}

/// Outcome of one live subscription
enum Exit {
	Stopped,
	Retry,
	Closed,
}

pub(crate) struct Worker<A, S, B>
where
	A: EventApplier,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	pub user_id: Uuid,
	pub stream: Arc<S>,
	pub fetcher: Arc<B>,
	pub applier: A,
	pub config: RealtimeConfig,
	pub commands: mpsc::Receiver<Command>,
	pub subscribed: watch::Sender<bool>,
	/// Highest stream position folded into the aggregate; events at or
	/// below it are duplicates or already covered by a baseline
	pub watermark: u64,
}

impl<A, S, B> Worker<A, S, B>
where
	A: EventApplier,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	pub(crate) async fn run(mut self, stop: Stopper) {
		info!(
			user_id = %self.user_id,
			table = %self.applier.table(),
			"subscription worker started"
		);

		// Consecutive failed reconnect attempts; resets once a
		// subscription arms successfully
		let mut attempt: u32 = 0;

		let exit = loop {
			match self.establish(&stop).await {
				Armed::Live(subscription) => {
					attempt = 0;
					match self.live(&subscription, &stop).await {
						Exit::Retry => {}
						exit @ (Exit::Stopped | Exit::Closed) => break exit,
					}
				}
				Armed::Retry => {}
				Armed::Stopped => break Exit::Stopped,
				Armed::Closed => break Exit::Closed,
			}

			if !self.config.reconnect.allows_attempt(attempt) {
				warn!(
					user_id = %self.user_id,
					table = %self.applier.table(),
					attempts = attempt,
					"reconnect attempts exhausted, giving up"
				);
				break Exit::Closed;
			}
			if !self.backoff(attempt, &stop).await {
				break Exit::Stopped;
			}
			attempt += 1;
		};

		self.subscribed.send_replace(false);
		if matches!(exit, Exit::Stopped) {
			// Session over: the aggregate is destroyed, not merely frozen
			self.applier.reset();
		}

		info!(
			user_id = %self.user_id,
			table = %self.applier.table(),
			"subscription worker stopped"
		);
	}

	/// Open a subscription and seed the aggregate from a baseline
	///
	/// The subscription is opened before the baseline query runs, so every
	/// event delivered inside the fetch window lands in a bounded buffer
	/// instead of a gap. Buffered events at or below the baseline
	/// watermark are already part of the snapshot and get discarded when
	/// the buffer drains.
	async fn establish(&mut self, stop: &Stopper) -> Armed {
		self.subscribed.send_replace(false);

		let kinds = [Operation::Insert, Operation::Update, Operation::Delete];
		let subscription = match self
			.stream
			.subscribe(
				self.applier.table(),
				StreamFilter::owner(self.user_id),
				&kinds,
			)
			.await
		{
			Ok(subscription) => subscription,
			Err(e) => {
				warn!(
					user_id = %self.user_id,
					table = %self.applier.table(),
					error = %e,
					"failed to open change stream subscription"
				);
				return Armed::Retry;
			}
		};

		let fetcher = Arc::clone(&self.fetcher);
		let mut fetch = fetcher.fetch(self.user_id);
		let mut buffer: Vec<ChangeEvent> = Vec::new();

		let baseline = loop {
			tokio::select! {
				_ = stop.wait() => return Armed::Stopped,
				result = &mut fetch => break result,
				event = subscription.events().recv() => match event {
					Ok(event) => {
						if buffer.len() >= self.config.channels.arming_buffer {
							warn!(
								capacity = self.config.channels.arming_buffer,
								"arming buffer full, dropping oldest buffered event"
							);
							buffer.remove(0);
						}
						buffer.push(event);
					}
					Err(_) => {
						warn!(user_id = %self.user_id, "change stream went away during baseline fetch");
						return Armed::Retry;
					}
				},
				status = subscription.statuses().recv() => match status {
					Ok(ChannelStatus::Error) => {
						warn!(user_id = %self.user_id, "channel error during baseline fetch");
						return Armed::Retry;
					}
					Ok(ChannelStatus::Closed) => {
						info!(user_id = %self.user_id, "channel closed during baseline fetch");
						return Armed::Closed;
					}
					Ok(status) => trace!(status = status.as_ref(), "channel status"),
					Err(_) => {
						warn!(user_id = %self.user_id, "status channel went away during baseline fetch");
						return Armed::Retry;
					}
				},
			}
		};

		match baseline {
			Ok(baseline) => {
				self.applier.seed(baseline.seed);
				self.watermark = self.watermark.max(baseline.watermark);

				let buffered = buffer.len();
				for event in buffer {
					self.apply(event);
				}
				if buffered > 0 {
					debug!(buffered, "drained events buffered during baseline fetch");
				}

				self.subscribed.send_replace(true);
				info!(
					user_id = %self.user_id,
					table = %self.applier.table(),
					watermark = self.watermark,
					"subscription armed"
				);
				Armed::Live(subscription)
			}
			Err(e) => {
				// Stale-but-not-corrupt: the previous aggregate value stands
				warn!(
					user_id = %self.user_id,
					table = %self.applier.table(),
					error = %e,
					"baseline fetch failed"
				);
				Armed::Retry
			}
		}
	}

	async fn live(&mut self, subscription: &Subscription, stop: &Stopper) -> Exit {
		enum Step {
			Stopped,
			Event(ChangeEvent),
			StreamLost,
			Status(ChannelStatus),
			Command(Option<Command>),
		}

		loop {
			let step = tokio::select! {
				_ = stop.wait() => Step::Stopped,
				event = subscription.events().recv() => {
					event.map_or(Step::StreamLost, Step::Event)
				}
				status = subscription.statuses().recv() => {
					status.map_or(Step::StreamLost, Step::Status)
				}
				command = self.commands.recv() => Step::Command(command),
			};

			match step {
				Step::Stopped => return Exit::Stopped,
				Step::Event(event) => self.apply(event),
				Step::StreamLost => {
					warn!(user_id = %self.user_id, "change stream went away");
					return Exit::Retry;
				}
				Step::Status(ChannelStatus::Error) => {
					warn!(user_id = %self.user_id, "channel error, scheduling reconnect");
					return Exit::Retry;
				}
				Step::Status(ChannelStatus::Closed) => {
					info!(user_id = %self.user_id, "channel closed");
					return Exit::Closed;
				}
				Step::Status(status) => trace!(status = status.as_ref(), "channel status"),
				Step::Command(Some(command)) => self.handle_command(command).await,
				Step::Command(None) => {
					debug!(user_id = %self.user_id, "command channel closed, stopping");
					return Exit::Stopped;
				}
			}
		}
	}

	/// Wait out the reconnect delay, still serving gateway commands
	///
	/// Returns false when stopped while waiting.
	async fn backoff(&mut self, attempt: u32, stop: &Stopper) -> bool {
		enum Step {
			Stopped,
			Elapsed,
			Command(Option<Command>),
		}

		let delay = self.config.reconnect.delay_for(attempt);
		info!(
			user_id = %self.user_id,
			table = %self.applier.table(),
			delay_ms = delay.as_millis() as u64,
			attempt,
			"scheduling reconnect"
		);

		let deadline = tokio::time::sleep(delay);
		tokio::pin!(deadline);

		loop {
			let step = tokio::select! {
				_ = stop.wait() => Step::Stopped,
				_ = &mut deadline => Step::Elapsed,
				command = self.commands.recv() => Step::Command(command),
			};

			match step {
				Step::Stopped => return false,
				Step::Elapsed => return true,
				Step::Command(Some(command)) => self.handle_command(command).await,
				Step::Command(None) => return false,
			}
		}
	}

	async fn handle_command(&mut self, command: Command) {
		match command {
			Command::Refetch { ack } => {
				let result = self.refetch().await;
				ack.send(result).ok();
			}
			Command::Reconcile { correction, ack } => {
				self.applier.reconcile(correction);
				ack.send(()).ok();
			}
		}
	}

	async fn refetch(&mut self) -> Result<()> {
		let fetcher = Arc::clone(&self.fetcher);
		match fetcher.fetch(self.user_id).await {
			Ok(baseline) => {
				self.applier.seed(baseline.seed);
				self.watermark = self.watermark.max(baseline.watermark);
				debug!(
					user_id = %self.user_id,
					watermark = self.watermark,
					"aggregate reseeded"
				);
				Ok(())
			}
			Err(e) => {
				warn!(
					user_id = %self.user_id,
					error = %e,
					"refetch failed, keeping previous aggregate"
				);
				Err(e)
			}
		}
	}

	fn apply(&mut self, event: ChangeEvent) {
		if event.sequence <= self.watermark {
			trace!(
				sequence = event.sequence,
				watermark = self.watermark,
				"dropping replayed or pre-baseline event"
			);
			return;
		}
		self.watermark = event.sequence;
		self.applier.apply(&event);
	}
}
