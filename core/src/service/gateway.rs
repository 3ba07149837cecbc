//! Bulk corrective writes reconciled against the local aggregate

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
	error::{Error, Result},
	infra::{BaselineFetch, BulkMutation, ChangeStream},
	service::{
		applier::{Correction, EventApplier},
		subscription::SubscriptionManager,
	},
};

/// Issues bulk backend writes and updates the local aggregate only after
/// the write is acknowledged
///
/// The local transition runs through the subscription worker's mailbox, so
/// it is serialized with live event application; there is never a second
/// writer racing the counter.
pub struct MutationGateway<M, A, S, B>
where
	M: BulkMutation,
	A: EventApplier + Clone + Sync,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	mutations: Arc<M>,
	feed: Arc<SubscriptionManager<A, S, B>>,
}

impl<M, A, S, B> MutationGateway<M, A, S, B>
where
	M: BulkMutation,
	A: EventApplier + Clone + Sync,
	S: ChangeStream,
	B: BaselineFetch<Seed = A::Seed>,
{
	pub fn new(mutations: Arc<M>, feed: Arc<SubscriptionManager<A, S, B>>) -> Self {
		Self { mutations, feed }
	}

	/// Mark every unread row as read, then collapse the local counter
	///
	/// On failure the local aggregate is left untouched and the error is
	/// returned to the caller; there is no optimistic state to roll back
	/// because nothing local changes before the acknowledgment.
	pub async fn mark_all_read(&self) -> Result<()> {
		let user_id = self
			.feed
			.current_user()
			.await
			.ok_or(Error::NoActiveSession)?;

		if let Err(e) = self.mutations.mark_all_read(user_id).await {
			warn!(
				user_id = %user_id,
				error = %e,
				"bulk mark-all-read failed, local counter left unchanged"
			);
			return Err(e);
		}

		self.feed.reconcile(Correction::AllRead).await?;
		info!(user_id = %user_id, "marked all notifications read");
		Ok(())
	}
}
