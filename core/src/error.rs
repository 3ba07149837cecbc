//! Error taxonomy for the realtime layer
//!
//! Transient network-class failures (`Channel`, `Baseline`) are recovered
//! locally by the subscription worker and never crash the host; they only
//! surface to callers on explicit operations (`refetch`). Logical misuse
//! (`NoActiveSession`) is a hard error.

/// Errors produced by the realtime synchronization layer
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The change stream reported a failure or went away
	#[error("change stream channel failure: {0}")]
	Channel(anyhow::Error),

	/// The point-in-time baseline query failed; local state is stale but intact
	#[error("baseline fetch failed: {0}")]
	Baseline(anyhow::Error),

	/// A bulk corrective write failed; local state was left untouched
	#[error("bulk mutation failed: {0}")]
	Mutation(anyhow::Error),

	/// An operation that requires an active session was called without one
	#[error("no active session")]
	NoActiveSession,

	/// The subscription worker is no longer accepting commands
	#[error("subscription worker has shut down")]
	WorkerGone,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
