//! Scoped ownership of a background worker task
//!
//! A `Session` owns exactly one spawned worker: its stop signal and its
//! join handle. `close` runs on every orderly exit path; a `Session`
//! dropped without closing aborts the worker rather than leak it. A leaked
//! worker is a correctness bug here, not an optimization concern: a timer
//! that outlives its session can resurrect a subscription for a user who
//! already signed out.

use std::{
	future::Future,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{error, warn};

/// Stop signal handed to a worker
///
/// The worker races this against its own work; when the session closes (or
/// is dropped) the signal resolves and the worker is expected to wind down.
pub struct Stopper(chan::Receiver<()>);

impl Stopper {
	/// Non-blocking check, for workers with natural poll points
	#[must_use]
	pub fn check_stop(&self) -> bool {
		self.0.try_recv().is_ok()
	}

	/// Resolves once a stop is requested or the owning session is gone
	pub async fn wait(&self) {
		self.0.recv().await.ok();
	}
}

/// Handle owning one running worker task
pub struct Session {
	name: &'static str,
	grace: Duration,
	stop_tx: chan::Sender<()>,
	handle: Option<JoinHandle<()>>,
	is_running: Arc<AtomicBool>,
}

impl Session {
	/// Spawn `run` as a worker task owned by the returned session
	pub fn spawn<F, Fut>(name: &'static str, grace: Duration, run: F) -> Self
	where
		F: FnOnce(Stopper) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (stop_tx, stop_rx) = chan::bounded(1);
		let is_running = Arc::new(AtomicBool::new(true));

		let fut = run(Stopper(stop_rx));
		let handle = tokio::spawn({
			let is_running = Arc::clone(&is_running);
			async move {
				fut.await;
				is_running.store(false, Ordering::Release);
			}
		});

		Self {
			name,
			grace,
			stop_tx,
			handle: Some(handle),
			is_running,
		}
	}

	pub fn is_running(&self) -> bool {
		self.is_running.load(Ordering::Acquire)
	}

	/// Signal the worker to stop and wait for it to finish
	///
	/// Workers that ignore the signal past the grace period are aborted.
	pub async fn close(mut self) {
		self.shutdown().await;
	}

	async fn shutdown(&mut self) {
		let Some(handle) = self.handle.take() else {
			return;
		};

		// A full channel means a stop is already pending, which is fine
		self.stop_tx.try_send(()).ok();

		let abort = handle.abort_handle();
		match timeout(self.grace, handle).await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				if e.is_panic() {
					error!(session = self.name, "worker panicked during shutdown");
				}
			}
			Err(_) => {
				error!(
					session = self.name,
					grace_ms = self.grace.as_millis() as u64,
					"worker did not stop within the grace period, aborting"
				);
				abort.abort();
			}
		}

		self.is_running.store(false, Ordering::Release);
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			warn!(
				session = self.name,
				"session dropped without close, aborting worker"
			);
			handle.abort();
			self.is_running.store(false, Ordering::Release);
		}
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("name", &self.name)
			.field("running", &self.is_running())
			.finish()
	}
}
