//! plaza-core — realtime synchronization layer for the Plaza client
//!
//! Keeps locally cached aggregates (the unread notification count, the
//! home feed) consistent with the backend's live change stream across
//! network drops, re-subscriptions, and identity changes.
//!
//! ## Architecture
//!
//! - [`infra`] holds the seams to external collaborators: the change
//!   stream, the baseline/mutation backend, and the identity event source.
//! - [`store`] holds the observable aggregates the UI reads.
//! - [`service`] holds the moving parts: per-feed subscription workers,
//!   the event appliers, the mutation gateway, and the identity-driven
//!   coordinator.
//!
//! Each feed runs as one worker task that multiplexes every trigger
//! (events, status transitions, commands, timers, shutdown) through a
//! single select loop, so aggregate mutation is single-writer by
//! construction.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod service;
pub mod store;

pub use config::RealtimeConfig;
pub use error::{Error, Result};

/// Initialize console logging for host binaries
///
/// Hosts embedding their own subscriber should skip this and add their
/// own filter directives instead.
pub fn init_logging() {
	tracing_subscriber::registry()
		.with(
			EnvFilter::from_default_env()
				.add_directive("warn".parse().expect("invalid tracing directive"))
				.add_directive(
					"plaza_core=debug"
						.parse()
						.expect("invalid tracing directive"),
				),
		)
		.with(fmt::layer())
		.init();
}
