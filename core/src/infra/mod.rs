//! Interfaces to external collaborators
//!
//! The backend change stream, the baseline/mutation APIs, and the identity
//! event source are consumed through the traits here; production transports
//! live outside this crate and tests provide in-memory implementations.

pub mod backend;
pub mod identity;
pub mod stream;

pub use backend::{Baseline, BaselineFetch, BulkMutation};
pub use identity::{AuthEvent, IdentityBus};
pub use stream::{ChangeStream, ChannelStatus, StreamFilter, Subscription};
