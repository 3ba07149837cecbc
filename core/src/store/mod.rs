//! Locally cached aggregates exposed to the UI layer
//!
//! Stores are observed through `watch`/`broadcast` channels and mutated
//! only through `pub(crate)` entry points reachable from the applier and
//! gateway paths. Single-writer discipline is enforced by visibility: UI
//! code cannot touch an aggregate directly.

pub mod feed;
pub mod unread;

pub use feed::{FeedCache, FeedSnapshot};
pub use unread::UnreadCounter;
