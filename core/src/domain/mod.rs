//! Core data types for the realtime layer
//!
//! Pure data carried between the change stream, the appliers, and the
//! aggregate stores. No IO lives here.

pub mod event;
pub mod notification;
pub mod post;

pub use event::{ChangeEvent, Operation, Table};
pub use notification::NotificationRow;
pub use post::PostRow;
