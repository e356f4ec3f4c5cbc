//! Progress broadcast service for conversion jobs.
//!
//! - [`ProgressBus`] keeps one append-only event log per job and fans new
//!   events out to live subscribers over `tokio::sync::broadcast`.
//! - [`Subscription`] replays the log from a sequence number, then follows
//!   live events until the job's terminal event.
//! - [`PollSnapshot`] is the pull-based view for clients without a socket.
//! - [`wire`] renders events in the JSON envelope sent to browsers.

pub mod bus;
pub mod event;
pub mod subscription;
pub mod wire;

pub use bus::{BroadcastError, PollSnapshot, ProgressBus};
pub use event::{EventType, ProgressEvent, ProgressUpdate};
pub use subscription::Subscription;
