//! WebSocket progress stream.
//!
//! One socket per subscriber and job: replayed and live progress events in
//! wire format, a periodic heartbeat, and a close frame after the terminal
//! event or on server shutdown.

mod handler;

pub use handler::progress_ws;
