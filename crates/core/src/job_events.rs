//! Progress message type constants.
//!
//! These are the `type` values of the progress event wire envelope and are
//! shared by the broadcast service, the WebSocket handler and the polling
//! endpoint.

/// First message on every real-time subscription.
pub const MSG_TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";

/// A stage started, advanced or finished.
pub const MSG_TYPE_AGENT_PROGRESS: &str = "agent_progress";

/// Terminal: the add-on was packaged and validated.
pub const MSG_TYPE_CONVERSION_COMPLETE: &str = "conversion_complete";

/// Terminal: a stage failed.
pub const MSG_TYPE_CONVERSION_FAILED: &str = "conversion_failed";

/// Terminal: the job was cancelled by request.
pub const MSG_TYPE_CONVERSION_CANCELLED: &str = "conversion_cancelled";

/// Reply to a client keep-alive.
pub const MSG_TYPE_PONG: &str = "pong";
