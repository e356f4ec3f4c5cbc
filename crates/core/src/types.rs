/// Conversion jobs are keyed by random UUIDs.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Per-job progress event sequence number (starts at 1).
pub type SequenceNumber = u64;
