use std::path::PathBuf;
use thiserror::Error;

/// Errors from the bounded run queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("run queue {name:?} is at capacity ({capacity})")]
    Full { name: String, capacity: usize },
}

/// Errors from the durable input-queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(#[from] saltbus::BusError),

    #[error("stored record is not valid: {0}")]
    BadRecord(#[from] serde_json::Error),
}

/// Per-request submission failures. These never abort a poll cycle: the
/// record stays on its input queue and is retried on a later tick.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no client handle for kind {0:?}")]
    UnknownClientKind(String),

    #[error("cannot encode low data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("backend rejected submission: {0}")]
    Backend(#[from] saltbus::BusError),

    #[error("backend returned malformed jid {0:?}")]
    BadJid(String),
}

/// Event-stream failures.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event stream unavailable: {0}")]
    Stream(#[from] saltbus::BusError),
}

/// Failures surfaced to callers initializing a new request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("input queue {0:?} is not configured")]
    UnknownQueue(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Faults that abort one poll/update tick. The driver logs and retries on
/// the next tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// Errors loading the service configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("input queue {0:?} is configured twice")]
    DuplicateQueue(String),

    #[error("input queue {0:?} must have capacity > 0")]
    ZeroCapacity(String),

    #[error("loop_interval must be positive (got {0})")]
    BadInterval(f64),
}
