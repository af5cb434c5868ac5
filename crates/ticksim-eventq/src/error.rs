use thiserror::Error;

use crate::checkpoint::KindTag;
use crate::{ItemId, ItemState, Tick};

/// A broken kernel precondition.
///
/// These are programming errors. The queue reports them through `tracing` and then panics, since
/// continuing with a corrupted pending set would desynchronize simulated time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("causality violation: {item} (`{name}`) scheduled for tick {due}, which is before the current tick")]
    Causality { item: ItemId, name: String, due: Tick },

    #[error("double schedule: {item} (`{name}`) is already pending for tick {due}")]
    DoubleSchedule { item: ItemId, name: String, due: Tick },

    #[error("invalid deschedule: {item} (`{name}`) is {state:?}, not pending")]
    NotPending {
        item: ItemId,
        name: String,
        state: ItemState,
    },

    #[error("dangling caller-owned item: {item} (`{name}`) destroyed while pending for tick {due}")]
    DanglingCallerOwned { item: ItemId, name: String, due: Tick },

    #[error("{item} (`{name}`) is queue-owned and cannot be destroyed by its caller once scheduled")]
    NotCallerOwned { item: ItemId, name: String },

    #[error("unknown work item {item}: never created on this queue or already reclaimed")]
    UnknownItem { item: ItemId },

    #[error("re-entrant {operation} called from inside a running action")]
    ReentrantService { operation: &'static str },
}

/// Failure at the checkpoint boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("pending {item} (`{name}`) has no checkpoint binding")]
    NotCheckpointable { item: ItemId, name: String },

    #[error("cannot restore into a queue with {pending} pending items")]
    QueueNotEmpty { pending: usize },

    #[error("checkpoint record {index} is not ordered after its predecessor")]
    OutOfOrder { index: usize },

    #[error("checkpoint record {index} is due at tick {due}, before checkpoint tick {now}")]
    DueBeforeCheckpoint { index: usize, due: Tick, now: Tick },

    #[error("checkpoint record {index} has sequence {seq}, not below next sequence {next_seq}")]
    SequenceOutOfRange { index: usize, seq: u64, next_seq: u64 },

    #[error("no factory registered for item kind {0}")]
    UnknownKind(KindTag),

    #[error("failed to rebuild item kind {kind}: {reason}")]
    Rebuild { kind: KindTag, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("target timeline `{timeline}` is no longer accepting work")]
    Disconnected { timeline: String },
}
