//! Error types for Cadence

use thiserror::Error;

use crate::{EventCode, TaskId};

/// Core Cadence errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CadenceError {
    // Queue errors
    #[error("Remove called on an empty queue")]
    EmptyQueue,

    #[error("Queue capacity exceeded: limit {capacity}, requested {requested}")]
    CapacityExceeded { capacity: usize, requested: usize },

    #[error("No free slots left in queue of capacity {capacity} while growth is in flight")]
    NoFreeSlots { capacity: usize },

    // Usage errors
    #[error("Resume called with suspend counter at zero")]
    UnbalancedResume,

    #[error("End of sequential block without a matching begin")]
    UnbalancedSequentialBlock,

    #[error("Sequencer has been torn down")]
    SequencerTornDown,

    #[error("Idle queue has been shut down")]
    IdleQueueShutDown,

    #[error("Unknown idle task: {0:?}")]
    UnknownTask(TaskId),

    // Caller failures
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Handler failed for event {code:?}: {reason}")]
    EventHandler { code: EventCode, reason: String },

    #[error("Idle task {task:?} failed: {reason}")]
    Task { task: TaskId, reason: String },

    // Ambient
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl CadenceError {
    /// Usage errors indicate a caller bug, never a transient condition
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CadenceError::EmptyQueue
                | CadenceError::UnbalancedResume
                | CadenceError::UnbalancedSequentialBlock
                | CadenceError::UnknownTask(_)
        )
    }
}

/// Result type for Cadence operations
pub type CadenceResult<T> = Result<T, CadenceError>;
