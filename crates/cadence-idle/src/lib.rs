//! Cadence Idle - Deferred work driven by the host idle signal
//!
//! Tasks are registered once, then queued by `TaskId` at one of three
//! priorities. Each host idle notification runs a pass over the queue that
//! stops the moment the host reports pending input.

pub mod host;
pub mod queue;

pub use host::*;
pub use queue::*;
