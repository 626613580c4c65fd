//! Cadence Queue - Queues used by the sequencer and idle scheduler
//!
//! - `SafeQueue`: circular buffer that keeps a safety margin of free slots so
//!   insertions arriving while it grows never overflow
//! - `PriorityQueue`: three-tier FIFO, drained tier-major

pub mod priority_queue;
pub mod safe_queue;

pub use priority_queue::*;
pub use safe_queue::*;
