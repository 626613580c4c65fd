//! Cadence Sequencer - Ordered dispatch under host re-entry
//!
//! The host message pump can be re-entered while a handler is still running
//! (modal loops, blocking native calls). This crate keeps sequenced input in
//! strict arrival order across such re-entry:
//! 1. Classify the event (pass-through or sequenced)
//! 2. Outside a dispatch: handle it now, then drain everything deferred meanwhile
//! 3. Inside a dispatch: defer it to the SafeQueue and return
//! 4. Release the in-progress flag on every exit path

pub mod handler;
pub mod sequencer;

pub use handler::*;
pub use sequencer::*;
