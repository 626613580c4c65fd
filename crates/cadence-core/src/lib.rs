//! Cadence Core - Fundamental types shared by the sequencer and idle scheduler
//!
//! This crate defines:
//! - Host event codes and the sequenced-event classifier
//! - Events and paint requests delivered by the host
//! - Idle task priorities, identities and completion status
//! - The reference-counted suspend/resume gate
//! - Error types

pub mod code;
pub mod error;
pub mod event;
pub mod priority;
pub mod suspend;

pub use code::*;
pub use error::*;
pub use event::*;
pub use priority::*;
pub use suspend::*;
