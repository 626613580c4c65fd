//! Cadence Runtime - Binding host notifications to the core
//!
//! A host loop owns one `HostBridge` per window and forwards three
//! notifications to it:
//! 1. Event arrived: classified, then passed through or sequenced
//! 2. Paint requested: painted now or coalesced into one repaint
//! 3. Host idle: one pass over the attached idle queue

pub mod bridge;
pub mod config;
pub mod logging;

pub use bridge::*;
pub use config::*;
pub use logging::{init_logging, LogConfig, LogFormat};
