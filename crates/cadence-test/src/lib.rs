//! Cadence Test Harness - Driving the core without a real event loop
//!
//! This crate provides:
//! - A fake host implementing the idle capability
//! - Scripted handlers that re-enter a bridge mid-dispatch
//! - A seeded reentrancy simulator with an ordering oracle
//! - Scenario tests for the ordering and scheduling guarantees

pub mod fake_host;
pub mod integration;
pub mod scripted;
pub mod simulator;

pub use fake_host::*;
pub use integration::*;
pub use scripted::*;
pub use simulator::*;
