//! I/O adapters for the tracker.

pub mod config;
pub mod events;
pub mod fingerprint;
pub mod git;
pub mod process;
pub mod store;
