//! Change tracking and status aggregation for agentic workflows.
//!
//! A caller starts a unit of work, the tracker snapshots the repository, and
//! on completion it computes what changed, checks the changes against the
//! declared work areas, and rolls the result up through the
//! task/phase/workflow hierarchy.
//!
//! - **[`core`]**: Pure, deterministic logic (diff union, scope matching,
//!   status derivation, rollups). No I/O.
//! - **[`io`]**: Side-effecting adapters (git probe, fingerprinting, record
//!   store, event sinks, config).
//!
//! [`snapshot`], [`diff`] and [`unit`] are the stateless protocol operations;
//! [`tracker`] binds them to a record store and an event sink.

pub mod core;
pub mod diff;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod model;
pub mod snapshot;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracker;
pub mod unit;
