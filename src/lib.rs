//! Durable, single-worker queue of grid file transfers.
//!
//! Jobs are persisted in SQLite, run one at a time by a pluggable
//! [`executor::TransferExecutor`], and resume from their last successful path
//! after a failure or restart.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod scheduler;
pub mod store;
