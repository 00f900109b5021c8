//! Prometheus metrics for the transfer queue
//!
//! Key metrics exposed:
//! - Jobs enqueued, started, completed, failed, cancelled and purged
//! - Per-file outcomes
//! - Queue depth and active job count
//! - Job execution duration

pub mod exporter;
pub mod recorder;

pub use exporter::{install_recorder, metrics_route, render_metrics, MetricsError};
pub use recorder::{init_metrics, JobTimer};
