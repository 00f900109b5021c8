//! Periodic trigger for the queue worker.
//!
//! Enqueue and resume already start the worker; the timer covers jobs that
//! sat ENQUEUED because a start attempt failed or the process restarted.

use crate::coordinator::TransferCoordinator;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct QueueScheduler;

impl QueueScheduler {
    /// Call `process_next_if_idle` every `interval` until shut down.
    pub fn spawn(coordinator: TransferCoordinator, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match coordinator.process_next_if_idle().await {
                            Ok(Some(job)) => {
                                tracing::debug!("Scheduler started transfer job {}", job.id);
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!("Scheduler could not start queue: {}", e),
                        }
                    }
                }
            }

            tracing::info!("Queue scheduler stopped");
        });

        tracing::info!("Queue scheduler running every {:?}", interval);
        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for the loop to exit. A job already started
    /// keeps running on the worker.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Queue scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
