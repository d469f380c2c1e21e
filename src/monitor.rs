use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::Backend;
use crate::types::BackendStatus;

/// Polls the backend's health endpoint until it first answers, then stops.
///
/// The monitor is the only writer of [`BackendStatus`]. Failed probes are
/// silent and retried on the next tick; once the backend is `Ready` the loop
/// exits for good and never re-checks.
pub struct LivenessMonitor<B> {
    backend: Arc<B>,
    interval: Duration,
    status: watch::Sender<BackendStatus>,
}

impl<B> LivenessMonitor<B>
where
    B: Backend + 'static,
{
    pub fn new(backend: Arc<B>, interval: Duration) -> Self {
        let (status, _) = watch::channel(BackendStatus::Unknown);
        Self {
            backend,
            interval,
            status,
        }
    }

    /// A receiver that observes status changes. Hand one to the pipeline.
    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> BackendStatus {
        *self.status.borrow()
    }

    /// Probe immediately, then once per interval, until the first success.
    ///
    /// Returns the number of probes it took.
    pub async fn run(&self) -> u32 {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.backend.health().await {
                Ok(true) => {
                    self.status.send_if_modified(|status| {
                        if *status == BackendStatus::Ready {
                            return false;
                        }
                        *status = BackendStatus::Ready;
                        true
                    });
                    info!(attempts, "generation backend is ready");
                    return attempts;
                }
                Ok(false) => debug!(attempts, "backend health check returned a non-success status"),
                Err(e) => debug!(attempts, error = %e, "backend health check failed"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Spawn the polling loop as a background tokio task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<u32> {
        tokio::spawn(async move { self.run().await })
    }
}
