//! Pull loop feeding deliveries to the orchestrator one at a time.

use crate::error::TransportResult;
use crate::orchestrator::JobOrchestrator;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub struct Worker {
    orchestrator: JobOrchestrator,
    poll_interval: Duration,
}

impl Worker {
    #[must_use]
    pub fn new(orchestrator: JobOrchestrator, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
        }
    }

    /// Process deliveries until `shutdown` resolves, `max_jobs` deliveries
    /// have been handled, or a transport error occurs. Returns the number of
    /// deliveries handled.
    ///
    /// A job in flight always runs to its acknowledgement; shutdown is only
    /// observed between jobs.
    pub async fn run<F>(&self, shutdown: F, max_jobs: Option<usize>) -> TransportResult<usize>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let broker = self.orchestrator.broker();
        let mut handled = 0;
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            ?max_jobs,
            "Worker started"
        );

        loop {
            if max_jobs.is_some_and(|max| handled >= max) {
                break;
            }

            let delivery = tokio::select! {
                () = &mut shutdown => break,
                delivery = broker.next_delivery() => delivery?,
            };

            if let Some(delivery) = delivery {
                self.orchestrator.handle(&delivery).await?;
                handled += 1;
                continue;
            }

            debug!("Job queue empty");
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(handled, "Worker stopped");
        Ok(handled)
    }
}
