//! The read stage: drain queued tuples and check a random permission for each.

use std::sync::Arc;

use tokio::time::Instant;

use super::counters::{QUEUE_DEPTH_METRIC, WorkerMetrics};
use super::queue::Consumer;
use crate::authorizer::Authorizer;
use crate::fake::Faker;

/// Everything a single read worker needs.
#[derive(Debug)]
pub(crate) struct ReadWorker<A, F> {
    pub id: usize,
    pub authorizer: Arc<A>,
    pub faker: F,
    pub consumer: Consumer,
    pub dry_run: bool,
    pub deadline: Instant,
}

impl<A: Authorizer, F: Faker> ReadWorker<A, F> {
    /// Checks queued tuples until the deadline.
    ///
    /// Every task taken from the queue is checked exactly once. In dry-run mode tasks are drained
    /// without a check and without touching any counter.
    pub async fn run(mut self) -> WorkerMetrics {
        let mut metrics = WorkerMetrics::default();
        tracing::debug!(worker = self.id, "read worker started");

        while Instant::now() < self.deadline {
            let Some(tuple) = self.consumer.recv_until(self.deadline).await else {
                break;
            };
            metrics::gauge!(QUEUE_DEPTH_METRIC).set(self.consumer.len() as f64);

            if self.dry_run {
                continue;
            }

            let permission = self.faker.permission();
            let start = Instant::now();
            let result = match self.authorizer.check(&tuple, &permission).await {
                Ok(allowed) => {
                    metrics.check_timing.add(start.elapsed().as_secs_f64());
                    tracing::debug!(
                        worker = self.id,
                        %tuple,
                        %permission,
                        allowed,
                        "permission checked"
                    );
                    Some(allowed)
                }
                Err(err) => {
                    tracing::warn!(
                        worker = self.id,
                        error = format_args!("{err:#}"),
                        "failed to check permission"
                    );
                    None
                }
            };

            metrics.counters.record_check(result);
        }

        tracing::debug!(worker = self.id, "read worker stopped");
        metrics
    }
}
