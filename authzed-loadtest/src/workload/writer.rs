//! The write stage: mint relationships, write them, and fan out read tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::counters::WorkerMetrics;
use super::queue::{Enqueue, Producer};
use super::Tuple;
use crate::authorizer::Authorizer;
use crate::fake::{Faker, Vocabulary};

/// Everything a single write worker needs.
#[derive(Debug)]
pub(crate) struct WriteWorker<A, F> {
    pub id: usize,
    pub authorizer: Arc<A>,
    pub faker: F,
    pub vocabulary: Arc<Vocabulary>,
    pub producer: Producer,
    pub read_ratio: usize,
    pub dry_run: bool,
    pub idle_backoff: Duration,
    pub deadline: Instant,
}

impl<A: Authorizer, F: Faker> WriteWorker<A, F> {
    fn next_tuple(&mut self) -> Tuple {
        Tuple {
            subject_type: self.vocabulary.subject_type.clone(),
            subject_id: self.faker.subject_id(),
            relation: self.faker.relation(),
            object_type: self.vocabulary.object_type.clone(),
            object_id: self.faker.object_id(),
        }
    }

    /// Writes relationships until the deadline.
    ///
    /// Every successful write queues `read_ratio` copies of its tuple. A failed write queues
    /// nothing and is not retried here.
    pub async fn run(mut self) -> WorkerMetrics {
        let mut metrics = WorkerMetrics::default();
        tracing::debug!(worker = self.id, "write worker started");

        while Instant::now() < self.deadline {
            let tuple = self.next_tuple();

            if self.dry_run {
                tokio::time::sleep(self.idle_backoff).await;
                continue;
            }

            let start = Instant::now();
            if let Err(err) = self.authorizer.write(&tuple).await {
                tracing::warn!(
                    worker = self.id,
                    error = format_args!("{err:#}"),
                    "failed to write relationship"
                );
                metrics.counters.record_write(false);
                continue;
            }

            metrics.write_timing.add(start.elapsed().as_secs_f64());
            metrics.counters.record_write(true);
            tracing::debug!(
                worker = self.id,
                %tuple,
                "relationship written"
            );

            self.fan_out(tuple, &mut metrics).await;
        }

        tracing::debug!(worker = self.id, "write worker stopped");
        metrics
    }

    async fn fan_out(&self, tuple: Tuple, metrics: &mut WorkerMetrics) {
        for sent in 0..self.read_ratio {
            match self.producer.send_until(tuple.clone(), self.deadline).await {
                Enqueue::Queued => metrics.enqueued += 1,
                Enqueue::Expired | Enqueue::Closed => {
                    metrics.dropped += (self.read_ratio - sent) as u64;
                    break;
                }
            }
        }
    }
}
