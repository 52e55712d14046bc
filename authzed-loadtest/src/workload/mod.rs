//! The workload engine: write workers feed read workers through a bounded queue until a deadline.
//!
//! A run starts `write_workers` write workers and `min(read_ratio, max_readers)` read workers.
//! Each successful write queues `read_ratio` copies of the written tuple, each read worker takes
//! tuples from the queue and checks a random permission for them. The ratio therefore holds at
//! the point of production, not necessarily at the point of consumption.
//!
//! Cancellation is cooperative: every worker re-checks the deadline after each operation, so a run
//! may overrun its deadline by the latency of one in-flight call per worker, bounded by the
//! client's own timeout and retry budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use authzed_client::{ObjectReference, Relationship, SubjectReference};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::time::Instant;

use crate::authorizer::Authorizer;
use crate::fake::{SeededFaker, Vocabulary};
use crate::report::Summary;

pub mod counters;
pub mod queue;
mod reader;
mod writer;

pub use counters::{RunCounters, WorkerMetrics};

use reader::ReadWorker;
use writer::WriteWorker;

/// A relationship that was written and now awaits a permission check.
///
/// Tuples have no identity beyond their fields. The same tuple is queued once per unit of the
/// read ratio.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tuple {
    /// Object type of the subject, for example `user`.
    pub subject_type: String,
    /// Identifier of the subject.
    pub subject_id: String,
    /// The relation the subject holds on the resource.
    pub relation: String,
    /// Object type of the resource, for example `document`.
    pub object_type: String,
    /// Identifier of the resource.
    pub object_id: String,
}

impl Tuple {
    /// The resource side of this tuple.
    pub fn resource(&self) -> ObjectReference {
        ObjectReference::new(&self.object_type, &self.object_id)
    }

    /// The subject side of this tuple.
    pub fn subject(&self) -> SubjectReference {
        SubjectReference::new(&self.subject_type, &self.subject_id)
    }

    /// The relationship this tuple describes.
    pub fn relationship(&self) -> Relationship {
        Relationship::new(self.resource(), &self.relation, self.subject())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.object_type, self.object_id, self.relation, self.subject_type, self.subject_id
        )
    }
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    duration: Duration,
    read_ratio: usize,
    write_workers: usize,
    max_readers: Option<usize>,
    queue_capacity: usize,
    idle_backoff: Duration,
    dry_run: bool,
    seed: u64,
    vocabulary: Vocabulary,
}

impl WorkloadBuilder {
    /// Number of permission checks queued per successful write.
    pub fn read_ratio(mut self, read_ratio: usize) -> Self {
        self.read_ratio = read_ratio;
        self
    }

    /// Number of concurrent write workers.
    pub fn write_workers(mut self, write_workers: usize) -> Self {
        self.write_workers = write_workers.max(1);
        self
    }

    /// Caps the number of concurrent read workers, which otherwise equals the read ratio.
    pub fn max_readers(mut self, max_readers: Option<usize>) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Capacity of the queue between write and read workers.
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    /// Time a dry-run write worker spends per iteration in place of the API call.
    pub fn idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Exercises timing and control flow without calling the authorization service.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Seed for all generated identifiers.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The identifiers to draw relationships and checks from.
    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Creates the workload instance.
    pub fn build(self) -> Workload {
        Workload {
            duration: self.duration,
            read_ratio: self.read_ratio,
            write_workers: self.write_workers,
            max_readers: self.max_readers,
            queue_capacity: self.queue_capacity,
            idle_backoff: self.idle_backoff,
            dry_run: self.dry_run,
            seed: self.seed,
            vocabulary: Arc::new(self.vocabulary),
        }
    }
}

/// A load test against an authorization service, created with [`Workload::builder`].
#[derive(Clone, Debug)]
pub struct Workload {
    pub(crate) duration: Duration,
    pub(crate) read_ratio: usize,
    pub(crate) write_workers: usize,
    pub(crate) max_readers: Option<usize>,
    pub(crate) queue_capacity: usize,
    pub(crate) idle_backoff: Duration,
    pub(crate) dry_run: bool,
    pub(crate) seed: u64,
    pub(crate) vocabulary: Arc<Vocabulary>,
}

impl Workload {
    /// Constructs a new workload builder for a run of the given duration.
    pub fn builder(duration: Duration) -> WorkloadBuilder {
        WorkloadBuilder {
            duration,
            read_ratio: 1,
            write_workers: 1,
            max_readers: None,
            queue_capacity: 10_000,
            idle_backoff: Duration::from_millis(5),
            dry_run: false,
            seed: rand::random(),
            vocabulary: Vocabulary::default(),
        }
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the run skips all calls to the authorization service.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Number of read workers this workload starts.
    ///
    /// One per unit of read ratio, capped at `max_readers`. Zero for a write-only workload.
    pub fn read_workers(&self) -> usize {
        match self.max_readers {
            Some(max) => self.read_ratio.min(max.max(1)),
            None => self.read_ratio,
        }
    }

    /// Number of write workers this workload starts.
    pub fn write_workers(&self) -> usize {
        self.write_workers
    }
}

/// Runs the workload against `authorizer` and summarizes the outcome.
///
/// The deadline is computed once at the start. The function returns after every worker has
/// observed the deadline and exited.
pub async fn run<A: Authorizer>(authorizer: Arc<A>, workload: Workload) -> Result<Summary> {
    let started = Instant::now();
    let deadline = started + workload.duration;

    let read_workers = workload.read_workers();
    let (producer, consumer) = queue::bounded(workload.queue_capacity);
    let mut seeds = SmallRng::seed_from_u64(workload.seed);

    tracing::info!(
        duration = ?workload.duration,
        write_workers = workload.write_workers,
        read_workers,
        read_ratio = workload.read_ratio,
        dry_run = workload.dry_run,
        "starting load generation"
    );

    let writers: Vec<_> = (0..workload.write_workers)
        .map(|id| {
            let worker = WriteWorker {
                id,
                authorizer: Arc::clone(&authorizer),
                faker: SeededFaker::new(seeds.next_u64(), Arc::clone(&workload.vocabulary)),
                vocabulary: Arc::clone(&workload.vocabulary),
                producer: producer.clone(),
                read_ratio: workload.read_ratio,
                dry_run: workload.dry_run,
                idle_backoff: workload.idle_backoff,
                deadline,
            };
            tokio::spawn(worker.run())
        })
        .collect();
    drop(producer);

    let readers: Vec<_> = (0..read_workers)
        .map(|id| {
            let worker = ReadWorker {
                id,
                authorizer: Arc::clone(&authorizer),
                faker: SeededFaker::new(seeds.next_u64(), Arc::clone(&workload.vocabulary)),
                consumer: consumer.clone(),
                dry_run: workload.dry_run,
                deadline,
            };
            tokio::spawn(worker.run())
        })
        .collect();

    let finished = futures::future::join_all(writers.into_iter().chain(readers)).await;
    let elapsed = started.elapsed();

    let mut total = WorkerMetrics::default();
    for worker in finished {
        total.merge(&worker?);
    }

    let undrained = consumer.len() as u64;
    tracing::info!(?elapsed, undrained, "load generation complete");

    Ok(Summary::new(&workload, &total, elapsed, undrained))
}

#[cfg(test)]
mod tests;
