//! Outcome counters of a run.
//!
//! Every worker owns its counters and hands them back when it exits. The run controller reduces
//! them once all workers have joined, so no counter is ever shared between tasks. The same
//! increments are mirrored into the global [`metrics`] recorder for export.

use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;
use sketches_ddsketch::DDSketch;

/// Counter of relationship writes, labelled with `outcome`.
pub const WRITES_METRIC: &str = "authzed_loadtest_writes_total";
/// Counter of permission checks, labelled with `outcome`.
pub const CHECKS_METRIC: &str = "authzed_loadtest_permission_checks_total";
/// Gauge of read tasks waiting in the queue.
pub const QUEUE_DEPTH_METRIC: &str = "authzed_loadtest_queue_depth";

/// Registers descriptions for all exported metrics.
pub fn describe() {
    metrics::describe_counter!(WRITES_METRIC, "Relationship writes by outcome");
    metrics::describe_counter!(CHECKS_METRIC, "Permission checks by outcome");
    metrics::describe_gauge!(QUEUE_DEPTH_METRIC, "Read tasks waiting for a read worker");
}

/// The six outcome counters of a run.
///
/// Write workers only touch `writes` and `write_failures`. Read workers only touch the others.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunCounters {
    /// Successful relationship writes.
    pub writes: u64,
    /// Writes that failed after the client exhausted its retries.
    pub write_failures: u64,
    /// Read tasks taken from the queue and checked, regardless of the outcome.
    pub reads: u64,
    /// Checks that failed after the client exhausted its retries.
    pub read_failures: u64,
    /// Checks answered with "has permission".
    pub allowed: u64,
    /// Checks answered with "does not have permission".
    pub denied: u64,
}

impl RunCounters {
    pub(crate) fn record_write(&mut self, succeeded: bool) {
        let outcome = if succeeded {
            self.writes += 1;
            "success"
        } else {
            self.write_failures += 1;
            "failure"
        };
        metrics::counter!(WRITES_METRIC, "outcome" => outcome).increment(1);
    }

    /// Records a processed read task. Exactly one of `allowed`, `denied` and `read_failures`
    /// moves, `reads` always does.
    pub(crate) fn record_check(&mut self, result: Option<bool>) {
        self.reads += 1;
        let outcome = match result {
            Some(true) => {
                self.allowed += 1;
                "allowed"
            }
            Some(false) => {
                self.denied += 1;
                "denied"
            }
            None => {
                self.read_failures += 1;
                "failed"
            }
        };
        metrics::counter!(CHECKS_METRIC, "outcome" => outcome).increment(1);
    }
}

impl AddAssign for RunCounters {
    fn add_assign(&mut self, other: Self) {
        self.writes += other.writes;
        self.write_failures += other.write_failures;
        self.reads += other.reads;
        self.read_failures += other.read_failures;
        self.allowed += other.allowed;
        self.denied += other.denied;
    }
}

/// Everything a single worker observed during a run.
#[derive(Default)]
pub struct WorkerMetrics {
    /// Outcome counters.
    pub counters: RunCounters,

    /// Read tasks this worker placed in the queue.
    pub enqueued: u64,
    /// Read tasks this worker could not place in the queue before the deadline.
    pub dropped: u64,

    /// Latency of successful writes, in seconds.
    pub write_timing: DDSketch,
    /// Latency of successful checks, in seconds.
    pub check_timing: DDSketch,
}

impl fmt::Debug for WorkerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerMetrics")
            .field("counters", &self.counters)
            .field("enqueued", &self.enqueued)
            .field("dropped", &self.dropped)
            .field("write_timings", &self.write_timing.count())
            .field("check_timings", &self.check_timing.count())
            .finish_non_exhaustive()
    }
}

impl WorkerMetrics {
    /// Folds the metrics of another worker into this one.
    pub fn merge(&mut self, other: &WorkerMetrics) {
        self.counters += other.counters;
        self.enqueued += other.enqueued;
        self.dropped += other.dropped;

        for (sketch, other) in [
            (&mut self.write_timing, &other.write_timing),
            (&mut self.check_timing, &other.check_timing),
        ] {
            if let Err(err) = sketch.merge(other) {
                tracing::error!(error = ?err, "failed to merge latency sketches");
            }
        }
    }
}
