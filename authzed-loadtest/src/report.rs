//! The final summary of a run and its console rendering.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::workload::{RunCounters, WorkerMetrics, Workload};

/// Whether a run contacted the authorization service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Writes and checks were sent to the service.
    Live,
    /// Only timing and control flow were exercised.
    DryRun,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("LIVE"),
            Mode::DryRun => f.write_str("DRY RUN"),
        }
    }
}

/// Latency distribution of one kind of operation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Latency {
    /// Number of samples.
    pub count: usize,
    /// Mean latency.
    #[serde(with = "humantime_serde")]
    pub avg: Duration,
    /// Median latency.
    #[serde(with = "humantime_serde")]
    pub p50: Duration,
    /// 90th percentile latency.
    #[serde(with = "humantime_serde")]
    pub p90: Duration,
    /// 99th percentile latency.
    #[serde(with = "humantime_serde")]
    pub p99: Duration,
}

impl Latency {
    /// Summarizes a sketch of latencies in seconds. Returns `None` for an empty sketch.
    pub fn from_sketch(sketch: &DDSketch) -> Option<Self> {
        let count = sketch.count();
        if count == 0 {
            return None;
        }

        let quantile = |q| {
            let secs = sketch.quantile(q).ok().flatten()?;
            Some(Duration::from_secs_f64(secs.max(0.0)))
        };

        Some(Self {
            count,
            avg: Duration::from_secs_f64((sketch.sum()? / count as f64).max(0.0)),
            p50: quantile(0.5)?,
            p90: quantile(0.9)?,
            p99: quantile(0.99)?,
        })
    }
}

/// Final report of a run, computed purely from the merged worker metrics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// Whether the service was contacted.
    pub mode: Mode,
    /// Configured duration of the run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Actual wall-clock time until all workers exited.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Number of write workers.
    pub write_workers: usize,
    /// Number of read workers.
    pub read_workers: usize,
    /// Configured checks per successful write.
    pub read_ratio: usize,
    /// The outcome counters.
    pub counters: RunCounters,
    /// Read tasks placed in the queue.
    pub enqueued: u64,
    /// Read tasks that could not be queued before the deadline.
    pub dropped: u64,
    /// Read tasks still waiting in the queue when the run ended.
    pub undrained: u64,
    /// Permission checks per second of configured duration.
    pub checks_per_second: f64,
    /// Achieved checks per successful write, `None` without any successful write.
    pub read_write_ratio: Option<f64>,
    /// Latency of successful writes.
    pub write_latency: Option<Latency>,
    /// Latency of successful checks.
    pub check_latency: Option<Latency>,
}

impl Summary {
    /// Computes the summary of a finished run.
    pub fn new(
        workload: &Workload,
        metrics: &WorkerMetrics,
        elapsed: Duration,
        undrained: u64,
    ) -> Self {
        let counters = metrics.counters;
        let duration = workload.duration();

        let checks_per_second = if duration.is_zero() {
            0.0
        } else {
            counters.reads as f64 / duration.as_secs_f64()
        };
        let read_write_ratio =
            (counters.writes > 0).then(|| counters.reads as f64 / counters.writes as f64);

        Self {
            mode: if workload.is_dry_run() {
                Mode::DryRun
            } else {
                Mode::Live
            },
            duration,
            elapsed,
            write_workers: workload.write_workers(),
            read_workers: workload.read_workers(),
            read_ratio: workload.read_ratio,
            counters,
            enqueued: metrics.enqueued,
            dropped: metrics.dropped,
            undrained,
            checks_per_second,
            read_write_ratio,
            write_latency: Latency::from_sketch(&metrics.write_timing),
            check_latency: Latency::from_sketch(&metrics.check_timing),
        }
    }

    /// Total number of concurrent workers.
    pub fn concurrency(&self) -> usize {
        self.write_workers + self.read_workers
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        let counters = &self.counters;

        println!();
        println!(
            "{} (mode: {}, concurrency: {}, {} writers, {} readers)",
            "## AuthZed load generation complete".bold(),
            self.mode.bold().blue(),
            self.concurrency().bold(),
            self.write_workers,
            self.read_workers,
        );
        println!(
            "  duration: {:.2?}; elapsed: {:.2?}",
            self.duration.bold(),
            self.elapsed
        );

        print!("{} ({} ops", "WRITE:".bold().green(), counters.writes.bold());
        if counters.write_failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", counters.write_failures).bold().red()
            );
        }
        println!(")");
        if let Some(latency) = &self.write_latency {
            print_latency(latency);
        }

        print!("{} ({} ops", "CHECK:".bold().green(), counters.reads.bold());
        if counters.read_failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", counters.read_failures).bold().red()
            );
        }
        println!(")");
        println!(
            "  {:.1} checks/s; allowed: {}; denied: {}",
            self.checks_per_second.bold(),
            counters.allowed.green(),
            counters.denied.yellow(),
        );
        if let Some(latency) = &self.check_latency {
            print_latency(latency);
        }

        match self.read_write_ratio {
            Some(ratio) => println!(
                "{} {:.1}:1 (configured {}:1)",
                "RATIO:".bold(),
                ratio.bold(),
                self.read_ratio
            ),
            None => println!("{} n/a (no successful writes)", "RATIO:".bold()),
        }
        println!(
            "{} {} enqueued; {} dropped at deadline; {} undrained",
            "QUEUE:".bold(),
            self.enqueued,
            self.dropped,
            self.undrained
        );

        if self.mode == Mode::DryRun {
            println!(
                "{}",
                "Dry-run mode: no relationships were written to AuthZed.".yellow()
            );
        }
    }
}

fn print_latency(latency: &Latency) {
    println!(
        "  avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
        latency.avg.bold(),
        latency.p50,
        latency.p90,
        latency.p99
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(dry_run: bool) -> Workload {
        Workload::builder(Duration::from_secs(10))
            .read_ratio(4)
            .max_readers(Some(2))
            .dry_run(dry_run)
            .build()
    }

    #[test]
    fn derives_rates_from_counters() {
        let mut metrics = WorkerMetrics::default();
        metrics.counters = RunCounters {
            writes: 50,
            reads: 150,
            allowed: 100,
            denied: 40,
            read_failures: 10,
            ..Default::default()
        };
        metrics.enqueued = 200;

        let summary = Summary::new(&workload(false), &metrics, Duration::from_secs(11), 50);

        assert_eq!(summary.mode, Mode::Live);
        assert_eq!(summary.checks_per_second, 15.0);
        assert_eq!(summary.read_write_ratio, Some(3.0));
        assert_eq!(summary.write_workers, 1);
        assert_eq!(summary.read_workers, 2);
        assert_eq!(summary.concurrency(), 3);
        assert_eq!(summary.undrained, 50);
        assert!(summary.write_latency.is_none());
    }

    #[test]
    fn ratio_is_undefined_without_writes() {
        let summary = Summary::new(
            &workload(true),
            &WorkerMetrics::default(),
            Duration::from_secs(10),
            0,
        );

        assert_eq!(summary.mode, Mode::DryRun);
        assert_eq!(summary.read_write_ratio, None);
        assert_eq!(summary.checks_per_second, 0.0);
    }

    #[test]
    fn latency_from_sketch() {
        let mut sketch = DDSketch::default();
        for millis in 1..=100 {
            sketch.add(millis as f64 / 1000.0);
        }

        let latency = Latency::from_sketch(&sketch).unwrap();
        assert_eq!(latency.count, 100);
        assert!(latency.p50 < latency.p99);
        assert!(latency.avg > Duration::from_millis(45));
        assert!(latency.avg < Duration::from_millis(55));
    }

    #[test]
    fn serializes_to_json() {
        let summary = Summary::new(
            &workload(false),
            &WorkerMetrics::default(),
            Duration::from_secs(10),
            0,
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "live");
        assert_eq!(json["duration"], "10s");
        assert_eq!(json["counters"]["writes"], 0);
    }
}
