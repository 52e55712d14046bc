use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::bail;
use async_trait::async_trait;

use super::*;
use crate::report::Mode;

const LATENCY: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug)]
enum Answer {
    Allow,
    Deny,
    Fail,
    /// Allow, deny and fail in turn.
    Rotate,
}

#[derive(Debug)]
struct Stub {
    fail_writes: bool,
    answer: Answer,
    check_latency: Duration,
    writes: AtomicU64,
    checks: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    written: Mutex<Vec<Tuple>>,
}

impl Stub {
    fn new(answer: Answer) -> Self {
        Self {
            fail_writes: false,
            answer,
            check_latency: LATENCY,
            writes: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::new(Answer::Allow)
        }
    }

    fn calls(&self) -> (u64, u64) {
        (
            self.writes.load(Ordering::Relaxed),
            self.checks.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl Authorizer for Stub {
    async fn write(&self, tuple: &Tuple) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(LATENCY).await;
        if self.fail_writes {
            bail!("write rejected");
        }
        self.written.lock().unwrap().push(tuple.clone());
        Ok(())
    }

    async fn check(&self, _tuple: &Tuple, _permission: &str) -> Result<bool> {
        let n = self.checks.fetch_add(1, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.check_latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answer {
            Answer::Allow => Ok(true),
            Answer::Deny => Ok(false),
            Answer::Fail => bail!("check rejected"),
            Answer::Rotate => match n % 3 {
                0 => Ok(true),
                1 => Ok(false),
                _ => bail!("check rejected"),
            },
        }
    }
}

fn workload(read_ratio: usize) -> WorkloadBuilder {
    Workload::builder(Duration::from_secs(1))
        .read_ratio(read_ratio)
        .seed(42)
}

fn assert_accounting(summary: &Summary, read_ratio: usize) {
    let counters = &summary.counters;
    assert_eq!(
        summary.enqueued + summary.dropped,
        counters.writes * read_ratio as u64,
        "every successful write fans out exactly read_ratio tasks"
    );
    assert_eq!(
        summary.enqueued,
        counters.reads + summary.undrained,
        "every queued task is either checked or left in the queue"
    );
    assert_eq!(
        counters.allowed + counters.denied + counters.read_failures,
        counters.reads,
        "every check has exactly one outcome"
    );
}

#[tokio::test(start_paused = true)]
async fn fans_out_read_ratio_checks_per_write() {
    let stub = Arc::new(Stub::new(Answer::Allow));
    let summary = run(stub.clone(), workload(2).build()).await.unwrap();

    let counters = summary.counters;
    assert_eq!(summary.mode, Mode::Live);
    assert_eq!(summary.read_workers, 2);
    assert!(counters.writes > 100, "{counters:?}");
    assert_eq!(counters.write_failures, 0);
    assert_eq!(counters.read_failures, 0);
    assert_eq!(counters.denied, 0);
    assert_eq!(counters.allowed, counters.reads);
    assert_accounting(&summary, 2);

    let (writes, checks) = stub.calls();
    assert_eq!(writes, counters.writes);
    assert_eq!(checks, counters.reads);
}

#[tokio::test(start_paused = true)]
async fn failed_writes_queue_nothing() {
    let stub = Arc::new(Stub::failing_writes());
    let summary = run(stub.clone(), workload(3).build()).await.unwrap();

    let counters = summary.counters;
    assert_eq!(counters.writes, 0);
    assert!(counters.write_failures > 0);
    assert_eq!(counters.reads, 0);
    assert_eq!(summary.enqueued, 0);
    assert_eq!(summary.read_write_ratio, None);
    assert_eq!(stub.calls().1, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_checks_still_count_as_reads() {
    let stub = Arc::new(Stub::new(Answer::Fail));
    let summary = run(stub, workload(1).build()).await.unwrap();

    let counters = summary.counters;
    assert!(counters.reads > 0);
    assert_eq!(counters.read_failures, counters.reads);
    assert_eq!(counters.allowed, 0);
    assert_eq!(counters.denied, 0);
    assert!(summary.check_latency.is_none());
    assert_accounting(&summary, 1);
}

#[tokio::test(start_paused = true)]
async fn check_outcomes_are_split() {
    let stub = Arc::new(Stub::new(Answer::Rotate));
    let summary = run(stub, workload(3).build()).await.unwrap();

    let counters = summary.counters;
    assert!(counters.allowed > 0);
    assert!(counters.denied > 0);
    assert!(counters.read_failures > 0);
    assert_accounting(&summary, 3);
}

#[tokio::test(start_paused = true)]
async fn denied_checks() {
    let stub = Arc::new(Stub::new(Answer::Deny));
    let summary = run(stub, workload(1).build()).await.unwrap();

    assert!(summary.counters.denied > 0);
    assert_eq!(summary.counters.denied, summary.counters.reads);
}

#[tokio::test(start_paused = true)]
async fn zero_read_ratio_only_writes() {
    let stub = Arc::new(Stub::new(Answer::Allow));
    let summary = run(stub.clone(), workload(0).build()).await.unwrap();

    assert_eq!(summary.read_workers, 0);
    assert!(summary.counters.writes > 0);
    assert_eq!(summary.counters.reads, 0);
    assert_eq!(summary.enqueued, 0);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.read_write_ratio, Some(0.0));
    assert_eq!(stub.calls().1, 0);
}

#[tokio::test(start_paused = true)]
async fn dry_run_never_calls_the_service() {
    let stub = Arc::new(Stub::new(Answer::Allow));
    let summary = run(stub.clone(), workload(5).dry_run(true).build())
        .await
        .unwrap();

    assert_eq!(summary.mode, Mode::DryRun);
    assert_eq!(summary.counters, RunCounters::default());
    assert_eq!(summary.enqueued, 0);
    assert_eq!(stub.calls(), (0, 0));
    assert!(summary.elapsed >= Duration::from_secs(1));
    assert!(summary.elapsed < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn max_readers_caps_concurrent_checks() {
    let mut stub = Stub::new(Answer::Allow);
    stub.check_latency = Duration::from_millis(20);
    let stub = Arc::new(stub);

    let summary = run(stub.clone(), workload(10).max_readers(Some(3)).build())
        .await
        .unwrap();

    assert_eq!(summary.read_workers, 3);
    assert_eq!(summary.concurrency(), 4);
    assert!(stub.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_accounting(&summary, 10);
}

#[tokio::test(start_paused = true)]
async fn full_queue_throttles_writers() {
    let mut stub = Stub::new(Answer::Allow);
    stub.check_latency = Duration::from_millis(10);
    let stub = Arc::new(stub);

    let summary = run(
        stub.clone(),
        workload(5).max_readers(Some(1)).queue_capacity(2).build(),
    )
    .await
    .unwrap();

    let counters = summary.counters;
    // One reader at 10ms per check cannot exceed 100 checks in a second.
    assert!(counters.reads <= 101, "{counters:?}");
    assert!(counters.writes <= counters.reads / 5 + 2, "{counters:?}");
    assert!(summary.undrained <= 2);
    assert_accounting(&summary, 5);

    // Workers observe the deadline while blocked on the queue.
    assert!(summary.elapsed < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn multiple_writers() {
    let stub = Arc::new(Stub::new(Answer::Allow));
    let summary = run(stub, workload(2).write_workers(4).build())
        .await
        .unwrap();

    assert_eq!(summary.write_workers, 4);
    assert!(summary.counters.writes > 1000);
    assert_accounting(&summary, 2);
}

#[tokio::test(start_paused = true)]
async fn same_seed_writes_same_relationships() {
    let first = Arc::new(Stub::new(Answer::Rotate));
    let a = run(first.clone(), workload(2).build()).await.unwrap();

    let second = Arc::new(Stub::new(Answer::Rotate));
    let b = run(second.clone(), workload(2).build()).await.unwrap();

    assert_eq!(a.counters, b.counters);

    let first = first.written.lock().unwrap();
    let second = second.written.lock().unwrap();
    assert!(first.len() >= 10);
    assert_eq!(first[..10], second[..10]);

    let vocabulary = Vocabulary::default();
    for tuple in first.iter() {
        assert_eq!(tuple.object_type, vocabulary.object_type);
        assert!(tuple.object_id.starts_with(&vocabulary.object_prefix));
        assert!(vocabulary.relations.contains(&tuple.relation));
    }
}

#[test]
fn read_workers_follow_ratio() {
    let build = |ratio, max| workload(ratio).max_readers(max).build().read_workers();

    assert_eq!(build(0, None), 0);
    assert_eq!(build(1, None), 1);
    assert_eq!(build(100, None), 100);
    assert_eq!(build(100, Some(8)), 8);
    assert_eq!(build(4, Some(8)), 4);
}

#[test]
fn tuple_display() {
    let tuple = Tuple {
        subject_type: "user".into(),
        subject_id: "Alice".into(),
        relation: "viewer".into(),
        object_type: "document".into(),
        object_id: "doc_1".into(),
    };

    assert_eq!(tuple.to_string(), "document:doc_1#viewer@user:Alice");
    assert_eq!(tuple.relationship().relation, "viewer");
}
