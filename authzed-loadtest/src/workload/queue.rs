//! The bounded queue between write and read workers.
//!
//! Both ends wait at most until the run deadline. A producer stuck on a full queue or a consumer
//! waiting on an empty one observes the deadline without polling.

use tokio::time::{Instant, timeout_at};

use super::Tuple;

/// Creates a bounded multi-producer multi-consumer queue of read tasks.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded(capacity: usize) -> (Producer, Consumer) {
    let (sender, receiver) = async_channel::bounded(capacity);
    (Producer(sender), Consumer(receiver))
}

/// Outcome of [`Producer::send_until`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Enqueue {
    /// The task was queued.
    Queued,
    /// The queue stayed full until the deadline.
    Expired,
    /// All consumers are gone.
    Closed,
}

/// The sending half of the queue. Cloned once per write worker.
#[derive(Clone, Debug)]
pub struct Producer(async_channel::Sender<Tuple>);

impl Producer {
    /// Queues `task`, waiting for free capacity no longer than `deadline`.
    pub async fn send_until(&self, task: Tuple, deadline: Instant) -> Enqueue {
        match timeout_at(deadline, self.0.send(task)).await {
            Ok(Ok(())) => Enqueue::Queued,
            Ok(Err(_)) => Enqueue::Closed,
            Err(_) => Enqueue::Expired,
        }
    }
}

/// The receiving half of the queue. Cloned once per read worker.
#[derive(Clone, Debug)]
pub struct Consumer(async_channel::Receiver<Tuple>);

impl Consumer {
    /// Takes the next task, waiting no longer than `deadline`.
    ///
    /// Returns `None` once the deadline has passed or all producers are gone and the queue is
    /// drained.
    pub async fn recv_until(&self, deadline: Instant) -> Option<Tuple> {
        match timeout_at(deadline, self.0.recv()).await {
            Ok(Ok(task)) => Some(task),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Number of tasks currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
