//! Per-account order queue: priority preemption, batch chunking, and the
//! rate-limit consumer loop. A single consumer drains the queue and sleeps
//! between submissions; when the queue empties the consumer exits, and a
//! fresh arrival restarts it (the worker owns spawning that task).

use crate::resolver::RequestId;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueuedBatch<T> {
    pub request_id: RequestId,
    pub priority: bool,
    pub items: Vec<T>,
}

/// FIFO for ordinary batches; priority batches jump to the front and are
/// LIFO among themselves (each new priority push lands ahead of the last).
#[derive(Debug)]
pub struct OrderQueue<T> {
    items: VecDeque<QueuedBatch<T>>,
}

impl<T> Default for OrderQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> OrderQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: QueuedBatch<T>) {
        if batch.priority {
            self.items.push_front(batch);
        } else {
            self.items.push_back(batch);
        }
    }

    pub fn pop(&mut self) -> Option<QueuedBatch<T>> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Splits `items` into chunks of at most `max_per_batch`, each assigned a
/// fresh request id via `next_id` and inheriting `priority`. Empty input
/// yields no batches.
pub fn chunk_into_batches<T: Clone>(
    items: Vec<T>,
    max_per_batch: usize,
    priority: bool,
    mut next_id: impl FnMut() -> RequestId,
) -> Vec<QueuedBatch<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let max_per_batch = max_per_batch.max(1);
    items
        .chunks(max_per_batch)
        .map(|chunk| QueuedBatch {
            request_id: next_id(),
            priority,
            items: chunk.to_vec(),
        })
        .collect()
}

/// `1000 / rateLimit * consume` ms, per the order-pipeline rate contract.
pub fn submission_interval(rate_limit: u32, consume: u32) -> Duration {
    let rate_limit = rate_limit.max(1) as u64;
    Duration::from_millis(1000 * consume.max(1) as u64 / rate_limit)
}

/// Drains `queue`, calling `submit` for each batch and sleeping
/// `interval` between submissions (not after the last one). Returns once
/// the queue is empty; the worker re-invokes this when a new batch
/// arrives on a previously empty queue.
pub async fn drain<T, F, Fut>(queue: &mut OrderQueue<T>, interval: Duration, mut submit: F)
where
    F: FnMut(QueuedBatch<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(batch) = queue.pop() {
        submit(batch).await;
        if !queue.is_empty() {
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn id_gen() -> impl FnMut() -> RequestId {
        let counter = AtomicU32::new(0);
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            format!("req-{n}")
        }
    }

    #[test]
    fn priority_batches_jump_ahead_and_are_lifo_among_themselves() {
        let mut queue: OrderQueue<u32> = OrderQueue::new();
        queue.push(QueuedBatch { request_id: "a".into(), priority: false, items: vec![1] });
        queue.push(QueuedBatch { request_id: "b".into(), priority: true, items: vec![2] });
        queue.push(QueuedBatch { request_id: "c".into(), priority: true, items: vec![3] });

        assert_eq!(queue.pop().unwrap().request_id, "c");
        assert_eq!(queue.pop().unwrap().request_id, "b");
        assert_eq!(queue.pop().unwrap().request_id, "a");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn chunk_into_batches_splits_by_max_size_and_preserves_order() {
        let items = vec![1, 2, 3, 4, 5];
        let batches = chunk_into_batches(items, 2, false, id_gen());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].items, vec![1, 2]);
        assert_eq!(batches[1].items, vec![3, 4]);
        assert_eq!(batches[2].items, vec![5]);
        assert!(batches.iter().all(|b| !b.priority));
    }

    #[test]
    fn chunk_into_batches_on_empty_input_yields_nothing() {
        let batches: Vec<QueuedBatch<u32>> = chunk_into_batches(Vec::new(), 10, false, id_gen());
        assert!(batches.is_empty());
    }

    #[test]
    fn submission_interval_matches_rate_and_consume() {
        assert_eq!(submission_interval(5, 1), Duration::from_millis(200));
        assert_eq!(submission_interval(10, 2), Duration::from_millis(200));
        assert_eq!(submission_interval(1, 1), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_submits_every_batch_and_sleeps_between_but_not_after() {
        let mut queue: OrderQueue<u32> = OrderQueue::new();
        queue.push(QueuedBatch { request_id: "a".into(), priority: false, items: vec![1] });
        queue.push(QueuedBatch { request_id: "b".into(), priority: false, items: vec![2] });

        let submitted = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let submitted_clone = submitted.clone();
        let start = tokio::time::Instant::now();

        drain(&mut queue, Duration::from_millis(200), move |batch| {
            let submitted = submitted_clone.clone();
            async move {
                submitted.lock().await.push((batch.request_id, tokio::time::Instant::now()));
            }
        })
        .await;

        let log = submitted.lock().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "a");
        assert_eq!(log[1].0, "b");
        assert!(log[1].1 - start >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn drain_on_empty_queue_returns_immediately() {
        let mut queue: OrderQueue<u32> = OrderQueue::new();
        drain(&mut queue, Duration::from_millis(200), |_batch| async {}).await;
    }
}
