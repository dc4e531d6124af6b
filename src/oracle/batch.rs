//! Bounded-concurrency batching for oracle calls.
//!
//! Work is split into consecutive batches; within a batch every item starts
//! concurrently, each after a small stagger so request starts spread out
//! instead of bursting past provider rate limits. A batch settles completely
//! before the next one starts. One failed item (after its own retries) aborts
//! the whole run.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

use crate::error::OracleError;

/// Batcher configuration. Tuning lives here, not at call sites.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    /// Max concurrent oracle calls per batch.
    pub batch_size: usize,
    /// Delay between request starts within a batch (`index * stagger`).
    pub stagger: Duration,
}

impl Default for Batcher {
    fn default() -> Self {
        Self {
            batch_size: 20,
            stagger: Duration::from_millis(30),
        }
    }
}

impl Batcher {
    /// Run `op` over every item, `batch_size` at a time.
    ///
    /// Results come back in item order. The first failure aborts the run and
    /// surfaces the original error; later batches never start.
    pub async fn run<T, U, F, Fut>(&self, items: Vec<T>, op: F) -> Result<Vec<U>, OracleError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<U, OracleError>>,
    {
        let total = items.len();
        let size = self.batch_size.max(1);
        let mut results = Vec::with_capacity(total);
        let mut batches = 0usize;

        let mut remaining = items;
        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(size));
            let batch = std::mem::replace(&mut remaining, rest);
            batches += 1;

            let tasks = batch.into_iter().enumerate().map(|(index, item)| {
                let delay = self.stagger * index as u32;
                let fut = op(item);
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    fut.await
                }
            });

            // The whole batch settles before we look at outcomes, so a
            // failure never leaves stragglers running into the next batch.
            for outcome in join_all(tasks).await {
                results.push(outcome?);
            }
        }

        debug!(total, batches, "Batched oracle calls complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let batcher = Batcher::default();
        let results = batcher
            .run(Vec::<u32>::new(), |n| async move { Ok(n) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn results_preserve_item_order() {
        let batcher = Batcher {
            batch_size: 3,
            stagger: Duration::from_millis(30),
        };
        let items: Vec<u32> = (0..10).collect();
        let results = batcher.run(items, |n| async move { Ok(n * 2) }).await.unwrap();
        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_count_is_ceil_n_over_size() {
        // 45 items, batch size 20 → 3 batches. Track the max concurrently
        // in-flight tasks to prove batches never overlap.
        let batcher = Batcher {
            batch_size: 20,
            stagger: Duration::ZERO,
        };
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..45).collect();
        let in_flight2 = Arc::clone(&in_flight);
        let peak2 = Arc::clone(&peak);
        batcher
            .run(items, move |n| {
                let in_flight = Arc::clone(&in_flight2);
                let peak = Arc::clone(&peak2);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 20);
    }

    #[tokio::test(start_paused = true)]
    async fn stagger_spreads_request_starts() {
        let batcher = Batcher {
            batch_size: 4,
            stagger: Duration::from_millis(30),
        };
        let start = Instant::now();
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));

        let starts2 = Arc::clone(&starts);
        batcher
            .run(vec![0usize, 1, 2, 3], move |n| {
                let starts = Arc::clone(&starts2);
                async move {
                    starts.lock().unwrap().push((n, start.elapsed()));
                    Ok(n)
                }
            })
            .await
            .unwrap();

        let starts = starts.lock().unwrap();
        for (index, elapsed) in starts.iter() {
            assert_eq!(*elapsed, Duration::from_millis(30) * *index as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn next_batch_waits_for_previous_settle() {
        let batcher = Batcher {
            batch_size: 2,
            stagger: Duration::ZERO,
        };
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Item 0 is slow; item 2 (next batch) must still start after it ends.
        let order2 = Arc::clone(&order);
        batcher
            .run(vec![0u32, 1, 2, 3], move |n| {
                let order = Arc::clone(&order2);
                async move {
                    order.lock().unwrap().push(format!("start-{n}"));
                    let delay = if n == 0 { 100 } else { 10 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    order.lock().unwrap().push(format!("end-{n}"));
                    Ok(n)
                }
            })
            .await
            .unwrap();

        let order = order.lock().unwrap();
        let end0 = order.iter().position(|s| s == "end-0").unwrap();
        let start2 = order.iter().position(|s| s == "start-2").unwrap();
        assert!(start2 > end0, "batch 2 started before batch 1 settled");
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_aborts_the_run() {
        let batcher = Batcher {
            batch_size: 2,
            stagger: Duration::ZERO,
        };
        let calls = Arc::new(AtomicUsize::new(0));

        let calls2 = Arc::clone(&calls);
        let result = batcher
            .run(vec![0u32, 1, 2, 3], move |n| {
                let calls = Arc::clone(&calls2);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        Err(OracleError::RequestFailed {
                            reason: "schema mismatch".into(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert!(result.is_err());
        // First batch (items 0 and 1) ran; second batch never started.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
