//! Concurrency-limiting permit pool, used by the dispatcher's `batch_get` to
//! cap how many in-flight calls run under one concurrency ceiling.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps concurrent work at `max_concurrent`. Acquiring a permit blocks until
/// one is free rather than rejecting, since `batch_get` schedules a bounded
/// batch rather than admission-controlling an open stream of callers.
#[derive(Clone)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Bulkhead {
    pub fn new(max_concurrent: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))), max_concurrent }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a permit. The permit is released when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("bulkhead semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn caps_concurrency_at_configured_limit() {
        let bulkhead = Bulkhead::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let bulkhead = bulkhead.clone();
            let concurrent = concurrent.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = bulkhead.acquire().await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_is_clamped_to_one_permit() {
        let bulkhead = Bulkhead::new(0);
        assert_eq!(bulkhead.max_concurrent(), 0);
        let _permit = bulkhead.acquire().await;
    }
}
