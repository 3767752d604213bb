use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{GraphError, Result};

/// Bounds the number of concurrently open database sessions.
///
/// Permits are released when the returned guard drops, so every exit path
/// (success, error, panic unwinding) gives the slot back.
#[derive(Clone, Debug)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

/// A held pool slot.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    /// Pool with `capacity` slots; acquisition waits at most `acquire_timeout`.
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<SessionPermit> {
        let timeout = self.acquire_timeout;
        match tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(SessionPermit { _permit: permit }),
            // The semaphore is never closed; treat it like exhaustion anyway.
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(
                    capacity = self.capacity,
                    waited_ms = timeout.as_millis() as u64,
                    "client.pool.exhausted"
                );
                Err(GraphError::PoolTimeout { waited: timeout })
            }
        }
    }

    /// Configured ceiling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_return_on_drop() {
        let pool = SessionPool::new(2, Duration::from_millis(50));
        let first = pool.acquire().await.expect("slot");
        let second = pool.acquire().await.expect("slot");
        assert_eq!(pool.in_use(), 2);
        drop(first);
        assert_eq!(pool.available(), 1);
        drop(second);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = SessionPool::new(1, Duration::from_millis(20));
        let _held = pool.acquire().await.expect("slot");
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, GraphError::PoolTimeout { .. }));
    }
}
