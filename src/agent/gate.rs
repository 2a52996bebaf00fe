//! Bounded concurrency gate for outbound backend calls.
//!
//! The vector-search and generation backends are shared resources; this
//! gate caps simultaneous calls with a fixed-size semaphore. Waiters
//! queue in FIFO order (tokio semaphores are fair) up to a configurable
//! queue timeout, after which the call fails with
//! [`EngineError::Overloaded`]. The per-call timeout starts only after a
//! permit is held, so queueing never eats into a call's time budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::EngineError;

/// FIFO concurrency gate with queue and call timeouts.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl ConcurrencyGate {
    /// Creates a gate with `permits` simultaneous slots.
    #[must_use]
    pub fn new(permits: usize, queue_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            queue_timeout,
        }
    }

    /// Runs `call` under a permit with a bounded call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Overloaded`] when no permit frees up
    /// within the queue timeout, [`EngineError::Timeout`] when the call
    /// itself exceeds `call_timeout`, and otherwise whatever the call
    /// returns.
    pub async fn run<T, F>(
        &self,
        operation: &'static str,
        call_timeout: Duration,
        call: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let permit = tokio::time::timeout(self.queue_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| EngineError::Overloaded {
                retry_after: self.queue_timeout,
            })?
            .map_err(|_| EngineError::InternalInconsistency {
                message: "concurrency gate semaphore closed".to_string(),
            })?;

        let result = tokio::time::timeout(call_timeout, call)
            .await
            .map_err(|_| EngineError::Timeout {
                operation,
                waited: call_timeout,
            })?;
        drop(permit);
        result
    }

    /// Permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_success() {
        let gate = ConcurrencyGate::new(2, Duration::from_secs(1));
        let result = gate
            .run("op", Duration::from_secs(1), async { Ok(42) })
            .await;
        assert_eq!(result.unwrap_or_default(), 42);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_call_timeout_maps_to_timeout_error() {
        let gate = ConcurrencyGate::new(1, Duration::from_secs(1));
        let result: Result<(), EngineError> = gate
            .run("slow-op", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Timeout {
                operation: "slow-op",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_saturated_gate_overloads() {
        let gate = ConcurrencyGate::new(1, Duration::from_millis(10));
        let inner = gate.clone();

        let hold = tokio::spawn(async move {
            inner
                .run("holder", Duration::from_secs(5), async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                })
                .await
        });

        // Give the holder time to take the only permit.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result: Result<(), EngineError> = gate
            .run("queued", Duration::from_secs(1), async { Ok(()) })
            .await;
        assert!(matches!(result, Err(EngineError::Overloaded { .. })));

        let held = hold.await.unwrap_or_else(|_| unreachable!());
        assert!(held.is_ok());
    }

    #[tokio::test]
    async fn test_permit_released_after_failure() {
        let gate = ConcurrencyGate::new(1, Duration::from_millis(100));
        let result: Result<(), EngineError> = gate
            .run("failing", Duration::from_secs(1), async {
                Err(EngineError::Generation {
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(gate.available(), 1);
    }
}
