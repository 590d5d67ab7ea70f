//! Counting admission gate that caps simultaneous outbound requests.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// A capacity of zero would deadlock every caller, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Await `fut` while holding one permit. The permit is returned when `fut` resolves,
    /// whether it succeeded or failed, or when the returned future is dropped.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::config("admission gate closed"))?;
        trace!(available = self.available(), "admitted request");
        fut.await
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
        assert_eq!(AdmissionGate::default().capacity(), 5);
    }

    #[tokio::test]
    async fn permit_released_on_success_and_failure() {
        let gate = AdmissionGate::new(2);
        let ok: Result<u8> = gate.run(async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u8> = gate.run(async { Err(Error::http("down")) }).await;
        assert!(err.is_err());
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn permit_held_while_running() {
        let gate = AdmissionGate::new(1);
        let inner = gate.clone();
        let seen = gate
            .run(async move { Ok(inner.available()) })
            .await
            .unwrap();
        assert_eq!(seen, 0);
        assert_eq!(gate.available(), 1);
    }
}
