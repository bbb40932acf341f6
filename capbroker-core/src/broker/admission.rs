//! Admission control
//!
//! A counting semaphore bounds how many pipeline runs are in flight. Permits
//! are RAII guards, so a run that returns, fails, or panics always gives its
//! slot back. Closing the controller wakes every waiter with an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Admission was refused because the controller is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("admission closed")]
pub struct AdmissionClosed;

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Slot held for the duration of one pipeline run
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<InFlight>,
}

impl AdmissionPermit {
    fn new(permit: OwnedSemaphorePermit, in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self {
            _permit: permit,
            in_flight: in_flight.clone(),
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// Bounded-concurrency gate in front of the execution pipeline
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<InFlight>,
}

impl AdmissionController {
    /// Allow at most `max_concurrent` runs at once (minimum 1)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionClosed> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionClosed)?;
        Ok(AdmissionPermit::new(permit, &self.in_flight))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Refuse every pending and future acquisition
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Close, then wait up to `timeout` for runs holding a slot to finish
    ///
    /// Callers still queued for a slot are refused immediately. Returns `true`
    /// when nothing is left in flight. Safe to call more than once.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.close();

        let idle = async {
            loop {
                // Register before checking so a release in between is not missed
                let notified = self.in_flight.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

#[cfg(test)]
mod admission_tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_returned_on_drop() {
        let admission = AdmissionController::new(2);

        let a = admission.acquire().await.unwrap();
        let b = admission.acquire().await.unwrap();
        assert_eq!(admission.in_flight(), 2);
        assert_eq!(admission.available(), 0);

        drop(a);
        assert_eq!(admission.in_flight(), 1);
        drop(b);
        assert_eq!(admission.in_flight(), 0);
        assert_eq!(admission.available(), 2);
    }

    #[tokio::test]
    async fn test_zero_is_raised_to_one() {
        let admission = AdmissionController::new(0);
        assert_eq!(admission.max_concurrent(), 1);
        let _permit = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);
    }

    #[tokio::test]
    async fn test_close_refuses_waiters() {
        let admission = AdmissionController::new(1);
        let held = admission.acquire().await.unwrap();

        let waiter = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        admission.close();
        assert_eq!(waiter.await.unwrap(), Err(AdmissionClosed));
        drop(held);
        assert!(admission.is_closed());
    }

    #[tokio::test]
    async fn test_drain_idle() {
        let admission = AdmissionController::new(3);
        assert!(admission.drain(Duration::from_millis(10)).await);
        assert!(admission.acquire().await.is_err());
        assert_eq!(admission.in_flight(), 0);
        // Draining again is harmless
        assert!(admission.drain(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_in_flight() {
        let admission = AdmissionController::new(2);
        let permit = admission.acquire().await.unwrap();

        let runner = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(permit);
        });

        assert!(admission.drain(Duration::from_secs(1)).await);
        assert_eq!(admission.in_flight(), 0);
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_refuses_queued_callers() {
        let admission = AdmissionController::new(1);
        let permit = admission.acquire().await.unwrap();

        let queued = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        let runner = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(permit);
        });

        assert!(admission.drain(Duration::from_secs(1)).await);
        assert_eq!(queued.await.unwrap(), Err(AdmissionClosed));
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout() {
        let admission = AdmissionController::new(1);
        let _stuck = admission.acquire().await.unwrap();

        assert!(!admission.drain(Duration::from_millis(100)).await);
        assert!(admission.is_closed());
        assert_eq!(admission.in_flight(), 1);
    }
}
