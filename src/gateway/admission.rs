//! Admission control: bounds concurrent generations to a fixed capacity
//! and queues excess demand.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use uuid::Uuid;

use crate::config::AdmissionConfig;
use crate::error::{AppError, Result};
use crate::metrics::GatewayMetrics;

/// Bounds concurrent active generations to a process-lifetime capacity.
///
/// Waiters are granted slots in tokio `Semaphore` queue order, which is
/// FIFO for uncancelled waiters; a waiter that abandons the queue may let
/// a later arrival be granted first.
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    capacity: usize,
    wait_timeout: Option<Duration>,
    metrics: Arc<GatewayMetrics>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_inflight)),
            capacity: config.max_inflight,
            wait_timeout: config.wait_timeout_ms.map(Duration::from_millis),
            metrics,
        }
    }

    /// Suspend until a capacity slot is free, then return a scoped guard.
    ///
    /// While suspended the request is counted in the queue-length gauge;
    /// abandoning the wait (dropping this future) or timing out removes
    /// it again. With no timeout configured the wait is unbounded.
    pub async fn acquire(&self) -> Result<AdmissionSlot> {
        let ticket = AdmissionTicket::new(self.metrics.clone());

        let permit = match self.wait_timeout {
            None => self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AppError::Internal("admission semaphore closed".to_string()))?,
            Some(limit) => {
                match tokio::time::timeout(limit, self.permits.clone().acquire_owned()).await {
                    Ok(acquired) => acquired.map_err(|_| {
                        AppError::Internal("admission semaphore closed".to_string())
                    })?,
                    Err(_) => return Err(AppError::AdmissionTimeout(limit)),
                }
            }
        };

        debug!(
            ticket_id = %ticket.id,
            wait_ms = ticket.enqueued_at.elapsed().as_millis() as u64,
            "Admission granted"
        );
        drop(ticket);

        self.metrics.in_flight.inc();
        Ok(AdmissionSlot {
            permit: Some(permit),
            metrics: self.metrics.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// One waiting request. Exists from the moment admission is requested
/// until the slot is granted or the caller abandons the wait.
struct AdmissionTicket {
    id: Uuid,
    enqueued_at: Instant,
    metrics: Arc<GatewayMetrics>,
}

impl AdmissionTicket {
    fn new(metrics: Arc<GatewayMetrics>) -> Self {
        metrics.queue_length.inc();
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Instant::now(),
            metrics,
        }
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.metrics.queue_length.dec();
    }
}

/// Scoped capacity slot.
///
/// Releasing is idempotent: `release` frees the slot at most once, and
/// dropping the guard releases whatever `release` has not.
pub struct AdmissionSlot {
    permit: Option<OwnedSemaphorePermit>,
    metrics: Arc<GatewayMetrics>,
}

impl AdmissionSlot {
    /// Free the slot. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            self.metrics.in_flight.dec();
        }
    }

    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;

    fn controller(capacity: usize, wait_timeout_ms: Option<u64>) -> AdmissionController {
        let metrics = Arc::new(
            GatewayMetrics::new(&IdentityConfig {
                namespace: "test".to_string(),
                instance: "a".to_string(),
            })
            .unwrap(),
        );
        AdmissionController::new(
            &AdmissionConfig {
                max_inflight: capacity,
                wait_timeout_ms,
            },
            metrics,
        )
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let ctrl = controller(1, None);
        let mut slot = ctrl.acquire().await.unwrap();

        slot.release();
        assert!(slot.is_released());
        assert_eq!(ctrl.available_slots(), 1);
        assert_eq!(ctrl.metrics.in_flight.get(), 0);

        // Second release must not double-free capacity.
        slot.release();
        drop(slot);
        assert_eq!(ctrl.available_slots(), 1);
        assert_eq!(ctrl.metrics.in_flight.get(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_once() {
        let ctrl = controller(2, None);
        {
            let _a = ctrl.acquire().await.unwrap();
            let _b = ctrl.acquire().await.unwrap();
            assert_eq!(ctrl.available_slots(), 0);
            assert_eq!(ctrl.metrics.in_flight.get(), 2);
        }
        assert_eq!(ctrl.available_slots(), 2);
        assert_eq!(ctrl.metrics.in_flight.get(), 0);
    }

    #[tokio::test]
    async fn test_wait_timeout_restores_queue_gauge() {
        let ctrl = controller(1, Some(20));
        let _held = ctrl.acquire().await.unwrap();

        let err = ctrl.acquire().await.err().unwrap();
        assert!(matches!(err, AppError::AdmissionTimeout(_)));
        assert_eq!(ctrl.metrics.queue_length.get(), 0);
        assert_eq!(ctrl.metrics.in_flight.get(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_wait_restores_queue_gauge() {
        let ctrl = Arc::new(controller(1, None));
        let _held = ctrl.acquire().await.unwrap();

        let waiter = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move {
                let _ = ctrl.acquire().await;
            })
        };
        // Let the waiter enqueue, then abandon it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ctrl.metrics.queue_length.get(), 1);
        waiter.abort();
        let _ = waiter.await;

        assert_eq!(ctrl.metrics.queue_length.get(), 0);
    }
}
