//! Queue-depth monitor: periodically samples the engine's internal
//! scheduler backlog for observability.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::InferenceEngine;
use crate::metrics::GatewayMetrics;

/// Spawn the background sampling task.
///
/// Started once at process startup and intended to run for the process
/// lifetime: query failures are swallowed and the next interval tried
/// again. The task only ends with process shutdown.
pub fn spawn_queue_depth_monitor(
    engine: Arc<dyn InferenceEngine>,
    metrics: Arc<GatewayMetrics>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match engine.queued_requests().await {
                Ok(waiting) => metrics.engine_waiting.set(waiting as i64),
                Err(e) => debug!(error = %e, "Engine backlog query failed"),
            }
            tokio::time::sleep(interval).await;
        }
    })
}
