//! Per-request generation session
//!
//! A session owns the full lifecycle of one call into the engine:
//! admission, driving the snapshot stream, time-to-first-output, and
//! guaranteed slot release on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::engine::{GenerationRequest, InferenceEngine};
use crate::error::{AppError, Result};
use crate::gateway::admission::{AdmissionController, AdmissionSlot};
use crate::gateway::stream::DeltaTracker;
use crate::metrics::GatewayMetrics;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Queued,
    Admitted,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// One wire-level message of a streaming response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub text: String,
    pub is_last: bool,
}

/// State machine driving one call into the engine.
///
/// Owned exclusively by its call handler; never shared across requests.
pub struct GenerationSession {
    request_id: String,
    started_at: Instant,
    first_output_at: Option<Instant>,
    state: SessionState,
    metrics: Arc<GatewayMetrics>,
}

impl GenerationSession {
    pub fn new(request_id: String, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            first_output_at: None,
            state: SessionState::Queued,
            metrics,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Time to first output, once one has been observed.
    pub fn ttft(&self) -> Option<Duration> {
        self.first_output_at
            .map(|at| at.duration_since(self.started_at))
    }

    /// Unary mode: wait for engine exhaustion and return the final text.
    pub async fn run_unary(
        &mut self,
        engine: &dyn InferenceEngine,
        admission: &AdmissionController,
        request: GenerationRequest,
    ) -> Result<String> {
        let mut slot = admission.acquire().await?;
        self.state = SessionState::Admitted;

        let mut snapshots = match engine.generate(request).await {
            Ok(snapshots) => snapshots,
            Err(e) => return Err(self.fail(e, &mut slot)),
        };
        self.state = SessionState::Streaming;

        // If the caller disconnects, this future is dropped: the guard
        // signals the engine and the slot guard frees capacity.
        let abort_guard = AbortGuard::new(engine, self.request_id.clone());

        let mut text = String::new();
        while let Some(item) = snapshots.next().await {
            match item {
                Ok(snapshot) => {
                    if !snapshot.text.is_empty() {
                        self.record_first_output();
                    }
                    text = snapshot.text;
                }
                Err(e) => {
                    abort_guard.disarm();
                    return Err(self.fail(e, &mut slot));
                }
            }
        }
        abort_guard.disarm();

        slot.release();
        self.state = SessionState::Completed;
        debug!(request_id = %self.request_id, output_len = text.len(), "Generation completed");
        Ok(text)
    }

    /// Streaming mode: forward deltas through `tx` as they arrive, then
    /// emit one end-of-stream marker with no payload.
    ///
    /// A dropped receiver means the caller disconnected: the engine is
    /// told to stop, the slot is released, and no error is surfaced.
    pub async fn run_streaming(
        &mut self,
        engine: &dyn InferenceEngine,
        admission: &AdmissionController,
        request: GenerationRequest,
        tx: &mpsc::Sender<Result<OutputChunk>>,
    ) -> Result<()> {
        let mut slot = admission.acquire().await?;
        self.state = SessionState::Admitted;

        let mut snapshots = match engine.generate(request).await {
            Ok(snapshots) => snapshots,
            Err(e) => return Err(self.fail(e, &mut slot)),
        };
        self.state = SessionState::Streaming;

        let mut tracker = DeltaTracker::new();
        loop {
            tokio::select! {
                _ = tx.closed() => {
                    return Ok(self.cancel(engine, &mut slot));
                }
                item = snapshots.next() => match item {
                    None => break,
                    Some(Ok(snapshot)) => {
                        if let Some(delta) = tracker.advance(&snapshot.text) {
                            self.record_first_output();
                            let chunk = OutputChunk { text: delta, is_last: false };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return Ok(self.cancel(engine, &mut slot));
                            }
                        }
                    }
                    Some(Err(e)) => return Err(self.fail(e, &mut slot)),
                }
            }
        }

        slot.release();
        self.state = SessionState::Completed;
        debug!(
            request_id = %self.request_id,
            output_len = tracker.emitted_len(),
            "Stream completed"
        );

        let _ = tx
            .send(Ok(OutputChunk {
                text: String::new(),
                is_last: true,
            }))
            .await;
        Ok(())
    }

    /// Record time-to-first-output exactly once, never retroactively
    /// corrected.
    fn record_first_output(&mut self) {
        if self.first_output_at.is_none() {
            let now = Instant::now();
            self.first_output_at = Some(now);
            let elapsed_ms = now.duration_since(self.started_at).as_secs_f64() * 1000.0;
            self.metrics.ttft_ms.observe(elapsed_ms);
        }
    }

    fn cancel(&mut self, engine: &dyn InferenceEngine, slot: &mut AdmissionSlot) {
        engine.abort(&self.request_id);
        slot.release();
        self.state = SessionState::Cancelled;
        debug!(request_id = %self.request_id, "Client cancelled generation");
    }

    fn fail(&mut self, err: AppError, slot: &mut AdmissionSlot) -> AppError {
        slot.release();
        self.state = SessionState::Failed;
        match &err {
            AppError::Engine {
                correlation_id,
                detail,
            } => {
                self.metrics.requests_failed.inc();
                error!(
                    request_id = %self.request_id,
                    correlation_id = %correlation_id,
                    detail = %detail,
                    "Engine failure"
                );
            }
            other => {
                error!(
                    request_id = %self.request_id,
                    error = %other,
                    "Generation aborted before the engine produced output"
                );
            }
        }
        err
    }
}

/// Signals the engine to stop a generation when the session future is
/// dropped mid-stream (unary caller disconnect).
struct AbortGuard<'a> {
    engine: &'a dyn InferenceEngine,
    request_id: String,
    armed: std::cell::Cell<bool>,
}

impl<'a> AbortGuard<'a> {
    fn new(engine: &'a dyn InferenceEngine, request_id: String) -> Self {
        Self {
            engine,
            request_id,
            armed: std::cell::Cell::new(true),
        }
    }

    fn disarm(&self) {
        self.armed.set(false);
    }
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if self.armed.get() {
            self.engine.abort(&self.request_id);
        }
    }
}
