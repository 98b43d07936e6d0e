//! Shared test fixtures: a scripted inference engine and metric helpers
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;

use llm_serving_gateway::config::{AdmissionConfig, IdentityConfig};
use llm_serving_gateway::engine::{GenerationRequest, InferenceEngine, Snapshot, SnapshotStream};
use llm_serving_gateway::error::{AppError, Result};
use llm_serving_gateway::gateway::AdmissionController;
use llm_serving_gateway::metrics::GatewayMetrics;

/// One scripted engine step: a cumulative snapshot or a failure.
#[derive(Debug, Clone)]
pub enum Step {
    Snapshot(&'static str),
    Fail(&'static str),
}

/// Deterministic engine that replays a fixed script for every request.
pub struct ScriptedEngine {
    script: Vec<Step>,
    step_delay: Duration,
    /// When set, each generation only finishes after the test adds a
    /// permit, so tests can hold admission slots open.
    completion_gate: Option<Arc<Semaphore>>,
    /// When set, `generate` fails before producing a stream.
    setup_failure: Option<&'static str>,
    backlog: Mutex<Option<usize>>,
    pub aborted: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            step_delay: Duration::from_millis(2),
            completion_gate: None,
            setup_failure: None,
            backlog: Mutex::new(Some(0)),
            aborted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_completion_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.completion_gate = Some(gate);
        self
    }

    pub fn with_setup_failure(mut self, detail: &'static str) -> Self {
        self.setup_failure = Some(detail);
        self
    }

    /// `None` makes `queued_requests` fail.
    pub fn set_backlog(&self, backlog: Option<usize>) {
        *self.backlog.lock().unwrap() = backlog;
    }

    pub fn aborted_requests(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn generate(&self, _request: GenerationRequest) -> Result<SnapshotStream> {
        if let Some(detail) = self.setup_failure {
            return Err(AppError::ChannelSetup(detail.to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let delay = self.step_delay;
        let gate = self.completion_gate.clone();

        tokio::spawn(async move {
            for step in script {
                tokio::time::sleep(delay).await;
                match step {
                    Step::Snapshot(text) => {
                        if tx
                            .send(Ok(Snapshot {
                                text: text.to_string(),
                            }))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Step::Fail(detail) => {
                        let _ = tx.send(Err(AppError::engine(detail))).await;
                        return;
                    }
                }
            }
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn queued_requests(&self) -> Result<usize> {
        self.backlog
            .lock()
            .unwrap()
            .ok_or_else(|| AppError::engine("engine status unavailable"))
    }

    fn abort(&self, request_id: &str) {
        self.aborted.lock().unwrap().push(request_id.to_string());
    }
}

pub fn test_metrics() -> Arc<GatewayMetrics> {
    Arc::new(
        GatewayMetrics::new(&IdentityConfig {
            namespace: "test".to_string(),
            instance: "gateway-0".to_string(),
        })
        .unwrap(),
    )
}

pub fn admission(capacity: usize, metrics: Arc<GatewayMetrics>) -> Arc<AdmissionController> {
    Arc::new(AdmissionController::new(
        &AdmissionConfig {
            max_inflight: capacity,
            wait_timeout_ms: None,
        },
        metrics,
    ))
}

/// Poll `condition` every 5ms until it holds or the deadline passes.
pub async fn wait_for(condition: impl Fn() -> bool, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
