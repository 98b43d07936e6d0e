//! HTTP client for an OpenAI-compatible streaming completions engine
//! (vLLM serving endpoint)
//!
//! The wire protocol delivers incremental text per SSE event; this client
//! accumulates the increments so the gateway sees the cumulative-output
//! snapshots the engine contract promises.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::engine::{GenerationRequest, InferenceEngine, Snapshot, SnapshotStream};
use crate::error::{AppError, Result};

/// OpenAI-compatible completion request body
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

/// One SSE chunk of a streamed completion
#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    text: String,
}

/// Engine client over the OpenAI-compatible streaming completions API
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    waiting_metric: String,
}

impl HttpEngine {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.engine.connect_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.engine.base_url.trim_end_matches('/').to_string(),
            model_id: settings.model.id.clone(),
            waiting_metric: settings.engine.waiting_metric.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }

    fn metrics_url(&self) -> String {
        format!("{}/metrics", self.base_url)
    }
}

#[async_trait]
impl InferenceEngine for HttpEngine {
    async fn generate(&self, request: GenerationRequest) -> Result<SnapshotStream> {
        let body = CompletionBody {
            model: &self.model_id,
            prompt: &request.prompt,
            max_tokens: request.max_output_units,
            temperature: request.temperature,
            stream: true,
        };

        debug!(
            request_id = %request.request_id,
            prompt_len = request.prompt.len(),
            "Starting engine generation"
        );

        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AppError::ChannelSetup(e.to_string())
                } else {
                    AppError::engine(format!("engine request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::engine(format!(
                "engine returned {}: {}",
                status, detail
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_sse(response, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn queued_requests(&self) -> Result<usize> {
        let response = self
            .client
            .get(self.metrics_url())
            .send()
            .await
            .map_err(|e| AppError::ChannelSetup(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| AppError::engine(format!("engine metrics unreadable: {}", e)))?;

        parse_backlog_gauge(&body, &self.waiting_metric).ok_or_else(|| {
            AppError::engine(format!(
                "gauge '{}' not found in engine metrics",
                self.waiting_metric
            ))
        })
    }

    // Dropping the response body closes the connection, which the engine
    // treats as an abort; no explicit signal is needed.
}

/// Read the SSE body and forward cumulative snapshots until `[DONE]`,
/// an error, or the receiver going away.
async fn pump_sse(response: reqwest::Response, tx: mpsc::Sender<Result<Snapshot>>) {
    let mut body = response.bytes_stream();
    let mut buffer = String::new();
    let mut cumulative = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Engine stream interrupted");
                let _ = tx
                    .send(Err(AppError::engine(format!("engine stream error: {}", e))))
                    .await;
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(boundary) = buffer.find("\n\n") {
            let event: String = buffer.drain(..boundary + 2).collect();
            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return;
                }
                let parsed: CompletionChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AppError::engine(format!(
                                "malformed engine chunk: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };
                if let Some(choice) = parsed.choices.first() {
                    cumulative.push_str(&choice.text);
                }
                if tx
                    .send(Ok(Snapshot {
                        text: cumulative.clone(),
                    }))
                    .await
                    .is_err()
                {
                    // Receiver dropped: the caller cancelled.
                    return;
                }
            }
        }
    }
}

/// Find a gauge value in a Prometheus text exposition.
///
/// Matches both bare (`name 3`) and labeled (`name{...} 3.0`) sample
/// lines.
fn parse_backlog_gauge(exposition: &str, metric: &str) -> Option<usize> {
    for line in exposition.lines() {
        let line = line.trim();
        if line.starts_with('#') || !line.starts_with(metric) {
            continue;
        }
        let after = &line[metric.len()..];
        if !(after.starts_with('{') || after.starts_with(' ') || after.starts_with('\t')) {
            continue;
        }
        if let Some(value) = line.split_whitespace().last() {
            if let Ok(v) = value.parse::<f64>() {
                if v.is_finite() && v >= 0.0 {
                    return Some(v as usize);
                }
            }
        }
    }
    None
}
