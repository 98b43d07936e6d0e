//! Process-wide metrics recorder
//!
//! All series carry `namespace` and `instance` const labels so multiple
//! gateway instances can be aggregated externally without collision. The
//! registry is owned by this struct; nothing registers into a global
//! default registry.

use std::collections::HashMap;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::config::IdentityConfig;
use crate::error::{AppError, Result};

/// TTFT histogram bucket boundaries, in milliseconds.
const TTFT_BUCKETS_MS: &[f64] = &[
    10.0, 25.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0, 12800.0,
];

/// Counters, gauges, and histograms updated by every other component
pub struct GatewayMetrics {
    registry: Registry,

    /// Total requests accepted, either RPC.
    pub requests_total: IntCounter,
    /// Requests that ended in a Failed outcome. Cancellations do not count.
    pub requests_failed: IntCounter,
    /// Requests waiting for admission.
    pub queue_length: IntGauge,
    /// Requests currently holding an admission slot.
    pub in_flight: IntGauge,
    /// Configured capacity, published once at startup.
    pub max_inflight: IntGauge,
    /// Backlog inside the engine's own scheduler, sampled by the monitor.
    pub engine_waiting: IntGauge,
    /// Time to first output in milliseconds.
    pub ttft_ms: Histogram,
}

impl GatewayMetrics {
    /// Create and register all series under the given identity labels
    pub fn new(identity: &IdentityConfig) -> Result<Self> {
        let registry = Registry::new();
        let labels: HashMap<String, String> = HashMap::from([
            ("namespace".to_string(), identity.namespace.clone()),
            ("instance".to_string(), identity.instance.clone()),
        ]);

        let requests_total = IntCounter::with_opts(
            Opts::new("llm_requests_total", "Total LLM requests received.")
                .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let requests_failed = IntCounter::with_opts(
            Opts::new("llm_requests_failed_total", "Total LLM requests failed.")
                .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let queue_length = IntGauge::with_opts(
            Opts::new(
                "llm_request_queue_length",
                "Number of requests waiting for admission (per instance).",
            )
            .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let in_flight = IntGauge::with_opts(
            Opts::new(
                "llm_requests_in_flight",
                "Number of requests currently being processed by this instance.",
            )
            .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let max_inflight = IntGauge::with_opts(
            Opts::new(
                "llm_config_max_inflight",
                "Configured admission capacity for this instance.",
            )
            .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let engine_waiting = IntGauge::with_opts(
            Opts::new(
                "llm_engine_waiting_requests",
                "Requests waiting inside the engine's internal scheduler.",
            )
            .const_labels(labels.clone()),
        )
        .map_err(internal)?;

        let ttft_ms = Histogram::with_opts(
            HistogramOpts::new("llm_ttft_ms", "Time to first token in milliseconds.")
                .buckets(TTFT_BUCKETS_MS.to_vec())
                .const_labels(labels),
        )
        .map_err(internal)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(requests_failed.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(queue_length.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(in_flight.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(max_inflight.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(engine_waiting.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(ttft_ms.clone()))
            .map_err(internal)?;

        Ok(Self {
            registry,
            requests_total,
            requests_failed,
            queue_length,
            in_flight,
            max_inflight,
            engine_waiting,
            ttft_ms,
        })
    }

    /// Render all registered series in Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(internal)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
    }
}

fn internal(err: prometheus::Error) -> AppError {
    AppError::Internal(err.to_string())
}
