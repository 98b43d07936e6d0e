//! LLM Serving Gateway
//!
//! An admission-controlled gRPC gateway fronting a GPU-bound text
//! generation engine: bounds concurrent generations, queues excess
//! demand, streams partial output token-by-token, and records
//! time-to-first-output latency for capacity planning.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod metrics;

pub use error::{AppError, Result};

/// Generated gRPC types for the `llm` package
pub mod proto {
    tonic::include_proto!("llm");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("llm_descriptor");
}

use std::sync::Arc;

use config::Settings;
use engine::InferenceEngine;
use gateway::AdmissionController;
use metrics::GatewayMetrics;

/// Everything a call handler needs, constructed once at startup and
/// passed by reference. The admission capacity and the metrics registry
/// are the only process-wide mutable state, and both live here.
pub struct ServiceContext {
    pub settings: Settings,
    pub engine: Arc<dyn InferenceEngine>,
    pub admission: AdmissionController,
    pub metrics: Arc<GatewayMetrics>,
}

impl ServiceContext {
    pub fn new(settings: Settings, engine: Arc<dyn InferenceEngine>) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new(&settings.identity)?);
        metrics
            .max_inflight
            .set(settings.admission.max_inflight as i64);
        let admission = AdmissionController::new(&settings.admission, metrics.clone());

        Ok(Self {
            settings,
            engine,
            admission,
            metrics,
        })
    }
}
