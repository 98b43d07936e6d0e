//! Application settings, read once from the environment at startup

use crate::error::Result;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Root configuration structure
///
/// Every field can be overridden through the environment with the
/// `LLM_GATEWAY` prefix and `__` separator, e.g.
/// `LLM_GATEWAY__ADMISSION__MAX_INFLIGHT=128`. There is no hot reload;
/// settings are loaded exactly once at process startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub engine: EngineConfig,
    pub admission: AdmissionConfig,
    pub identity: IdentityConfig,
    pub monitor: MonitorConfig,
}

/// Listen ports for the gRPC service and the metrics endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_grpc_port() -> u16 {
    50051
}

fn default_metrics_port() -> u16 {
    8000
}

/// Model deployment parameters, logged at startup and forwarded to the
/// engine where its API accepts them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub id: String,
    #[serde(default = "default_dtype")]
    pub dtype: String,
    #[serde(default = "default_tp")]
    pub tensor_parallel_size: u32,
}

fn default_model_id() -> String {
    "stabilityai/stablelm-3b-4e1t".to_string()
}

fn default_dtype() -> String {
    "float16".to_string()
}

fn default_tp() -> u32 {
    1
}

/// Inference engine endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub base_url: String,
    #[serde(default = "default_engine_timeout")]
    pub connect_timeout_ms: u64,
    /// Gauge name scraped from the engine's own metrics exposition to
    /// read its internal scheduler backlog.
    #[serde(default = "default_waiting_metric")]
    pub waiting_metric: String,
}

fn default_engine_url() -> String {
    "http://127.0.0.1:8100".to_string()
}

fn default_engine_timeout() -> u64 {
    5000
}

fn default_waiting_metric() -> String {
    "vllm:num_requests_waiting".to_string()
}

/// Admission control configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Maximum generations running concurrently in this process.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    /// Maximum time a request may wait for a slot, in milliseconds.
    /// Unset means requests wait indefinitely.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

fn default_max_inflight() -> usize {
    512
}

/// Deployment identity labels attached to every metric series
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_instance() -> String {
    // Kubernetes injects the pod name as HOSTNAME
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-instance".to_string())
}

/// Queue-depth monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_monitor_interval() -> u64 {
    5
}

impl Settings {
    /// Load settings from environment variables over built-in defaults
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.grpc_port", default_grpc_port() as i64)?
            .set_default("server.metrics_port", default_metrics_port() as i64)?
            .set_default("model.id", default_model_id())?
            .set_default("model.dtype", default_dtype())?
            .set_default("model.tensor_parallel_size", default_tp() as i64)?
            .set_default("engine.base_url", default_engine_url())?
            .set_default("engine.connect_timeout_ms", default_engine_timeout() as i64)?
            .set_default("engine.waiting_metric", default_waiting_metric())?
            .set_default("admission.max_inflight", default_max_inflight() as i64)?
            .set_default("identity.namespace", default_namespace())?
            .set_default("identity.instance", default_instance())?
            .set_default("monitor.interval_secs", default_monitor_interval() as i64)?
            .add_source(
                Environment::with_prefix("LLM_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.grpc_port == 0 {
            return Err(config::ConfigError::Message(
                "gRPC port cannot be 0".to_string(),
            )
            .into());
        }
        if self.server.grpc_port == self.server.metrics_port {
            return Err(config::ConfigError::Message(
                "gRPC and metrics ports must differ".to_string(),
            )
            .into());
        }
        if self.admission.max_inflight == 0 {
            return Err(config::ConfigError::Message(
                "admission.max_inflight must be at least 1".to_string(),
            )
            .into());
        }
        if self.engine.base_url.is_empty() {
            return Err(config::ConfigError::Message(
                "engine.base_url cannot be empty".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.grpc_port)
    }

    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.metrics_port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                grpc_port: default_grpc_port(),
                metrics_port: default_metrics_port(),
            },
            model: ModelConfig {
                id: default_model_id(),
                dtype: default_dtype(),
                tensor_parallel_size: default_tp(),
            },
            engine: EngineConfig {
                base_url: default_engine_url(),
                connect_timeout_ms: default_engine_timeout(),
                waiting_metric: default_waiting_metric(),
            },
            admission: AdmissionConfig {
                max_inflight: default_max_inflight(),
                wait_timeout_ms: None,
            },
            identity: IdentityConfig {
                namespace: default_namespace(),
                instance: default_instance(),
            },
            monitor: MonitorConfig {
                interval_secs: default_monitor_interval(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.grpc_port, 50051);
        assert_eq!(settings.server.metrics_port, 8000);
        assert_eq!(settings.admission.max_inflight, 512);
        assert!(settings.admission.wait_timeout_ms.is_none());
        assert_eq!(settings.monitor.interval_secs, 5);
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut settings = Settings::default();
        settings.admission.max_inflight = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_port_collision() {
        let mut settings = Settings::default();
        settings.server.metrics_port = settings.server.grpc_port;
        assert!(settings.validate().is_err());
    }
}
