//! Configuration module

pub mod settings;

pub use settings::{
    AdmissionConfig, EngineConfig, IdentityConfig, ModelConfig, MonitorConfig, ServerConfig,
    Settings,
};
