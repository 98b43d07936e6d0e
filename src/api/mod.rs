//! Network-facing surfaces: gRPC service and metrics endpoint

pub mod grpc;
pub mod metrics_server;

pub use grpc::LlmService;
