//! Main entry point for the LLM Serving Gateway

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tonic_health::server::health_reporter;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use llm_serving_gateway::api::LlmService;
use llm_serving_gateway::config::Settings;
use llm_serving_gateway::engine::{HttpEngine, InferenceEngine};
use llm_serving_gateway::gateway::spawn_queue_depth_monitor;
use llm_serving_gateway::proto;
use llm_serving_gateway::proto::llm_server::LlmServer;
use llm_serving_gateway::ServiceContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();

    info!("Starting LLM Serving Gateway");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        model = %settings.model.id,
        dtype = %settings.model.dtype,
        tensor_parallel_size = settings.model.tensor_parallel_size,
        max_inflight = settings.admission.max_inflight,
        "Loaded configuration"
    );

    // Engine client and shared service context
    let engine: Arc<dyn InferenceEngine> = Arc::new(HttpEngine::new(&settings)?);
    let ctx = Arc::new(ServiceContext::new(settings, engine.clone())?);

    // Queue-depth monitor, running for the process lifetime
    spawn_queue_depth_monitor(
        engine,
        ctx.metrics.clone(),
        Duration::from_secs(ctx.settings.monitor.interval_secs),
    );

    // Metrics endpoint on its own port
    let metrics_addr: SocketAddr = ctx.settings.metrics_addr().parse()?;
    let metrics_app = llm_serving_gateway::api::metrics_server::router(ctx.clone());
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!("Metrics listening on {}", metrics_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            error!(error = %e, "Metrics server exited");
        }
    });

    // gRPC server: health, reflection, and the LLM service
    let (mut health, health_service) = health_reporter();
    health.set_serving::<LlmServer<LlmService>>().await;
    health
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build()?;

    let grpc_addr: SocketAddr = ctx.settings.grpc_addr().parse()?;
    info!("gRPC listening on {}", grpc_addr);

    tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(LlmServer::new(LlmService::new(ctx)))
        .serve(grpc_addr)
        .await?;

    Ok(())
}
