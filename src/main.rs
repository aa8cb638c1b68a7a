mod api; // HTTP request/response boundary
mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod state;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;

use config::Config;
use handlers::EstimationPipeline;
use state::ServiceState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    log::info!("🚀 Starting Food Weight Estimation API...");
    log::info!("   Depth model architecture: {}", config.depth_model_architecture);
    log::info!("   Depth model weights: {}", config.depth_model_weights);
    log::info!("   Segmentation model weights: {}", config.segmentation_model_weights);
    log::info!("   Density database: {}", config.density_db_source);

    let state = Arc::new(ServiceState::load(&config).await);
    if !state.is_ready() {
        log::warn!("⚠️ Models could not be loaded. API will run in limited mode.");
    }

    let pipeline = EstimationPipeline::new(state);

    #[cfg(feature = "http-server")]
    {
        use api::server::create_router;

        let app = create_router(
            pipeline,
            config.estimation_timeout(),
            config.max_body_bytes,
        );

        let addr = config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("🌐 Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    #[cfg(not(feature = "http-server"))]
    {
        log::warn!(
            "⚠️ Built without the http-server feature, nothing to serve ({} ready: {})",
            config.bind_addr(),
            pipeline.state().is_ready()
        );
        shutdown_signal().await;
    }

    log::info!("🛑 Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("❌ Failed to listen for shutdown signal: {}", e);
    }
}
