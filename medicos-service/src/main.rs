use medicos_service::{ServiceConfig, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing();

    let app = match create_app(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialize service");
            std::process::exit(1);
        }
    };

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Medicos health assistant starting on {}", addr);
    info!(chat_model = %config.chat_model, ocr_model = %config.ocr_model, "Model configuration");
    info!("Health check endpoint: http://{}/api/health", addr);
    info!("Chat endpoint: POST http://{}/api/chat", addr);
    info!("Report upload endpoint: POST http://{}/api/upload", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
