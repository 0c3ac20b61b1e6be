use brain_tumor_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(&config).await?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Brain Tumor Service starting on {}", addr);
    info!("API Documentation available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Document chat endpoint: POST http://{}/sessions", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
