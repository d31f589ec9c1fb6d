//! LabelForge — annotation orchestration server.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("LabelForge — annotation orchestration server");
                println!();
                println!("Usage: labelforge");
                println!();
                println!("Environment:");
                println!("  LABELFORGE_PORT                  HTTP port (default 3060)");
                println!("  LABELFORGE_DATA_DIR              data directory (default ./data)");
                println!("  LABELFORGE_MODEL_ENDPOINTS       comma-separated label model URLs");
                println!("  LABELFORGE_CONTEXT_ENDPOINT      context provider URL");
                println!("  LABELFORGE_CONFIDENCE_THRESHOLD  default accept threshold");
                println!("  LABELFORGE_MAX_CONCURRENT_JOBS   worker pool size");
                return Ok(());
            }
            other => {
                eprintln!("Unknown command: {}. Use 'labelforge help' for usage.", other);
                std::process::exit(1);
            }
        }
    }

    let config = labelforge_core::EngineConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    let port = config.port;
    info!("Data directory: {}", config.data_dir.display());

    let state = Arc::new(
        AppState::new(config).map_err(|e| anyhow::anyhow!("Failed to start: {}", e))?,
    );

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("LabelForge server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
