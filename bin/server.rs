// HDI Demographics - Web Server
// REST API with Axum over the demographics database

use anyhow::{Context, Result};
use hdi_demographics::api::{router, AppState};
use hdi_demographics::config::{init_logging, AppConfig};
use hdi_demographics::{open_database, DemographicsImporter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(&config.rust_log);

    println!("🌐 HDI Demographics - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(&config.database_path)?;
    println!("✓ Database opened: {}", config.database_path.display());

    let state = AppState::new(conn, DemographicsImporter::with_timeout(config.fetch_timeout));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/demographics", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");
    log::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
