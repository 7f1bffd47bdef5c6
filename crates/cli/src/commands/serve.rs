//! `ragent serve`: Start the HTTP API server.

use ragent_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🦀 Ragent API");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} via {}", config.model.model, config.model.base_url);
    println!("   Uploads:   {}", config.storage.uploads_dir().display());

    ragent_gateway::start(config).await?;

    Ok(())
}
