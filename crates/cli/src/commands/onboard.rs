//! `ragent onboard`: First-time setup.

use ragent_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("🦀 Ragent — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let uploads = config.storage.uploads_dir();
    if !uploads.exists() {
        std::fs::create_dir_all(&uploads)?;
        println!("✅ Created upload directory: {}", uploads.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Start Ollama and pull the model: ollama pull {}", config.model.model);
    println!("   2. Run: ragent serve");
    println!("   3. Upload documents with POST /upload and query with POST /query\n");

    Ok(())
}
