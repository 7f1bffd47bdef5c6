//! `ragent doctor`: Diagnose configuration and backend health.

use ragent_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Ragent Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `ragent onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the config before running other checks.");
            return Ok(());
        }
    };

    let uploads = config.storage.uploads_dir();
    if uploads.is_dir() {
        println!("  ✅ Upload directory exists");
    } else {
        println!("  ⚠️  No upload directory at {} — run `ragent onboard`", uploads.display());
        issues += 1;
    }

    match ragent_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => {
                println!("  ✅ Model backend reachable at {}", config.model.base_url);
                match provider.list_models().await {
                    Ok(models) if models.iter().any(|m| m == &config.model.model) => {
                        println!("  ✅ Model '{}' available", config.model.model);
                    }
                    Ok(_) => {
                        println!("  ⚠️  Model '{}' not listed by the backend", config.model.model);
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  ⚠️  Could not list models: {e}");
                        issues += 1;
                    }
                }
            }
            Ok(false) | Err(_) => {
                println!("  ❌ Model backend unreachable at {}", config.model.base_url);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not usable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
