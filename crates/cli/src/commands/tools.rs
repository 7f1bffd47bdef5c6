//! `ragent tools`: Print the tool catalog.

use ragent_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = ragent_tools::default_registry(&config.tools);

    println!("🔧 Available tools ({})\n", registry.len());
    for tool in registry.list_tools() {
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        if let Some(required) = tool.parameters.get("required").and_then(|r| r.as_array()) {
            let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
            if !names.is_empty() {
                println!("    required: {}", names.join(", "));
            }
        }
        println!();
    }

    Ok(())
}
