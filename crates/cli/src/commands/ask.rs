//! `ragent ask`: Run one query and print its events as they arrive.

use std::io::Write;

use ragent_agent::{OrchestrationEvent, QueryRequest};
use ragent_config::AppConfig;
use ragent_gateway::GatewayState;

pub async fn run(
    query: String,
    collection: Option<String>,
    conversation: Option<String>,
    no_rag: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let state = GatewayState::from_config(&config)?;

    let mut request = QueryRequest::new(query)
        .with_collection(collection.unwrap_or_else(|| state.default_collection.clone()));
    if let Some(id) = conversation {
        request = request.with_conversation(id);
    }
    if no_rag {
        request = request.with_rag(false);
    }

    let mut events = state.orchestration.run_stream(request);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        match event {
            OrchestrationEvent::Token { content } => {
                print!("{content}");
                stdout.flush()?;
            }
            OrchestrationEvent::Action { action } => println!("🔧 {action}"),
            OrchestrationEvent::ActionResult { result } => println!("   {}\n", result.replace('\n', "\n   ")),
            OrchestrationEvent::Sources { sources } => {
                println!("\n\n📄 Sources:");
                for source in sources {
                    println!("   - {}", source.source);
                }
            }
            OrchestrationEvent::Done { .. } => println!(),
            OrchestrationEvent::Error { error } => return Err(format!("Query failed: {error}").into()),
        }
        if terminal {
            break;
        }
    }

    Ok(())
}
