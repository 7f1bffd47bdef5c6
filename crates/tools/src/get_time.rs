//! Clock tool: reports the local date and time.

use async_trait::async_trait;
use chrono::Local;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};

pub struct GetTimeTool;

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let now = Local::now();
        Ok(ToolResult::ok(format!(
            "Current date and time: {}",
            now.format("%Y-%m-%d %H:%M:%S")
        )))
    }
}
