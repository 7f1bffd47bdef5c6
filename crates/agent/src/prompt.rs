//! System prompt and follow-up turn assembly.

use ragent_core::{RetrievedPassage, ToolDescriptor};

const PREAMBLE: &str = "You are a helpful AI assistant with access to uploaded documents and tools.
When answering questions, use the provided context from documents when relevant.";

const DIRECTIVE_SHAPE: &str = r#"{"action": "tool_name", "parameters": {"param": "value"}}"#;

/// Render retrieved passages as labelled context blocks.
pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| format!("Source: {}\n{}", p.source_id, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One line per tool: name, description and parameter names.
pub fn format_catalog(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    for tool in tools {
        let params: Vec<&str> = tool
            .parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if params.is_empty() {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        } else {
            out.push_str(&format!(
                "- {}: {} (parameters: {})\n",
                tool.name,
                tool.description,
                params.join(", ")
            ));
        }
    }
    out
}

/// System prompt for the regular retrieval path.
///
/// With document context present the tool catalog is still listed but the
/// model is told to prefer the documents.
pub fn system_prompt(tools: &[ToolDescriptor], passages: &[RetrievedPassage]) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push('\n');

    if !tools.is_empty() {
        if passages.is_empty() {
            prompt.push_str("If you need to use a tool, respond with a JSON object in this format:\n");
        } else {
            prompt.push_str(
                "Answer from the document context below whenever it covers the question. \
                 Only if it does not, you may use a tool by responding with a JSON object in this format:\n",
            );
        }
        prompt.push_str(DIRECTIVE_SHAPE);
        prompt.push_str("\n\nAvailable tools:\n");
        prompt.push_str(&format_catalog(tools));
        prompt.push_str("\nIf you don't need a tool, just answer the question normally.");
    }

    if !passages.is_empty() {
        prompt.push_str("\n\nContext from documents:\n");
        prompt.push_str(&format_context(passages));
    }
    prompt
}

/// System prompt for the forced-search path. The raw search output is
/// embedded and the model answers from it directly.
pub fn forced_search_prompt(search_output: &str, passages: &[RetrievedPassage]) -> String {
    let mut prompt = String::from(
        "You are a helpful AI assistant. Up-to-date information relevant to the user's question is provided below.\n\
         Answer the question directly using this information. Do not mention that a search was performed, \
         and do not output JSON or request any tools.\n\n\
         Current information:\n",
    );
    prompt.push_str(search_output);

    if !passages.is_empty() {
        prompt.push_str("\n\nContext from documents:\n");
        prompt.push_str(&format_context(passages));
    }
    prompt
}

/// The synthetic user turn carrying a tool result into the final pass.
pub fn tool_result_turn(result: &str) -> String {
    format!(
        "Tool result: {result}\n\n\
         Using this result, answer my previous question naturally. Do not call any more tools."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passage(source: &str, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            text: text.into(),
            source_id: source.into(),
            score: 1.0,
        }
    }

    fn calculator() -> ToolDescriptor {
        ToolDescriptor {
            name: "calculator".into(),
            description: "Perform mathematical calculations".into(),
            parameters: json!({"type": "object", "properties": {"expression": {"type": "string"}}}),
        }
    }

    #[test]
    fn context_blocks_are_labelled() {
        let ctx = format_context(&[passage("a.txt", "alpha"), passage("b.md", "beta")]);
        assert_eq!(ctx, "Source: a.txt\nalpha\n\nSource: b.md\nbeta");
    }

    #[test]
    fn catalog_lists_parameters() {
        let catalog = format_catalog(&[calculator()]);
        assert!(catalog.contains("- calculator: Perform mathematical calculations (parameters: expression)"));
    }

    #[test]
    fn prompt_without_context_advertises_tools() {
        let prompt = system_prompt(&[calculator()], &[]);
        assert!(prompt.contains(DIRECTIVE_SHAPE));
        assert!(prompt.contains("Available tools:"));
        assert!(!prompt.contains("Context from documents"));
    }

    #[test]
    fn prompt_with_context_prefers_documents() {
        let prompt = system_prompt(&[calculator()], &[passage("report.txt", "Revenue grew 12%.")]);
        assert!(prompt.contains("Answer from the document context"));
        assert!(prompt.ends_with("Context from documents:\nSource: report.txt\nRevenue grew 12%."));
    }

    #[test]
    fn forced_prompt_embeds_search_output() {
        let prompt = forced_search_prompt("1. Paris\nSunny\nSource: x\n", &[]);
        assert!(prompt.contains("Sunny"));
        assert!(prompt.contains("Do not mention that a search was performed"));
    }

    #[test]
    fn tool_result_turn_carries_full_result() {
        let turn = tool_result_turn("Result: 12");
        assert!(turn.starts_with("Tool result: Result: 12"));
    }
}
