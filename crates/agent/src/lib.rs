//! The query orchestration loop for Ragent.
//!
//! For each user turn the loop:
//!
//! 1. **Classifies** the query; live-data questions go straight to web search
//! 2. **Retrieves** document context from the requested collection
//! 3. **Streams** a first model pass, forwarding tokens as they arrive
//! 4. **Acts** on a tool directive in that output, then streams a final pass
//! 5. **Records** the exchange in the conversation store
//!
//! Progress is reported as [`OrchestrationEvent`]s for the transport layer.

pub mod classifier;
pub mod directive;
pub mod orchestrator;
pub mod prompt;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use classifier::{Classification, RuleCategory, classify, clean_search_query, requires_external_info};
pub use directive::ActionDirective;
pub use orchestrator::{OrchestrationLoop, QueryOutcome, QueryRequest};
pub use stream_event::{OrchestrationEvent, SourceRef};
