//! Heuristic detection of queries that need live external data.
//!
//! Rules are an ordered table: the first category with a matching phrase
//! decides. Search triggers sit above the document/advice suppressors, so
//! "search for the weather in the uploaded report" still forces a search.

use serde::Serialize;

/// Rule categories in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Topics that are only answerable with live data
    StrongTrigger,
    /// The user explicitly asks for a web search
    SearchRequest,
    /// The user points at uploaded material
    DocumentReference,
    /// Opinion or planning requests the model can answer itself
    AdviceRequest,
}

impl RuleCategory {
    /// Whether a match in this category forces the search path.
    pub fn forces_search(self) -> bool {
        matches!(self, Self::StrongTrigger | Self::SearchRequest)
    }
}

const RULES: &[(RuleCategory, &[&str])] = &[
    (
        RuleCategory::StrongTrigger,
        &[
            "current price",
            "latest price",
            "stock price",
            "share price",
            "exchange rate",
            "weather",
            "forecast",
            "breaking news",
            "latest news",
            "today's news",
            "news today",
            "live score",
            "right now",
        ],
    ),
    (
        RuleCategory::SearchRequest,
        &[
            "search for",
            "search the web",
            "search online",
            "google",
            "look up online",
            "look it up online",
            "find online",
            "on the internet",
        ],
    ),
    (
        RuleCategory::DocumentReference,
        &[
            "document",
            "uploaded",
            "upload",
            "based on",
            "according to",
            "report",
            "the file",
            "this pdf",
            "my notes",
        ],
    ),
    (
        RuleCategory::AdviceRequest,
        &[
            "how should i",
            "what should i",
            "should i",
            "recommend",
            "advice",
            "strategy",
            "plan for",
            "suggest",
        ],
    ),
];

/// Which rule fired, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: Option<RuleCategory>,
    pub matched: Option<&'static str>,
}

impl Classification {
    pub fn requires_external_info(&self) -> bool {
        self.category.is_some_and(RuleCategory::forces_search)
    }
}

/// Match `query` against the rule table.
pub fn classify(query: &str) -> Classification {
    let lowered = query.to_lowercase();
    for (category, phrases) in RULES {
        if let Some(phrase) = phrases.iter().find(|p| lowered.contains(*p)) {
            return Classification {
                category: Some(*category),
                matched: Some(*phrase),
            };
        }
    }
    Classification {
        category: None,
        matched: None,
    }
}

/// Pure predicate: must this query go to web search regardless of the model?
pub fn requires_external_info(query: &str) -> bool {
    classify(query).requires_external_info()
}

/// Leading phrases stripped from a query before it is sent to the search tool.
const LEADING_FILLER: &[&str] = &[
    "can you please",
    "could you please",
    "can you",
    "could you",
    "would you",
    "will you",
    "please",
    "search the web for",
    "search online for",
    "search for",
    "look up online",
    "look up",
    "google",
    "find out",
    "find me",
    "tell me",
    "i want to know",
    "i'd like to know",
    "what is",
    "what's",
    "whats",
];

/// Remove politeness and imperative lead-ins so the search engine sees the
/// topic. Falls back to the trimmed input if nothing would remain.
pub fn clean_search_query(query: &str) -> String {
    let original = query.trim();
    let mut rest = original;

    loop {
        let lowered = rest.to_lowercase();
        let Some(prefix) = LEADING_FILLER.iter().find(|p| starts_with_word(&lowered, p)) else {
            break;
        };
        let Some(tail) = rest.get(prefix.len()..) else {
            break;
        };
        rest = tail.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ':');
    }

    let cleaned = rest.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '?' | '!' | '.'));
    if cleaned.is_empty() {
        original.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `text` starts with `phrase` followed by a word boundary.
fn starts_with_word(text: &str, phrase: &str) -> bool {
    text.starts_with(phrase)
        && text[phrase.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric())
}
