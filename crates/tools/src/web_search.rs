//! Web search tool.
//!
//! The tool formats hits from a pluggable [`SearchBackend`]. Live backends
//! are DuckDuckGo (keyless HTML results with an Instant Answer fallback),
//! Brave Search and Tavily. [`StaticSearchBackend`] serves fixed hits for
//! offline use and tests.

use async_trait::async_trait;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_RESULTS: usize = 3;
const MAX_RESULTS_CAP: usize = 10;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub body: String,
    pub href: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, body: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            href: href.into(),
        }
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError>;
}

pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information such as news, prices, weather or recent events."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3)",
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a non-empty string".into()))?;

        let max_results = max_results_from(&arguments["max_results"]);
        debug!(backend = self.backend.name(), query, max_results, "Searching the web");

        match self.backend.search(query, max_results).await {
            Ok(hits) if hits.is_empty() => Ok(ToolResult::ok("No results found.")),
            Ok(hits) => Ok(ToolResult::ok(format_hits(&hits))),
            Err(e) => Ok(ToolResult::failed(format!("Search error: {e}"))),
        }
    }
}

/// Models often send numbers as strings; both are accepted.
fn max_results_from(value: &serde_json::Value) -> usize {
    let requested = match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    requested.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, MAX_RESULTS_CAP)
}

/// Numbered `title / body / Source:` entries separated by blank lines.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n{}\nSource: {}\n", i + 1, hit.title, hit.body, hit.href))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serves a fixed list of hits, truncated to the requested count.
pub struct StaticSearchBackend {
    hits: Vec<SearchHit>,
}

impl StaticSearchBackend {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    /// Always reports no results.
    pub fn offline() -> Self {
        Self { hits: Vec::new() }
    }
}

#[async_trait]
impl SearchBackend for StaticSearchBackend {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ragent/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ToolError::ExecutionFailed(format!("failed to create HTTP client: {e}")))
}

fn check_status(response: &reqwest::Response, service: &str) -> Result<(), ToolError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(ToolError::ExecutionFailed(format!(
        "{service} returned HTTP {}",
        response.status().as_u16()
    )))
}

/// DuckDuckGo web results scraped from the keyless HTML endpoint.
///
/// When that page yields nothing (rate limiting, markup changes) the
/// Instant Answer API is tried instead.
pub struct DuckDuckGoBackend {
    client: reqwest::Client,
}

const DUCKDUCKGO_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const DUCKDUCKGO_INSTANT_ENDPOINT: &str = "https://api.duckduckgo.com/";

impl DuckDuckGoBackend {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        Ok(Self { client: http_client(timeout)? })
    }

    async fn html_results(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let response = self
            .client
            .post(DUCKDUCKGO_HTML_ENDPOINT)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        check_status(&response, "search endpoint")?;

        let page = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("unreadable search response: {e}")))?;
        Ok(parse_result_page(&page, max_results))
    }

    async fn instant_answer(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let response = self
            .client
            .get(DUCKDUCKGO_INSTANT_ENDPOINT)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        check_status(&response, "search endpoint")?;

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("unreadable search response: {e}")))?;

        Ok(answer.into_hits(max_results))
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        match self.html_results(query, max_results).await {
            Ok(hits) if !hits.is_empty() => Ok(hits),
            Ok(_) => {
                debug!("No HTML results, trying Instant Answer API");
                self.instant_answer(query, max_results).await
            }
            Err(e) => {
                debug!(error = %e, "HTML search failed, trying Instant Answer API");
                self.instant_answer(query, max_results).await
            }
        }
    }
}

static RESULT_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)<a([^>]*class="result__a"[^>]*)>(.*?)</a>"#).ok());
static RESULT_SNIPPET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)<[a-z]+[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#).ok());
static HREF: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Extract `(title, snippet, url)` triples from a DuckDuckGo HTML result page.
///
/// Each snippet is paired with the nearest preceding result link. Sponsored
/// links (routed through `y.js`) are skipped.
fn parse_result_page(page: &str, max_results: usize) -> Vec<SearchHit> {
    let (Some(link_re), Some(snippet_re), Some(href_re)) =
        (RESULT_LINK.as_ref(), RESULT_SNIPPET.as_ref(), HREF.as_ref())
    else {
        return Vec::new();
    };

    let links: Vec<_> = link_re.captures_iter(page).collect();
    let snippets: Vec<_> = snippet_re.captures_iter(page).collect();

    let mut hits = Vec::new();
    for (i, link) in links.iter().enumerate() {
        let (Some(whole), Some(attrs), Some(title)) = (link.get(0), link.get(1), link.get(2)) else {
            continue;
        };
        let Some(raw_href) = href_re.captures(attrs.as_str()).and_then(|c| c.get(1)) else {
            continue;
        };
        let href = result_target(&decode_entities(raw_href.as_str()));
        if href.is_empty() || href.contains("duckduckgo.com/y.js") {
            continue;
        }

        let next_link = links.get(i + 1).and_then(|l| l.get(0)).map_or(page.len(), |m| m.start());
        let body = snippets
            .iter()
            .filter_map(|s| s.get(1))
            .find(|s| s.start() > whole.end() && s.start() < next_link)
            .map(|s| html_text(s.as_str()))
            .unwrap_or_default();

        hits.push(SearchHit::new(html_text(title.as_str()), body, href));
        if hits.len() == max_results {
            break;
        }
    }
    hits
}

/// Result links point at a `/l/?uddg=<target>` redirect; unwrap it.
fn result_target(href: &str) -> String {
    let absolute = if href.starts_with("//") { format!("https:{href}") } else { href.to_string() };
    let Ok(url) = reqwest::Url::parse(&absolute) else {
        return href.to_string();
    };
    url.query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
        .unwrap_or(absolute)
}

fn html_text(fragment: &str) -> String {
    let stripped = match TAG.as_ref() {
        Some(tag) => tag.replace_all(fragment, "").into_owned(),
        None => fragment.to_string(),
    };
    decode_entities(&stripped).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Brave Search web results. Needs a subscription token.
pub struct BraveBackend {
    client: reqwest::Client,
    api_key: String,
}

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

impl BraveBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveResponse {
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        self.web
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit::new(html_text(&r.title), html_text(&r.description), r.url))
            .collect()
    }
}

#[async_trait]
impl SearchBackend for BraveBackend {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let count = max_results.to_string();
        let response = self
            .client
            .get(BRAVE_ENDPOINT)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        check_status(&response, "Brave Search")?;

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("unreadable Brave Search response: {e}")))?;
        Ok(body.into_hits(max_results))
    }
}

/// Tavily search API. Needs an API key.
pub struct TavilyBackend {
    client: reqwest::Client,
    api_key: String,
}

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

impl TavilyBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyResponse {
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        self.results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit::new(r.title, r.content, r.url))
            .collect()
    }
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "include_answer": false,
        });
        let response = self
            .client
            .post(TAVILY_ENDPOINT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        check_status(&response, "Tavily")?;

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("unreadable Tavily response: {e}")))?;
        Ok(body.into_hits(max_results))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a leaf topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Leaf {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

impl InstantAnswer {
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        if !self.answer.is_empty() {
            let title = if self.heading.is_empty() { "Instant answer".to_string() } else { self.heading.clone() };
            hits.push(SearchHit::new(title, self.answer, self.abstract_url.clone()));
        }
        if !self.abstract_text.is_empty() {
            hits.push(SearchHit::new(self.heading, self.abstract_text, self.abstract_url));
        }

        let mut pending: Vec<RelatedTopic> = self.related_topics.into_iter().rev().collect();
        while let Some(topic) = pending.pop() {
            match topic {
                RelatedTopic::Leaf { text, first_url } if !text.is_empty() => {
                    let (title, body) = match text.split_once(" - ") {
                        Some((title, body)) => (title.to_string(), body.to_string()),
                        None => (text.clone(), text),
                    };
                    hits.push(SearchHit::new(title, body, first_url));
                }
                RelatedTopic::Leaf { .. } => {}
                RelatedTopic::Group { topics } => pending.extend(topics.into_iter().rev()),
            }
        }

        hits.truncate(max_results);
        hits
    }
}
