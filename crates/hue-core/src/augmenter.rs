//! **Context Augmenter**: web-search grounding for each turn.
//!
//! Pulls the first sentence that looks like a factual claim out of the user's
//! input (or falls back to the raw input), runs exactly one search for it, and
//! flattens the answer box plus the top organic hits into a single context
//! string for the completion prompt. Search trouble never fails a turn.

use crate::error::{clip, ErrorKind, HueError, HueResult};
use crate::violations::ViolationLog;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest query sent to the search service, in characters.
pub const MAX_QUERY_CHARS: usize = 150;
/// Organic results folded into the context.
pub const MAX_RESULTS: usize = 3;

static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("static sentence regex"));

static CLAIM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b\d{4}\b",
        r"(?i)\b(is|was|are|were)\s+\w+",
        r"(?i)\b(according to|studies show|research indicates)",
        r"(?i)\b(percent|percentage|%)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static claim regex"))
    .collect()
});

/// One organic search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

/// What a search collaborator hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// Answer-box text, when the engine produced one.
    pub direct_answer: Option<String>,
    /// Organic results in rank order.
    pub hits: Vec<SearchHit>,
}

/// Web-search collaborator.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one query asking for up to `count` results.
    async fn search(&self, query: &str, count: usize) -> HueResult<SearchResults>;
}

/// Sentences of `text` that look like checkable factual claims.
pub fn extract_claims(text: &str) -> Vec<String> {
    SENTENCE_SPLIT
        .split(text)
        .filter(|sentence| CLAIM_PATTERNS.iter().any(|re| re.is_match(sentence)))
        .map(|sentence| sentence.trim().to_string())
        .collect()
}

/// Join the answer box and the first [`MAX_RESULTS`] snippets with `" | "`.
pub fn build_context(results: &SearchResults) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(answer) = results.direct_answer.as_deref().filter(|a| !a.trim().is_empty()) {
        parts.push(format!("Direct answer: {}", answer.trim()));
    }
    for hit in results.hits.iter().take(MAX_RESULTS) {
        if !hit.snippet.trim().is_empty() {
            parts.push(format!("{}: {}", hit.title, hit.snippet));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Claim extraction + one search per turn.
pub struct ContextAugmenter {
    backend: std::sync::Arc<dyn SearchBackend>,
    violations: ViolationLog,
}

impl ContextAugmenter {
    pub fn new(backend: std::sync::Arc<dyn SearchBackend>, violations: ViolationLog) -> Self {
        Self {
            backend,
            violations,
        }
    }

    /// Search for the first claim in `input` (or `input` itself) and return context.
    pub async fn augment(&self, input: &str) -> Option<String> {
        let claims = extract_claims(input);
        let query = match claims.first() {
            Some(claim) => {
                info!("Found {} potential factual claims", claims.len());
                clip(claim, MAX_QUERY_CHARS)
            }
            None => clip(input, MAX_QUERY_CHARS),
        };
        let context = self.fetch_context(&query).await;
        match &context {
            Some(c) => info!("Web search provided context ({} chars)", c.len()),
            None => info!("No web search context available - proceeding without it"),
        }
        context
    }

    /// One search call; failures are recorded and degrade to `None`.
    pub async fn fetch_context(&self, query: &str) -> Option<String> {
        let query = clip(query, MAX_QUERY_CHARS);
        debug!(query = %query, "searching web for context");
        match self.backend.search(&query, MAX_RESULTS).await {
            Ok(results) => {
                let context = build_context(&results);
                if context.is_none() {
                    warn!("No search results for: {}", query);
                }
                context
            }
            Err(e) => {
                warn!("Search error: {}", e);
                self.violations.record(format!("Web search failed: {}", e.detail));
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SerpAPI adapter
// ---------------------------------------------------------------------------

const SERPAPI_BASE: &str = "https://serpapi.com";

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    answer_box: Option<SerpAnswerBox>,
    #[serde(default)]
    organic_results: Vec<SerpOrganic>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SerpAnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct SerpOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Google results through SerpAPI (`/search.json`).
pub struct SerpApiSearch {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SerpApiSearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> HueResult<Self> {
        Self::with_base_url(SERPAPI_BASE, api_key, timeout)
    }

    /// Point at a different host (tests, proxies).
    pub fn with_base_url(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> HueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                HueError::new(ErrorKind::SearchUnavailable, format!("HTTP client setup failed: {e}"))
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl SearchBackend for SerpApiSearch {
    async fn search(&self, query: &str, count: usize) -> HueResult<SearchResults> {
        if self.api_key.trim().is_empty() {
            return Err(HueError::new(ErrorKind::SearchUnavailable, "SERPAPI_KEY not set"));
        }
        let url = format!("{}/search.json", self.base_url);
        let count = count.to_string();
        let res = self
            .client
            .get(&url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", count.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| HueError::new(ErrorKind::SearchUnavailable, e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(HueError::new(
                ErrorKind::SearchUnavailable,
                format!("SerpAPI error {}: {}", status, clip(&body, 200)),
            ));
        }

        let parsed: SerpResponse = res
            .json()
            .await
            .map_err(|e| HueError::new(ErrorKind::SearchUnavailable, format!("parse failed: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(HueError::new(ErrorKind::SearchUnavailable, err));
        }

        let direct_answer = parsed
            .answer_box
            .and_then(|b| b.answer.filter(|a| !a.is_empty()).or(b.snippet));
        let hits = parsed
            .organic_results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.snippet,
            })
            .collect();
        Ok(SearchResults {
            direct_answer,
            hits,
        })
    }
}
