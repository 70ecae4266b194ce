// Corpus Retrieval Service
// Reference documents for a query: search-page links plus reference sites, fetched in parallel

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::config_store::RetrievalConfig;
use crate::models::SourceEntry;

const CONTENT_CONTAINERS: &str = "main, article, #content, .content, .post-content";
const SKIPPED_ANCESTORS: &[&str] = &["nav", "footer", "header", "script", "style", "aside"];

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Fetch timed out after {0}s")]
    Timeout(u64),
    #[error("Empty query")]
    EmptyQuery,
}

/// Supplies reference documents for a query.
#[async_trait]
pub trait CorpusRetriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str) -> Result<Vec<SourceEntry>, RetrievalError>;
}

// ============ Static Retriever ============

/// Fixed corpus, for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    entries: Vec<SourceEntry>,
}

impl StaticRetriever {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorpusRetriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<SourceEntry>, RetrievalError> {
        Ok(self.entries.clone())
    }
}

// ============ Query Helpers ============

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]").expect("citation regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// First `max_chars` characters of the content, single-line.
pub fn build_query(content: &str, max_chars: usize) -> String {
    let head: String = content.chars().take(max_chars).collect();
    head.replace(&['\n', '\r'][..], " ").trim().to_string()
}

pub fn query_variants(query: &str) -> Vec<String> {
    vec![
        query.to_string(),
        format!("{} research", query),
        format!("{} analysis", query),
        format!("{} blog", query),
    ]
}

/// `application/x-www-form-urlencoded` form of a query (spaces as `+`).
pub fn encode_query_component(query: &str) -> String {
    form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

pub fn fill_template(template: &str, query: &str) -> String {
    template.replace("{query}", &encode_query_component(query))
}

pub fn reference_urls(templates: &[String], query: &str) -> Vec<String> {
    templates.iter().map(|t| fill_template(t, query)).collect()
}

pub fn dedupe_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

// ============ HTML Extraction ============

/// Resolve a search-result href to a direct http(s) URL, unwrapping `uddg=` redirect links.
fn resolve_result_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
        let target = Url::parse(&target).ok()?;
        return matches!(target.scheme(), "http" | "https").then(|| target.to_string());
    }

    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub fn search_result_links(html: &str, selector: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse(selector) else {
        warn!("[RETRIEVAL] Invalid search result selector: {}", selector);
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(resolve_result_href)
        .collect()
}

fn inside_skipped_element(el: &ElementRef) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .map_or(false, |e| SKIPPED_ANCESTORS.contains(&e.name()))
    })
}

/// Paragraph text from the main content container, or from the whole page when none exists.
pub fn extract_article_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let (Ok(containers), Ok(paragraph)) = (Selector::parse(CONTENT_CONTAINERS), Selector::parse("p"))
    else {
        return String::new();
    };

    let texts: Vec<String> = match doc.select(&containers).next() {
        Some(main) => main
            .select(&paragraph)
            .filter(|p| !inside_skipped_element(p))
            .map(|p| p.text().collect::<Vec<_>>().join(" "))
            .collect(),
        None => doc
            .select(&paragraph)
            .filter(|p| !inside_skipped_element(p))
            .map(|p| p.text().collect::<Vec<_>>().join(" "))
            .collect(),
    };

    texts.join(" ")
}

/// Collapse whitespace and drop citation markers.
pub fn clean_source_text(text: &str) -> String {
    let no_citations = citation_re().replace_all(text, "");
    whitespace_re().replace_all(&no_citations, " ").trim().to_string()
}

// ============ Synthetic Corpus ============

/// Topic entries at high, medium and low similarity, used when retrieval comes back thin.
pub fn synthetic_entries(query: &str) -> Vec<SourceEntry> {
    let topic = if query.trim().is_empty() { "this topic" } else { query.trim() };
    let base = format!(
        "This is an article about {topic}. It contains important information about the topic. \
Many experts have written about {topic} with varying perspectives. \
Understanding {topic} requires careful analysis and research. "
    );

    let high = format!(
        "{}{topic} is frequently discussed in academic circles.",
        base.repeat(4)
    );
    let medium = format!("Some information about {topic}. {}", base);
    let low = format!(
        "This is only tangentially related to {topic}. Readers looking for depth should consult \
dedicated references, because this page mostly covers unrelated background material."
    );

    vec![
        SourceEntry::new("synthetic://high", "synthetic-high", high),
        SourceEntry::new("synthetic://medium", "synthetic-medium", medium),
        SourceEntry::new("synthetic://low", "synthetic-low", low),
    ]
}

/// Append synthetic entries when fewer than `min_usable` entries are usable.
pub fn ensure_minimum_corpus(
    mut entries: Vec<SourceEntry>,
    query: &str,
    min_usable: usize,
    min_chars: usize,
) -> Vec<SourceEntry> {
    let usable = entries.iter().filter(|e| e.is_usable(min_chars)).count();
    if usable < min_usable {
        info!(
            "[RETRIEVAL] Only {} usable sources, adding synthetic topic entries",
            usable
        );
        entries.extend(synthetic_entries(query));
    }
    entries
}

// ============ Web Retriever ============

pub struct WebCorpusRetriever {
    client: Client,
    config: RetrievalConfig,
}

impl WebCorpusRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// Run every query variant through the search template at once, each bounded by the fetch
    /// timeout. Links keep variant order.
    async fn search_all(&self, template: &str, query: &str, deadline: Instant) -> Vec<String> {
        let limit = Duration::from_secs(self.config.fetch_timeout_secs)
            .min(deadline.saturating_duration_since(Instant::now()));
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut join_set: JoinSet<(usize, String, Result<Vec<String>, RetrievalError>)> = JoinSet::new();

        for (idx, variant) in query_variants(query).into_iter().enumerate() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let url = fill_template(template, &variant);
            let selector = self.config.search_result_selector.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (idx, variant, Ok(Vec::new()));
                };
                let result = match tokio::time::timeout(limit, search_links(&client, &url, &selector)).await {
                    Ok(result) => result,
                    Err(_) => Err(RetrievalError::Timeout(limit.as_secs())),
                };
                (idx, variant, result)
            });
        }

        let mut found: Vec<(usize, Vec<String>)> = Vec::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, variant, Ok(links))) => {
                    debug!("[RETRIEVAL] {} results for '{}'", links.len(), variant);
                    found.push((idx, links));
                }
                Ok((_, variant, Err(e))) => warn!("[RETRIEVAL] Search failed for '{}': {}", variant, e),
                Err(e) => warn!("[RETRIEVAL] Search task failed: {}", e),
            }
        }

        found.sort_by_key(|(idx, _)| *idx);
        found.into_iter().flat_map(|(_, links)| links).collect()
    }

    /// Search links followed by the reference sites. Reference sites always keep their slots
    /// under `max_urls`.
    async fn collect_urls(&self, query: &str, deadline: Instant) -> Vec<String> {
        let references = dedupe_preserving_order(reference_urls(&self.config.reference_url_templates, query));

        let mut searched = match &self.config.search_url_template {
            Some(template) => dedupe_preserving_order(self.search_all(template, query, deadline).await),
            None => Vec::new(),
        };
        searched.retain(|u| !references.contains(u));
        searched.truncate(self.config.max_urls.saturating_sub(references.len()));

        let mut urls = searched;
        urls.extend(references);
        urls.truncate(self.config.max_urls);
        urls
    }

    /// Fetch every URL on a bounded pool; failures are dropped, order follows the input.
    /// At `deadline` the outstanding fetches are cancelled and whatever arrived is returned.
    async fn fetch_all(&self, urls: Vec<String>, deadline: Instant) -> Vec<SourceEntry> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut join_set: JoinSet<(usize, Option<SourceEntry>)> = JoinSet::new();
        let timeout_secs = self.config.fetch_timeout_secs;
        let min_chars = self.config.min_source_chars;

        for (idx, url) in urls.into_iter().enumerate() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (idx, None);
                };
                let fut = fetch_page(&client, &url, min_chars);
                let entry = match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
                    Ok(Ok(entry)) => entry,
                    Ok(Err(e)) => {
                        debug!("[RETRIEVAL] Failed to process {}: {}", url, e);
                        None
                    }
                    Err(_) => {
                        debug!("[RETRIEVAL] {} ({})", RetrievalError::Timeout(timeout_secs), url);
                        None
                    }
                };
                (idx, entry)
            });
        }

        let gather_deadline = tokio::time::Instant::from_std(deadline);
        let mut results: Vec<(usize, SourceEntry)> = Vec::new();
        loop {
            match tokio::time::timeout_at(gather_deadline, join_set.join_next()).await {
                Ok(Some(Ok((idx, Some(entry))))) => results.push((idx, entry)),
                Ok(Some(Ok((_, None)))) => {}
                Ok(Some(Err(e))) => warn!("[RETRIEVAL] Fetch task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "[RETRIEVAL] Deadline reached with {} fetches outstanding, keeping {} sources",
                        join_set.len(),
                        results.len()
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        results.sort_by_key(|(idx, _)| *idx);
        results
            .into_iter()
            .map(|(_, entry)| entry)
            .take(self.config.max_sources)
            .collect()
    }
}

#[async_trait]
impl CorpusRetriever for WebCorpusRetriever {
    fn name(&self) -> &str {
        "web"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<SourceEntry>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.retrieval_timeout_secs);

        let urls = self.collect_urls(query, deadline).await;
        let url_count = urls.len();
        let entries = self.fetch_all(urls, deadline).await;

        info!(
            "[RETRIEVAL] Done: urls={}, sources={}, elapsed_ms={}",
            url_count,
            entries.len(),
            started.elapsed().as_millis()
        );
        Ok(entries)
    }
}

async fn fetch_html(client: &Client, url: &str) -> Result<String, RetrievalError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RetrievalError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

async fn search_links(client: &Client, url: &str, selector: &str) -> Result<Vec<String>, RetrievalError> {
    let html = fetch_html(client, url).await?;
    Ok(search_result_links(&html, selector))
}

async fn fetch_page(
    client: &Client,
    url: &str,
    min_chars: usize,
) -> Result<Option<SourceEntry>, RetrievalError> {
    let parsed = Url::parse(url).map_err(|_| RetrievalError::InvalidUrl(url.to_string()))?;
    let html = fetch_html(client, url).await?;
    let text = clean_source_text(&extract_article_text(&html));

    if text.chars().count() < min_chars {
        return Ok(None);
    }

    let domain = parsed.host_str().unwrap_or_default().to_string();
    Ok(Some(SourceEntry::new(url, domain, text)))
}
