//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for match pages, including:
//! - Building HTTP clients with browser-like headers and a cookie store
//! - Deriving the detail URL for a work item
//! - Error classification (retryable vs. permanent)
//! - Handing the body to the page parser

use crate::config::SourceConfig;
use crate::crawler::parser::{parse_match_page, PageContext, ParsedMatch};
use crate::record::{season_for_position, MatchRecord};
use crate::snapshot::WorkItem;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// The page was fetched and parsed
    Success(MatchRecord),

    /// The item exists but has nothing to record (forfeit, ...)
    Skipped { reason: String },

    /// The fetch or parse failed
    Failed {
        /// Error description
        error: String,
        /// Whether another attempt may succeed
        retryable: bool,
    },
}

impl FetchResult {
    pub fn retryable(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            retryable: true,
        }
    }

    pub fn permanent(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            retryable: false,
        }
    }
}

/// Turns a work item into a record or a typed failure
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The remote source configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches match detail pages over HTTP
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    item_path: String,
    season_length: usize,
    max_season: u32,
}

impl HttpFetcher {
    pub fn new(client: Client, config: &SourceConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            item_path: config.item_path.clone(),
            season_length: config.season_length,
            max_season: config.max_season,
        })
    }

    /// The listing link when the snapshot kept one, else `item-path` with the id filled in
    pub fn item_url(&self, item: &WorkItem) -> Result<Url, url::ParseError> {
        match &item.url {
            Some(url) => Url::parse(url),
            None => self
                .base_url
                .join(&self.item_path.replace("{id}", &item.id.to_string())),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches and parses one match page
    ///
    /// # Error Classification
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | HTTP 429, 403, 503, other 5xx | retryable |
    /// | Timeout, connection error | retryable |
    /// | Challenge interstitial in a 200 body | retryable |
    /// | HTTP 404, 410, other 4xx | permanent |
    /// | Page without teams or scores | permanent |
    /// | Forfeit notice | skipped |
    async fn fetch(&self, item: &WorkItem) -> FetchResult {
        let url = match self.item_url(item) {
            Ok(url) => url,
            Err(e) => return FetchResult::permanent(format!("invalid item url: {}", e)),
        };

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        if !status.is_success() {
            return classify_status(status);
        }

        let final_url = response.url().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchResult::retryable(format!("body read failed: {}", e)),
        };

        if is_challenge_page(&body) {
            return FetchResult::retryable("challenge page served instead of match page");
        }

        // A redirect to another match yields that match's id, which the
        // coordinator rejects as a key mismatch.
        let match_id = match_id_from_url(&final_url).unwrap_or(item.id);
        let ctx = PageContext {
            match_id,
            season: season_for_position(item.position, self.season_length, self.max_season),
            source_url: url.as_str(),
            scraped_at: Utc::now(),
        };

        match parse_match_page(&body, &ctx) {
            Ok(ParsedMatch::Record(record)) => FetchResult::Success(record),
            Ok(ParsedMatch::Forfeit) => FetchResult::Skipped {
                reason: "forfeit".to_string(),
            },
            Err(e) => FetchResult::permanent(format!("unparseable match page: {}", e)),
        }
    }
}

/// Maps a non-success HTTP status to a fetch result
pub fn classify_status(status: StatusCode) -> FetchResult {
    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::FORBIDDEN
        | StatusCode::SERVICE_UNAVAILABLE => FetchResult::retryable(format!("HTTP {}", code)),
        s if s.is_server_error() => FetchResult::retryable(format!("HTTP {}", code)),
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            FetchResult::permanent(format!("HTTP {} (not found)", code))
        }
        _ => FetchResult::permanent(format!("HTTP {}", code)),
    }
}

fn classify_transport_error(e: &reqwest::Error) -> FetchResult {
    if e.is_timeout() {
        FetchResult::retryable("request timeout")
    } else if e.is_connect() {
        FetchResult::retryable(format!("connection failed: {}", e))
    } else if e.is_builder() {
        FetchResult::permanent(e.to_string())
    } else {
        FetchResult::retryable(e.to_string())
    }
}

/// Detects anti-bot interstitials served with a 200 status
pub fn is_challenge_page(body: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "<title>Just a moment...</title>",
        "cf-browser-verification",
        "challenge-platform",
        "cf_chl_opt",
    ];
    MARKERS.iter().any(|marker| body.contains(marker))
}

fn match_id_from_url(url: &Url) -> Option<u64> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "matches" {
            return segments.next()?.parse().ok();
        }
    }
    None
}
