//! HTTP listing source
//!
//! Reads the paginated results listing (`<listing-path>?offset=N`) and pulls
//! the match identifier out of every result row link.

use crate::config::SourceConfig;
use crate::crawler::is_challenge_page;
use crate::snapshot::{ListingEntry, ListingSource, SnapshotError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

/// Listing pages fetched with a shared HTTP client
pub struct HttpListingSource {
    client: Client,
    base_url: Url,
    listing_path: String,
}

impl HttpListingSource {
    pub fn new(client: Client, config: &SourceConfig) -> Result<Self, SnapshotError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| SnapshotError::Source {
            offset: 0,
            message: format!("invalid base-url '{}': {}", config.base_url, e),
        })?;

        Ok(Self {
            client,
            base_url,
            listing_path: config.listing_path.clone(),
        })
    }

    fn page_url(&self, offset: usize) -> Result<Url, SnapshotError> {
        let mut url = self
            .base_url
            .join(&self.listing_path)
            .map_err(|e| SnapshotError::Source {
                offset,
                message: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, offset: usize) -> Result<Vec<ListingEntry>, SnapshotError> {
        let url = self.page_url(offset)?;
        tracing::debug!("Fetching listing page {}", url);

        let source_error = |message: String| SnapshotError::Source { offset, message };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| source_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(source_error(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| source_error(e.to_string()))?;

        // A challenge page parses to zero rows and would pass for the end of the listing
        if is_challenge_page(&body) {
            return Err(source_error("challenge page".to_string()));
        }

        Ok(parse_listing_page(&body, &url))
    }
}

/// Extracts listing entries from one results page, in page order
pub fn parse_listing_page(html: &str, page_url: &Url) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(".result-con a") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| {
            let id = match_id_from_href(href)?;
            let url = page_url.join(href).ok().map(|u| u.to_string());
            Some(ListingEntry { id, url })
        })
        .collect()
}

/// `/matches/2386572/vitality-vs-g2-...` -> 2386572
fn match_id_from_href(href: &str) -> Option<u64> {
    let path = href.split(['?', '#']).next()?;
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    while let Some(segment) = segments.next() {
        if segment == "matches" {
            return segments.next()?.parse().ok();
        }
    }
    None
}
