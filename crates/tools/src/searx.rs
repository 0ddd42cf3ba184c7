//! SearXNG client (`/search?format=json`).
//!
//! The instance must have the JSON output format enabled.

use std::time::Duration;

use mm_domain::error::{Error, Result};
use serde_json::Value;

use crate::{ImageHit, ImageSearch, SearchHit, WebSearch};

pub struct SearxClient {
    client: reqwest::Client,
    base_url: String,
}

impl SearxClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn query(&self, query: &str, category: &str) -> Result<Value> {
        let url = format!("{}/search", self.base_url);
        tracing::debug!(category, query, "searx query");

        let resp = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("categories", category)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(e.to_string())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("searx returned HTTP {}", status.as_u16())));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| Error::Http(format!("invalid searx response: {e}")))
    }
}

fn results(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("results")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_hits(body: &Value, limit: usize) -> Vec<SearchHit> {
    results(body)
        .filter_map(|r| {
            let url = str_field(r, "url")?;
            Some(SearchHit {
                title: str_field(r, "title").unwrap_or(url).to_string(),
                url: url.to_string(),
                snippet: str_field(r, "content").unwrap_or_default().to_string(),
            })
        })
        .take(limit)
        .collect()
}

pub(crate) fn parse_image(body: &Value) -> Option<ImageHit> {
    results(body).find_map(|r| {
        let src = str_field(r, "img_src")?;
        if !(src.starts_with("http://") || src.starts_with("https://")) {
            return None;
        }
        Some(ImageHit {
            url: src.to_string(),
            title: str_field(r, "title").unwrap_or_default().to_string(),
            source: str_field(r, "url").map(String::from),
        })
    })
}

#[async_trait::async_trait]
impl WebSearch for SearxClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let body = self.query(query, "general").await?;
        Ok(parse_hits(&body, limit))
    }
}

#[async_trait::async_trait]
impl ImageSearch for SearxClient {
    async fn find_image(&self, query: &str) -> Result<Option<ImageHit>> {
        let body = self.query(query, "images").await?;
        Ok(parse_image(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hits_skip_entries_without_url() {
        let body = json!({"results": [
            {"title": "Rust", "url": "https://rust-lang.org", "content": "A language"},
            {"title": "broken"},
            {"url": "https://example.com"},
            {"title": "Third", "url": "https://three.example"}
        ]});
        let hits = parse_hits(&body, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "A language");
        assert_eq!(hits[1].title, "https://example.com");
    }

    #[test]
    fn image_requires_http_source() {
        let body = json!({"results": [
            {"title": "inline", "img_src": "data:image/png;base64,AAAA"},
            {"title": "cat", "img_src": "https://img.example/cat.jpg", "url": "https://page.example"}
        ]});
        let hit = parse_image(&body).unwrap();
        assert_eq!(hit.url, "https://img.example/cat.jpg");
        assert_eq!(hit.source.as_deref(), Some("https://page.example"));
        assert!(parse_image(&json!({"results": []})).is_none());
        assert!(parse_image(&json!({})).is_none());
    }
}
