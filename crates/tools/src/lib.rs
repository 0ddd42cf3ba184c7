//! Tool backends for Murmur.
//!
//! The runtime's dispatcher owns argument handling and result formatting;
//! this crate only talks to the outside world:
//! - [`WebSearch`] / [`ImageSearch`]: SearXNG JSON API ([`SearxClient`])
//! - [`PageReader`]: bounded HTTP fetch with HTML-to-text ([`WebFetchReader`])

pub mod fetch;
pub mod searx;

pub use fetch::WebFetchReader;
pub use searx::SearxClient;

use mm_domain::error::Result;
use serde::{Deserialize, Serialize};

/// One web search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// One image search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHit {
    /// Direct image URL.
    pub url: String,
    pub title: String,
    /// Page the image was found on.
    #[serde(default)]
    pub source: Option<String>,
}

#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

#[async_trait::async_trait]
pub trait ImageSearch: Send + Sync {
    /// Best matching image, `None` when nothing usable was found.
    async fn find_image(&self, query: &str) -> Result<Option<ImageHit>>;
}

#[async_trait::async_trait]
pub trait PageReader: Send + Sync {
    /// Readable text of the page at `url`.
    async fn read(&self, url: &str) -> Result<String>;
}
