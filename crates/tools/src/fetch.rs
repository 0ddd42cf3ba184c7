//! URL reader: fetch a page with strict limits and extract readable text.
//!
//! - Hard timeout and redirect limit (5 hops)
//! - Max response size, enforced while streaming the body
//! - Max text output
//! - Only `http` / `https` URLs

use std::time::Duration;

use futures_util::StreamExt;
use mm_domain::config::FetchConfig;
use mm_domain::error::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

use crate::PageReader;

const UA: &str = "Murmur/0.1 (chat agent)";

pub struct WebFetchReader {
    client: reqwest::Client,
    max_bytes: usize,
    max_text_chars: usize,
}

impl WebFetchReader {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: cfg.max_bytes,
            max_text_chars: cfg.max_text_chars,
        })
    }
}

/// Reject anything that is not an absolute http(s) URL.
pub fn check_url(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .ok_or_else(|| Error::Other(format!("unsupported URL (http/https only): {url}")))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(Error::Other(format!("URL has no host: {url}")));
    }
    Ok(())
}

/// Strip tags, drop script/style bodies, decode common entities and
/// collapse whitespace (block-level tags become newlines).
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut out_chars = 0usize;
    let mut in_tag = false;
    let mut skip_until: Option<&'static str> = None;
    let mut tag_buf = String::new();

    for ch in html.chars() {
        if out_chars >= max_chars {
            break;
        }
        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag = tag_buf.trim().to_lowercase();
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                let closing = tag.starts_with('/');

                match (skip_until, closing, name.as_str()) {
                    (None, false, "script") => skip_until = Some("script"),
                    (None, false, "style") => skip_until = Some("style"),
                    (None, false, "noscript") => skip_until = Some("noscript"),
                    (Some(open), true, n) if n == open => skip_until = None,
                    _ => {}
                }

                let block = matches!(
                    name.as_str(),
                    "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr"
                        | "article" | "section" | "header" | "footer" | "blockquote"
                );
                if (closing && block) || name == "br" {
                    if !out.ends_with('\n') {
                        out.push('\n');
                        out_chars += 1;
                    }
                }
            }
            _ if in_tag => tag_buf.push(ch),
            _ if skip_until.is_some() => {}
            _ => {
                out.push(ch);
                out_chars += 1;
            }
        }
    }

    let out = out
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    let mut result = String::new();
    let mut prev_blank = false;
    for line in out.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if !prev_blank {
                result.push('\n');
                prev_blank = true;
            }
        } else {
            result.push_str(&trimmed);
            result.push('\n');
            prev_blank = false;
        }
    }
    result.trim().to_string()
}

#[async_trait::async_trait]
impl PageReader for WebFetchReader {
    async fn read(&self, url: &str) -> Result<String> {
        check_url(url)?;

        let resp = self
            .client
            .get(url.trim())
            .header(USER_AGENT, UA)
            .header(ACCEPT, "text/html,application/xhtml+xml,text/plain,application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("fetch {url}: {e}"))
                } else {
                    Error::Http(format!("fetch {url}: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("fetch {url}: HTTP {}", status.as_u16())));
        }
        let ct = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        // Stream body with hard byte cap.
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Http(e.to_string()))?;
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(Error::Other(format!(
                    "response exceeded {} bytes limit",
                    self.max_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&buf);

        let text = if ct.contains("html") || (ct.is_empty() && body.trim_start().starts_with('<')) {
            html_to_text(&body, self.max_text_chars)
        } else if ct.contains("json") || ct.starts_with("text/") || ct.is_empty() {
            body.chars().take(self.max_text_chars).collect()
        } else {
            return Err(Error::Other(format!("unsupported content type: {ct}")));
        };

        tracing::debug!(url, bytes = buf.len(), chars = text.chars().count(), "page read");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        let html = "<html><head><style>p{color:red}</style></head><body><h1>Hello</h1>\
                    <p>World</p><script>var x=1;</script><p>after</p></body></html>";
        let text = html_to_text(html, 10_000);
        assert_eq!(text, "Hello\nWorld\nafter");
    }

    #[test]
    fn decodes_entities_once() {
        let text = html_to_text("<p>A &amp; B &lt; C &amp;lt;</p>", 10_000);
        assert_eq!(text, "A & B < C &lt;");
    }

    #[test]
    fn respects_char_limit() {
        let html = "<p>This is a very long text that should be truncated</p>";
        assert!(html_to_text(html, 10).chars().count() <= 10);
    }

    #[test]
    fn url_scheme_is_checked() {
        assert!(check_url("https://example.com/a").is_ok());
        assert!(check_url("HTTP://EXAMPLE.COM").is_ok());
        assert!(check_url("file:///etc/passwd").is_err());
        assert!(check_url("ftp://example.com").is_err());
        assert!(check_url("https://").is_err());
        assert!(check_url("example.com").is_err());
    }
}
