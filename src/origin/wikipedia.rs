//! Wikipedia parse API origin
//!
//! Fetches the lead section of an article through the MediaWiki `parse`
//! action.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::{OriginClient, OriginError};

/// Default MediaWiki API endpoint
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";

const USER_AGENT: &str = concat!("wikistash/", env!("CARGO_PKG_VERSION"));

/// Origin client for the MediaWiki parse API
#[derive(Clone)]
pub struct WikipediaOrigin {
    http_client: Client,
    api_url: String,
}

impl WikipediaOrigin {
    /// Create a client for `api_url` with a per-request timeout
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_url: api_url.into(),
        })
    }

    /// Build the parse request URL for a page title
    pub fn page_url(&self, key: &str) -> String {
        format!(
            "{}?action=parse&format=json&section=0&page={}",
            self.api_url,
            urlencoding::encode(key)
        )
    }
}

/// MediaWiki reports unknown pages and bad parameters with HTTP 200 and a
/// top-level `error` object; those bodies must not be cached.
fn check_api_error(body: &Value) -> Result<(), OriginError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let field = |name: &str| {
        error
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Err(OriginError::Api {
        code: field("code"),
        info: field("info"),
    })
}

#[async_trait]
impl OriginClient for WikipediaOrigin {
    async fn fetch(&self, key: &str) -> Result<Value, OriginError> {
        let url = self.page_url(key);
        debug!(key = key, url = %url, "Fetching from origin");

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OriginError::from_status(status, &body));
        }

        let body: Value = response.json().await?;
        check_api_error(&body)?;

        info!(key = key, "Fetched page from origin");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_url_encodes_title() {
        let origin = WikipediaOrigin::new(DEFAULT_API_URL, Duration::from_secs(5)).unwrap();
        assert_eq!(
            origin.page_url("Go (programming language)"),
            "https://en.wikipedia.org/w/api.php?action=parse&format=json&section=0&page=Go%20%28programming%20language%29"
        );
        assert!(origin.page_url("AT&T").ends_with("page=AT%26T"));
    }

    #[test]
    fn test_api_error_body_is_rejected() {
        let body = json!({
            "error": {
                "code": "missingtitle",
                "info": "The page you specified doesn't exist.",
                "*": "See https://en.wikipedia.org/w/api.php for API usage."
            }
        });
        match check_api_error(&body) {
            Err(OriginError::Api { code, info }) => {
                assert_eq!(code, "missingtitle");
                assert!(info.contains("doesn't exist"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_body_passes() {
        let body = json!({
            "parse": {
                "title": "Go (programming language)",
                "pageid": 25039021,
                "text": {"*": "<p>Go is a programming language</p>"}
            }
        });
        assert!(check_api_error(&body).is_ok());
    }
}
