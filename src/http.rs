//! Thin `reqwest` wrapper shared by the LLM client and the tools.
//!
//! Only transport failures (timeouts, refused or dropped connections) are ever
//! retried, and only when a caller opts in. Every HTTP status, 429 included,
//! is returned on first sight. Error messages never carry the request URL, as
//! some endpoints take credentials in the query string.

use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How many times a transport failure is retried and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::from_secs(1),
    };

    /// Delay before retry number `retry` (1-based), doubling each time up to 30 s.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.without_url().to_string()))?;
        Ok(Self {
            client,
            retry: RetryPolicy::NONE,
        })
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.retry.base_delay = base_delay;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let body = self.send(|| self.client.get(url).query(query)).await?;
        serde_json::from_str(&body).map_err(|e| {
            Error::api(extract_domain(url), format!("response is not the expected JSON: {e}"))
        })
    }

    /// POST a pre-serialized JSON body and return the response text.
    pub async fn post_json_raw(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        self.send(|| {
            headers.iter().fold(
                self.client
                    .post(url)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.to_owned()),
                |req, (name, value)| req.header(*name, *value),
            )
        })
        .await
    }

    async fn send<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match build().send().await {
                Ok(resp) => return read_response(resp).await,
                Err(e) => e,
            };

            let transient = err.is_timeout() || err.is_connect();
            let message = err.without_url().to_string();
            if !transient || attempts > self.retry.max_retries {
                return Err(if transient {
                    Error::http(format!("{message} (after {attempts} attempt(s))"))
                } else {
                    Error::http(message)
                });
            }

            let delay = self.retry.backoff(attempts);
            warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %message, "transport failure, retrying");
            sleep(delay).await;
        }
    }
}

async fn read_response(resp: Response) -> Result<String> {
    let status = resp.status();
    let platform = extract_domain(resp.url().as_str());
    debug!(%status, %platform, "response received");

    if status.is_success() {
        return resp
            .text()
            .await
            .map_err(|e| Error::http(e.without_url().to_string()));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(Error::RateLimit {
            platform,
            retry_after_secs,
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::api_with_status(platform, body, status.as_u16()))
}

/// Host (and port) of a URL, used to label upstream errors.
pub(crate) fn extract_domain(url: &str) -> String {
    url.split_once("//")
        .and_then(|(_, rest)| rest.split(['/', '?']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_from_url() {
        assert_eq!(
            extract_domain("https://api.openai.com/v1/chat/completions"),
            "api.openai.com"
        );
        assert_eq!(extract_domain("http://127.0.0.1:4010/messages"), "127.0.0.1:4010");
        assert_eq!(
            extract_domain("https://api.weatherapi.com?key=abc"),
            "api.weatherapi.com"
        );
        assert_eq!(extract_domain("not a url"), "unknown");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(12), MAX_BACKOFF);
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn retries_are_opt_in() {
        let client = HttpClient::new("test", Duration::from_secs(1)).unwrap();
        assert_eq!(client.retry_policy().max_retries, 0);
        assert_eq!(client.with_retries(2).retry_policy().max_retries, 2);
    }

    #[tokio::test]
    async fn transport_errors_hide_the_query_string() {
        let client = HttpClient::new("test", Duration::from_secs(5)).unwrap();
        let err = client
            .get_json_query::<serde_json::Value>(
                "http://127.0.0.1:1/current.json",
                &[("key", "SECRET123"), ("q", "Warsaw")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("SECRET123"), "{err}");
        assert!(err.to_string().contains("after 1 attempt(s)"), "{err}");
    }
}
