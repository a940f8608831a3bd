//! Core HTTP operations with rate limiting and retry logic
//!
//! Every request to the origin passes through [`HttpHandler`], which applies a
//! shared rate limit and backs off exponentially on throttling (429/503) and
//! transport failures.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::{IF_RANGE, RANGE};
use reqwest::{Client, Method, StatusCode};
use url::Url;

use crate::app::client::config::ClientConfig;
use crate::constants::limits;
use crate::errors::{DownloadError, DownloadResult};

/// Open-ended byte range, honoured only while the resource keeps `if_range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange<'a> {
    pub start: u64,
    pub if_range: &'a str,
}

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
    max_retries: u32,
    retry_base_delay: Duration,
    request_timeout: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler from the client configuration
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the HTTP client cannot be built or the rate
    /// limit is zero
    pub fn new(config: &ClientConfig) -> DownloadResult<Self> {
        let client = config.build_http_client()?;
        let rate_limiter = Self::build_rate_limiter(config.rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            request_timeout: config.request_timeout,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> DownloadResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            DownloadError::Transport {
                reason: "Rate limit must be non-zero".to_string(),
            }
        })?);
        Ok(RateLimiter::direct(quota))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis = (self.retry_base_delay.as_millis() as u64)
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(limits::RETRY_MAX_DELAY_MS);
        Duration::from_millis(millis)
    }

    /// Sends a request with rate limiting and retry logic
    ///
    /// Returns the raw response; status codes other than 429/503 are left for the
    /// caller to interpret. A range is sent with `If-Range`, so a changed
    /// resource comes back whole (200) instead of as a mismatched tail.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        range: Option<ByteRange<'_>>,
    ) -> DownloadResult<reqwest::Response> {
        // Apply rate limiting with jitter to avoid thundering herd
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let mut retries = 0;
        loop {
            let mut request = self.client.request(method.clone(), url.as_str());
            if let Some(range) = range {
                request = request
                    .header(RANGE, format!("bytes={}-", range.start))
                    .header(IF_RANGE, range.if_range);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        if retries < self.max_retries {
                            retries += 1;
                            let delay = self.backoff_delay(retries);
                            tracing::warn!(
                                "Origin throttled ({}). Backing off for {}ms",
                                status.as_u16(),
                                delay.as_millis()
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(DownloadError::from_status(status.as_u16(), url.as_str()));
                    }

                    tracing::debug!("{} {} -> {}", method, url, status.as_u16());
                    return Ok(response);
                }
                Err(e) if retries < self.max_retries && !e.is_builder() => {
                    retries += 1;
                    let delay = self.backoff_delay(retries);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("Request to {} failed after {} retries: {}", url, retries, e);
                    if e.is_timeout() {
                        return Err(DownloadError::Timeout {
                            seconds: self.request_timeout.as_secs(),
                        });
                    }
                    return Err(DownloadError::Http(e));
                }
            }
        }
    }

    /// GET a resource and require a 2xx response
    pub async fn get_success(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        let response = self.send(Method::GET, url, None).await?;
        ensure_success(response, url)
    }

    /// Fetches a text resource
    pub async fn get_text(&self, url: &Url) -> DownloadResult<String> {
        let response = self.get_success(url).await?;
        let text = response.text().await?;
        tracing::debug!("Fetched text resource: {}", url);
        Ok(text)
    }

    /// Issues a HEAD request and requires a 2xx response
    pub async fn head(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        let response = self.send(Method::HEAD, url, None).await?;
        ensure_success(response, url)
    }
}

/// Map a non-2xx response into the matching error
pub fn ensure_success(response: reqwest::Response, url: &Url) -> DownloadResult<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(DownloadError::from_status(
            response.status().as_u16(),
            url.as_str(),
        ))
    }
}
