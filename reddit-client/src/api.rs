use crate::metrics::{MetricsCollector, RequestMetrics};
use async_trait::async_trait;
use oauth2::AccessToken;
use reqwest::{Client, Response, StatusCode};
use scraper_core::{ConfigError, CoreError, FetchRequest, RedditApiError, RedditConfig};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditListing {
    #[serde(default)]
    pub data: RedditListingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditListingData {
    pub after: Option<String>,
    pub children: Vec<RedditListingChild>,
}

/// Entries stay untyped until normalization so a single odd field can't
/// reject a whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditListingChild {
    #[serde(default)]
    pub data: Value,
}

/// One decoded listing page.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub entries: Vec<Value>,
    pub after: Option<String>,
}

impl From<RedditListing> for RawPage {
    fn from(listing: RedditListing) -> Self {
        Self {
            entries: listing
                .data
                .children
                .into_iter()
                .map(|child| child.data)
                .collect(),
            after: listing.data.after.filter(|cursor| !cursor.is_empty()),
        }
    }
}

/// A single bounded listing request. Implementations must not retry.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
        after: Option<&str>,
    ) -> Result<RawPage, CoreError>;
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    api_base: Url,
    metrics: Arc<MetricsCollector>,
}

impl RedditApiClient {
    pub fn new(config: &RedditConfig, page_timeout: Duration) -> Result<Self, CoreError> {
        let api_base = Url::parse(&config.api_base).map_err(|_| ConfigError::InvalidValue {
            field: "reddit.api_base".to_string(),
            value: config.api_base.clone(),
        })?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(page_timeout)
            .build()?;

        Ok(Self {
            http_client,
            api_base,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// The underlying client, shared with the token provider.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }

    pub fn listing_url(&self, endpoint: &str) -> Result<Url, CoreError> {
        self.api_base.join(endpoint).map_err(|e| {
            CoreError::InvalidInput {
                message: format!("Cannot build listing URL for {}: {}", endpoint, e),
            }
        })
    }

    async fn make_request(
        &self,
        endpoint: &str,
        access_token: &AccessToken,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = self.listing_url(endpoint)?;
        let start_time = Instant::now();

        debug!("GET {} {:?}", endpoint, query_params);
        let result = self
            .http_client
            .get(url)
            .bearer_auth(access_token.secret())
            .query(query_params)
            .send()
            .await;

        let status_code = result.as_ref().ok().map(|response| response.status().as_u16());
        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(classify_status(response.status(), endpoint)),
            Err(e) if e.is_timeout() => Err(CoreError::RedditApi(RedditApiError::RequestTimeout)),
            Err(e) => Err(CoreError::Network(e)),
        };

        let request_metrics = RequestMetrics {
            endpoint: endpoint.to_string(),
            status_code,
            response_time: start_time.elapsed(),
            success: outcome.is_ok(),
            timed_out: matches!(
                outcome,
                Err(CoreError::RedditApi(RedditApiError::RequestTimeout))
            ),
            error_type: outcome.as_ref().err().map(error_type),
        };
        self.metrics.record_request(request_metrics).await;

        if let Err(e) = &outcome {
            warn!("Listing request {} failed: {}", endpoint, e);
        }
        outcome
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }
}

#[async_trait]
impl PageSource for RedditApiClient {
    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
        after: Option<&str>,
    ) -> Result<RawPage, CoreError> {
        request.validate()?;
        let endpoint = request.endpoint();
        let mut params = request.query_params();
        if let Some(cursor) = after {
            params.push(("after", cursor.to_string()));
        }

        let response = self.make_request(&endpoint, token, &params).await?;

        let listing: RedditListing = response.json().await.map_err(|e| {
            error!("Failed to decode listing from {}: {}", endpoint, e);
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Undecodable listing from {}", endpoint),
                })
            }
        })?;

        let page = RawPage::from(listing);
        debug!(
            "Decoded {} entries from {} (after: {:?})",
            page.entries.len(),
            endpoint,
            page.after
        );
        Ok(page)
    }
}

fn classify_status(status: StatusCode, endpoint: &str) -> CoreError {
    let api_error = match status.as_u16() {
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => match endpoint.strip_prefix("/r/") {
            Some(rest) => RedditApiError::SubredditNotFound {
                subreddit: rest.split('/').next().unwrap_or_default().to_string(),
            },
            None => RedditApiError::InvalidResponse {
                details: "Resource not found".to_string(),
            },
        },
        // Upstream limits are not negotiated; the header is ignored.
        429 => RedditApiError::RateLimitExceeded { retry_after: 60 },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {}", code),
        },
    };
    CoreError::RedditApi(api_error)
}

fn error_type(error: &CoreError) -> String {
    match error {
        CoreError::RedditApi(RedditApiError::InvalidToken) => "unauthorized",
        CoreError::RedditApi(RedditApiError::Forbidden { .. }) => "forbidden",
        CoreError::RedditApi(RedditApiError::SubredditNotFound { .. }) => "not_found",
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. }) => "rate_limited",
        CoreError::RedditApi(RedditApiError::ServerError { .. }) => "server_error",
        CoreError::RedditApi(RedditApiError::RequestTimeout) => "timeout",
        CoreError::Network(_) => "network_error",
        _ => "invalid_response",
    }
    .to_string()
}
