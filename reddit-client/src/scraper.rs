use crate::api::{PageSource, RedditApiClient};
use crate::auth::{OAuthTokenProvider, TokenSource};
use crate::fanout::FanOutFetcher;
use crate::metrics::ApiMetrics;
use crate::normalize::normalize_entries;
use crate::walker::CursorWalker;
use scraper_core::{
    AppConfig, CoreError, ErrorExt, FetchError, FetchRequest, FetchSettings, RedditPost,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one fetch produced, including what it had to give up on.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// First-page posts first, then fan-out pages in completion order.
    pub posts: Vec<RedditPost>,
    pub cursors: Vec<String>,
    pub fan_out_tasks: usize,
    /// Pages whose posts are missing from `posts`.
    pub failures: Vec<FetchError>,
}

impl FetchReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Token, cursor discovery, fan-out, normalization.
pub struct RedditScraper {
    tokens: Arc<dyn TokenSource>,
    walker: CursorWalker,
    fan_out: FanOutFetcher,
    page_size: u32,
    api_client: Option<Arc<RedditApiClient>>,
}

impl RedditScraper {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        pages: Arc<dyn PageSource>,
        settings: &FetchSettings,
    ) -> Self {
        Self {
            tokens,
            walker: CursorWalker::new(
                Arc::clone(&pages),
                settings.page_timeout(),
                settings.page_delay(),
            ),
            fan_out: FanOutFetcher::new(pages, settings.page_timeout(), settings.max_concurrency),
            page_size: settings.page_size,
            api_client: None,
        }
    }

    /// Wires the real Reddit token endpoint and listing API.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let api_client = Arc::new(RedditApiClient::new(
            &config.reddit,
            config.fetch.page_timeout(),
        )?);
        let tokens = Arc::new(OAuthTokenProvider::new(
            &config.reddit,
            api_client.http_client(),
        )?);

        let mut scraper = Self::new(tokens, api_client.clone(), &config.fetch);
        scraper.api_client = Some(api_client);
        Ok(scraper)
    }

    pub fn request(
        &self,
        max_pages: u32,
        subreddit: Option<&str>,
        query: Option<&str>,
    ) -> FetchRequest {
        FetchRequest::new(max_pages, subreddit, query).with_page_size(self.page_size)
    }

    /// Fetches up to `max_pages` pages and returns their posts.
    ///
    /// Fatal failures are logged and yield an empty Vec; use
    /// [`fetch_with_report`](Self::fetch_with_report) to tell the two apart.
    pub async fn fetch(
        &self,
        max_pages: u32,
        subreddit: Option<&str>,
        query: Option<&str>,
    ) -> Vec<RedditPost> {
        let request = self.request(max_pages, subreddit, query);
        match self.fetch_with_report(request).await {
            Ok(report) => report.posts,
            Err(e) => {
                e.log_error();
                Vec::new()
            }
        }
    }

    pub async fn fetch_with_report(&self, request: FetchRequest) -> Result<FetchReport, FetchError> {
        info!(
            "Fetching {} (max {} pages)",
            request.endpoint(),
            request.max_pages()
        );

        let token = self.tokens.access_token().await.map_err(|e| match e {
            CoreError::Fetch(fetch_error) => fetch_error,
            other => FetchError::Auth {
                reason: other.to_string(),
            },
        })?;
        debug!("Token acquired");

        let discovery = self.walker.discover(&token, &request).await?;
        let mut failures: Vec<FetchError> = discovery.truncated_by.into_iter().collect();

        let mut posts = normalize_entries(&discovery.first_page.entries);
        let request = Arc::new(request);
        let fanned = self
            .fan_out
            .fetch_all(&token, Arc::clone(&request), &discovery.cursors)
            .await;

        for (_, page) in &fanned.pages {
            posts.extend(normalize_entries(&page.entries));
        }
        // A cursor that failed during discovery may still succeed in fan-out.
        failures.retain(|failure| match failure {
            FetchError::PageFetch { cursor, .. } => {
                !fanned.pages.iter().any(|(fetched, _)| fetched == cursor)
            }
            _ => true,
        });
        failures.extend(fanned.failures);

        if failures.is_empty() {
            info!("Fetched {} posts from {}", posts.len(), request.endpoint());
        } else {
            warn!(
                "Fetched {} posts from {} with {} page failures",
                posts.len(),
                request.endpoint(),
                failures.len()
            );
        }

        Ok(FetchReport {
            posts,
            cursors: discovery.cursors,
            fan_out_tasks: fanned.dispatched,
            failures,
        })
    }

    /// Request metrics of the HTTP client, when built via [`from_config`](Self::from_config).
    pub async fn api_metrics(&self) -> Option<ApiMetrics> {
        match &self.api_client {
            Some(client) => Some(client.get_metrics().await),
            None => None,
        }
    }
}
