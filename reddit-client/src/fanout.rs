//! Concurrent page fetch once every cursor is known.
//!
//! One task per cursor, at most `max_concurrency` requests in flight. A task
//! that fails or outlives its timeout contributes nothing and never disturbs
//! its siblings.

use crate::api::{PageSource, RawPage};
use oauth2::AccessToken;
use scraper_core::{FetchError, FetchRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct FanOutResult {
    /// Successful pages in completion order.
    pub pages: Vec<(String, RawPage)>,
    pub failures: Vec<FetchError>,
    pub dispatched: usize,
}

pub struct FanOutFetcher {
    source: Arc<dyn PageSource>,
    page_timeout: Duration,
    max_concurrency: usize,
}

impl FanOutFetcher {
    pub fn new(source: Arc<dyn PageSource>, page_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            source,
            page_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn fetch_all(
        &self,
        token: &AccessToken,
        request: Arc<FetchRequest>,
        cursors: &[String],
    ) -> FanOutResult {
        let mut result = FanOutResult {
            dispatched: cursors.len(),
            ..FanOutResult::default()
        };
        if cursors.is_empty() {
            return result;
        }

        info!(
            "Fanning out {} page requests (max {} concurrent)",
            cursors.len(),
            self.max_concurrency
        );
        let pool = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for cursor in cursors {
            let source = Arc::clone(&self.source);
            let pool = Arc::clone(&pool);
            let token = token.clone();
            let request = Arc::clone(&request);
            let cursor = cursor.clone();
            let page_timeout = self.page_timeout;

            tasks.spawn(async move {
                let outcome = match pool.acquire_owned().await {
                    Ok(_permit) => {
                        let fetch = source.fetch_page(&token, &request, Some(&cursor));
                        match timeout(page_timeout, fetch).await {
                            Ok(Ok(page)) => Ok(page),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err(format!("timed out after {:?}", page_timeout)),
                        }
                    }
                    Err(_) => Err("worker pool closed".to_string()),
                };
                (cursor, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((cursor, Ok(page))) => {
                    debug!("Page after {} returned {} entries", cursor, page.entries.len());
                    result.pages.push((cursor, page));
                }
                Ok((cursor, Err(reason))) => {
                    warn!("Dropping page after {}: {}", cursor, reason);
                    result.failures.push(FetchError::PageFetch { cursor, reason });
                }
                Err(e) => {
                    error!("Page task aborted: {}", e);
                    result.failures.push(FetchError::PageFetch {
                        cursor: "<unknown>".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Fan-out finished: {} pages fetched, {} failed",
            result.pages.len(),
            result.failures.len()
        );
        result
    }
}
