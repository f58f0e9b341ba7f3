//! Serial cursor discovery.
//!
//! A page's cursor is only known once the page before it has been fetched, so
//! this phase cannot run in parallel. It yields the first page's entries and
//! the ordered cursors the fan-out phase will fetch.

use crate::api::{PageSource, RawPage};
use oauth2::AccessToken;
use scraper_core::{FetchError, FetchRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub first_page: RawPage,
    /// Cursors for pages 2..=N, in request order. Never longer than
    /// `max_pages - 1`.
    pub cursors: Vec<String>,
    /// Set when a discovery request failed and the walk stopped early.
    pub truncated_by: Option<FetchError>,
}

pub struct CursorWalker {
    source: Arc<dyn PageSource>,
    page_timeout: Duration,
    page_delay: Duration,
}

impl CursorWalker {
    pub fn new(source: Arc<dyn PageSource>, page_timeout: Duration, page_delay: Duration) -> Self {
        Self {
            source,
            page_timeout,
            page_delay,
        }
    }

    pub async fn discover(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
    ) -> Result<Discovery, FetchError> {
        let first_page = self.fetch(token, request, None).await.map_err(|reason| {
            error!("First page of {} failed: {}", request.endpoint(), reason);
            FetchError::FirstPage { reason }
        })?;

        let budget = request.cursor_budget();
        let mut cursors: Vec<String> = Vec::new();
        let mut truncated_by = None;
        let mut next = first_page.after.clone();

        while cursors.len() < budget {
            let Some(cursor) = next.take() else {
                debug!("No further cursor after {} pages", cursors.len() + 1);
                break;
            };
            cursors.push(cursor.clone());
            if cursors.len() == budget {
                break;
            }

            sleep(self.page_delay).await;
            match self.fetch(token, request, Some(&cursor)).await {
                Ok(page) => next = page.after,
                Err(reason) => {
                    warn!("Cursor discovery stopped at {}: {}", cursor, reason);
                    truncated_by = Some(FetchError::PageFetch { cursor, reason });
                    break;
                }
            }
        }

        info!(
            "Discovered {} cursors for {} (budget {})",
            cursors.len(),
            request.endpoint(),
            budget
        );
        Ok(Discovery {
            first_page,
            cursors,
            truncated_by,
        })
    }

    async fn fetch(
        &self,
        token: &AccessToken,
        request: &FetchRequest,
        after: Option<&str>,
    ) -> Result<RawPage, String> {
        match timeout(self.page_timeout, self.source.fetch_page(token, request, after)).await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.page_timeout)),
        }
    }
}
