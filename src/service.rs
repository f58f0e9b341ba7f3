use chrono::Local;
use database::{Database, PostFilter, PostPage, MAX_PER_PAGE};
use reddit_client::metrics::ApiMetrics;
use reddit_client::RedditScraper;
use scraper_core::{is_valid_subreddit, ConfigError, CoreError, RedditPost};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSource {
    Store,
    Live,
}

#[derive(Debug, Serialize)]
pub struct ScrapeSummary {
    pub stored: u64,
    pub last_updated: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub posts: Vec<RedditPost>,
    pub source: PostSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Store-backed reads with a live Reddit fetch behind them.
pub struct PostService {
    db: Database,
    scraper: Option<RedditScraper>,
    max_search_pages: u32,
}

impl PostService {
    pub fn new(db: Database, scraper: Option<RedditScraper>, max_search_pages: u32) -> Self {
        Self {
            db,
            scraper,
            max_search_pages: max_search_pages.max(1),
        }
    }

    fn scraper(&self) -> Result<&RedditScraper, CoreError> {
        self.scraper.as_ref().ok_or_else(|| {
            ConfigError::MissingField {
                field: "reddit.client_id".to_string(),
            }
            .into()
        })
    }

    /// Fetches live posts and replaces the stored set with them.
    pub async fn scrape(
        &self,
        subreddit: Option<&str>,
        max_pages: u32,
    ) -> Result<ScrapeSummary, CoreError> {
        debug!(
            "Scraping subreddit {:?} with max_pages {}",
            subreddit, max_pages
        );
        check_subreddit(subreddit)?;
        let posts = self.scraper()?.fetch(max_pages, subreddit, None).await;
        if posts.is_empty() {
            warn!("Scrape returned no posts");
            return Err(CoreError::NotFound {
                resource: "posts".to_string(),
            });
        }

        let stored = self.db.replace_posts(&posts).await?;
        Ok(ScrapeSummary {
            stored,
            last_updated: timestamp(),
        })
    }

    pub async fn posts(&self, page: u32, per_page: u32) -> Result<PostPage, CoreError> {
        let page = self.db.get_posts(page, per_page).await?;
        if page.posts.is_empty() {
            return Err(CoreError::NotFound {
                resource: "posts".to_string(),
            });
        }
        Ok(page)
    }

    /// Serves matching stored posts, scraping Reddit only when the store has
    /// none.
    pub async fn search(
        &self,
        query: Option<&str>,
        subreddit: Option<&str>,
        pages: u32,
    ) -> Result<SearchResult, CoreError> {
        let filter = PostFilter::new(query, subreddit);
        if filter.query.is_none() && filter.subreddit.is_none() {
            return Err(CoreError::InvalidInput {
                message: "No search query or subreddit provided".to_string(),
            });
        }
        check_subreddit(filter.subreddit.as_deref())?;

        let stored = self.db.search_posts(&filter, 1, MAX_PER_PAGE).await?;
        if !stored.posts.is_empty() {
            info!("Serving {} stored posts for {:?}", stored.total, filter);
            return Ok(SearchResult {
                posts: stored.posts,
                source: PostSource::Store,
                last_updated: None,
                message: None,
            });
        }

        let pages = pages.clamp(1, self.max_search_pages);
        info!("No stored match for {:?}, fetching {} live pages", filter, pages);
        let posts = self
            .scraper()?
            .fetch(
                pages,
                filter.subreddit.as_deref(),
                filter.query.as_deref(),
            )
            .await;

        if posts.is_empty() {
            return Ok(SearchResult {
                posts,
                source: PostSource::Live,
                last_updated: None,
                message: Some("No posts found".to_string()),
            });
        }

        self.db.replace_posts(&posts).await?;
        Ok(SearchResult {
            posts,
            source: PostSource::Live,
            last_updated: Some(timestamp()),
            message: None,
        })
    }

    pub async fn api_metrics(&self) -> Option<ApiMetrics> {
        match &self.scraper {
            Some(scraper) => scraper.api_metrics().await,
            None => None,
        }
    }
}

fn check_subreddit(subreddit: Option<&str>) -> Result<(), CoreError> {
    match subreddit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) if !is_valid_subreddit(name) => Err(CoreError::InvalidInput {
            message: format!("Invalid subreddit name: {:?}", name),
        }),
        _ => Ok(()),
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
