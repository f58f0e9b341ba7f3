use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Listings are always requested at the API's maximum page size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Upper bound on pages per fetch. Reddit stops handing out cursors long
/// before this.
pub const MAX_PAGES: u32 = 100;

const MAX_SUBREDDIT_LEN: usize = 21;

/// One normalized post. Every field has a concrete value; absent upstream
/// data becomes an empty string or zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub title: String,
    pub url: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: f64,
    pub selftext: String,
}

/// What to fetch: a hot listing or a search, either global or scoped to one
/// subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    subreddit: Option<String>,
    query: Option<String>,
    max_pages: u32,
    page_size: u32,
}

impl FetchRequest {
    pub fn new(max_pages: u32, subreddit: Option<&str>, query: Option<&str>) -> Self {
        Self {
            subreddit: non_blank(subreddit),
            query: non_blank(query),
            max_pages: max_pages.clamp(1, MAX_PAGES),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn subreddit(&self) -> Option<&str> {
        self.subreddit.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn is_search(&self) -> bool {
        self.query.is_some()
    }

    /// Number of cursors worth discovering after the first page.
    pub fn cursor_budget(&self) -> usize {
        (self.max_pages - 1) as usize
    }

    /// Rejects subreddit names that could not be a single path segment.
    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.subreddit {
            Some(subreddit) if !is_valid_subreddit(subreddit) => Err(CoreError::InvalidInput {
                message: format!("Invalid subreddit name: {:?}", subreddit),
            }),
            _ => Ok(()),
        }
    }

    /// API path relative to the listing host.
    pub fn endpoint(&self) -> String {
        let action = if self.is_search() { "search" } else { "hot" };
        match &self.subreddit {
            Some(subreddit) => format!("/r/{}/{}", subreddit, action),
            None => format!("/{}", action),
        }
    }

    /// Query parameters shared by every page of this request; the cursor is
    /// added per page by the caller.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.page_size.to_string())];
        if let Some(query) = &self.query {
            params.push(("q", query.clone()));
            if self.subreddit.is_some() {
                params.push(("restrict_sr", "1".to_string()));
            }
            params.push(("sort", "new".to_string()));
        }
        params
    }
}

/// Subreddit names are 1 to 21 ASCII letters, digits or underscores.
pub fn is_valid_subreddit(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SUBREDDIT_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        assert_eq!(FetchRequest::new(1, None, None).endpoint(), "/hot");
        assert_eq!(FetchRequest::new(1, Some("rust"), None).endpoint(), "/r/rust/hot");
        assert_eq!(FetchRequest::new(1, None, Some("tokio")).endpoint(), "/search");
        assert_eq!(
            FetchRequest::new(1, Some("rust"), Some("tokio")).endpoint(),
            "/r/rust/search"
        );
    }

    #[test]
    fn test_scoped_search_params() {
        let params = FetchRequest::new(2, Some("rust"), Some("async")).query_params();
        assert_eq!(
            params,
            vec![
                ("limit", "100".to_string()),
                ("q", "async".to_string()),
                ("restrict_sr", "1".to_string()),
                ("sort", "new".to_string()),
            ]
        );
    }

    #[test]
    fn test_listing_params_only_carry_limit() {
        let params = FetchRequest::new(2, Some("rust"), None)
            .with_page_size(25)
            .query_params();
        assert_eq!(params, vec![("limit", "25".to_string())]);
    }

    #[test]
    fn test_blank_inputs_are_absent() {
        let request = FetchRequest::new(0, Some("  "), Some(""));
        assert_eq!(request.subreddit(), None);
        assert_eq!(request.query(), None);
        assert_eq!(request.max_pages(), 1);
        assert_eq!(request.cursor_budget(), 0);
    }

    #[test]
    fn test_max_pages_is_capped() {
        let request = FetchRequest::new(u32::MAX, Some("rust"), None);
        assert_eq!(request.max_pages(), MAX_PAGES);
        assert_eq!(request.cursor_budget(), (MAX_PAGES - 1) as usize);
    }

    #[test]
    fn test_subreddit_validation() {
        assert!(FetchRequest::new(1, Some("rust"), None).validate().is_ok());
        assert!(FetchRequest::new(1, Some("Ask_Reddit2"), None).validate().is_ok());
        assert!(FetchRequest::new(1, None, Some("any ? query")).validate().is_ok());

        let too_long = "x".repeat(22);
        for bad in ["rust?x=1", "../foo", "..", "a/b", "rust#top", "a%2Fb", too_long.as_str()] {
            assert!(
                matches!(
                    FetchRequest::new(1, Some(bad), None).validate(),
                    Err(CoreError::InvalidInput { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
    }
}
