pub mod api;
pub mod auth;
pub mod fanout;
pub mod metrics;
pub mod normalize;
pub mod scraper;
pub mod walker;


pub use api::{PageSource, RawPage, RedditApiClient};
pub use auth::{OAuthTokenProvider, TokenSource};
pub use normalize::normalize_entry;
pub use oauth2::AccessToken;
pub use scraper::{FetchReport, RedditScraper};
