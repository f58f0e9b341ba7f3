use scraper_core::{
    ConfigError, CoreError, DatabaseError, ErrorExt, ErrorReporter, FetchError, RedditApiError,
};

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_API");

    let fetch_error = CoreError::Fetch(FetchError::FirstPage {
        reason: "timeout".to_string(),
    });
    assert_eq!(fetch_error.error_code(), "FETCH");

    let db_error = CoreError::Database(DatabaseError::ConnectionFailed {
        reason: "unable to open database file".to_string(),
    });
    assert_eq!(db_error.error_code(), "DATABASE");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "reddit.client_id".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_fetch_error_classification() {
    assert!(FetchError::Auth {
        reason: "401".to_string()
    }
    .is_fatal());
    assert!(FetchError::FirstPage {
        reason: "502".to_string()
    }
    .is_fatal());

    let page_error = FetchError::PageFetch {
        cursor: "t3_abc".to_string(),
        reason: "timed out".to_string(),
    };
    assert!(!page_error.is_fatal());
    assert!(!CoreError::Fetch(page_error).is_fatal());
}

#[test]
fn test_not_found_is_not_fatal() {
    let error = CoreError::NotFound {
        resource: "posts".to_string(),
    };
    assert!(!error.is_fatal());
    assert_eq!(error.user_friendly_message(), "Could not find: posts");
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    let message = reddit_error.user_friendly_message();
    assert!(message.contains("authentication token is invalid"));

    let page_error = CoreError::Fetch(FetchError::PageFetch {
        cursor: "t3_xyz".to_string(),
        reason: "502".to_string(),
    });
    assert!(page_error.user_friendly_message().contains("t3_xyz"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "reddit.client_secret".to_string(),
    });
    assert!(config_error
        .user_friendly_message()
        .contains("reddit.client_secret"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new();
    let fatal = CoreError::Fetch(FetchError::Auth {
        reason: "invalid_client".to_string(),
    });
    let recoverable = CoreError::InvalidInput {
        message: "No search query or subreddit provided".to_string(),
    };
    assert!(fatal.is_fatal());
    assert!(!recoverable.is_fatal());

    // Only checks that reporting doesn't panic
    reporter.report(&fatal);
    reporter.report(&recoverable);
}
