use scraper_core::RedditPost;
use serde_json::Value;

/// Maps one raw listing entry to a [`RedditPost`].
///
/// Missing or mistyped fields fall back to `""` / `0`; this never fails.
pub fn normalize_entry(entry: &Value) -> RedditPost {
    RedditPost {
        title: string_field(entry, "title"),
        url: string_field(entry, "url"),
        author: string_field(entry, "author"),
        subreddit: string_field(entry, "subreddit"),
        score: integer_field(entry, "score"),
        num_comments: integer_field(entry, "num_comments"),
        created_utc: entry
            .get("created_utc")
            .and_then(Value::as_f64)
            .unwrap_or_default(),
        selftext: string_field(entry, "selftext"),
    }
}

pub fn normalize_entries(entries: &[Value]) -> Vec<RedditPost> {
    entries.iter().map(normalize_entry).collect()
}

fn string_field(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// Reddit occasionally serialises counters as floats.
fn integer_field(entry: &Value, key: &str) -> i64 {
    match entry.get(key) {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        None => 0,
    }
}
