use scraper_core::{CoreError, DatabaseError, RedditPost};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};


pub const MAX_PER_PAGE: u32 = 100;

const POST_COLUMNS: &str =
    "title, url, author, subreddit, score, num_comments, created_utc, selftext";

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    title: String,
    url: String,
    author: String,
    subreddit: String,
    score: i64,
    num_comments: i64,
    created_utc: f64,
    selftext: String,
}

impl From<PostRow> for RedditPost {
    fn from(row: PostRow) -> Self {
        Self {
            title: row.title,
            url: row.url,
            author: row.author,
            subreddit: row.subreddit,
            score: row.score,
            num_comments: row.num_comments,
            created_utc: row.created_utc,
            selftext: row.selftext,
        }
    }
}

/// One page of stored posts, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<RedditPost>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}

/// Optional narrowing of a stored-post read. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Case-insensitive substring of the title or self text.
    pub query: Option<String>,
    /// Case-insensitive exact subreddit name.
    pub subreddit: Option<String>,
}

impl PostFilter {
    pub fn new(query: Option<&str>, subreddit: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            query: clean(query),
            subreddit: clean(subreddit),
        }
    }

    fn push_conditions<'a>(&'a self, builder: &mut QueryBuilder<'a, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        if let Some(query) = &self.query {
            let pattern = like_pattern(query);
            builder
                .push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR selftext LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(subreddit) = &self.subreddit {
            builder
                .push(" AND subreddit = ")
                .push_bind(subreddit.as_str())
                .push(" COLLATE NOCASE");
        }
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database at `connection_string`.
    pub async fn connect(connection_string: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", connection_string);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Drops every table and recreates the schema from scratch.
    pub async fn reset(&self) -> Result<(), CoreError> {
        sqlx::query("DROP TABLE IF EXISTS posts")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
            .execute(&self.pool)
            .await?;
        info!("Dropped existing tables");
        self.run_migrations().await
    }

    /// Replaces the stored posts with `posts` atomically.
    pub async fn replace_posts(&self, posts: &[RedditPost]) -> Result<u64, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })?;

        let removed = sqlx::query("DELETE FROM posts")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let insert = format!(
            "INSERT INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            POST_COLUMNS
        );
        for post in posts {
            sqlx::query(&insert)
                .bind(post.title.as_str())
                .bind(post.url.as_str())
                .bind(post.author.as_str())
                .bind(post.subreddit.as_str())
                .bind(post.score)
                .bind(post.num_comments)
                .bind(post.created_utc)
                .bind(post.selftext.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed {
                reason: e.to_string(),
            })?;

        info!("Replaced {} stored posts with {}", removed, posts.len());
        Ok(posts.len() as u64)
    }

    pub async fn get_posts(&self, page: u32, per_page: u32) -> Result<PostPage, CoreError> {
        self.search_posts(&PostFilter::default(), page, per_page)
            .await
    }

    pub async fn search_posts(
        &self,
        filter: &PostFilter,
        page: u32,
        per_page: u32,
    ) -> Result<PostPage, CoreError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let offset = (page as i64 - 1) * per_page as i64;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        filter.push_conditions(&mut count);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts", POST_COLUMNS));
        filter.push_conditions(&mut select);
        select
            .push(" ORDER BY created_utc DESC, id ASC LIMIT ")
            .push_bind(per_page as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<PostRow> = select.build_query_as().fetch_all(&self.pool).await?;
        debug!(
            "Read {} of {} stored posts (page {}, filter {:?})",
            rows.len(),
            total,
            page,
            filter
        );

        Ok(PostPage {
            posts: rows.into_iter().map(RedditPost::from).collect(),
            total,
            pages: (total + per_page as i64 - 1) / per_page as i64,
            current_page: page as i64,
        })
    }

    pub async fn count_posts(&self) -> Result<i64, CoreError> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
