mod service;

use anyhow::Context;
use clap::{Parser, Subcommand};
use database::Database;
use reddit_client::RedditScraper;
use scraper_core::{AppConfig, CoreError, ErrorExt, ErrorReporter};
use serde::Serialize;
use service::PostService;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reddit-scraper")]
#[command(about = "Fetch Reddit listings and keep a searchable local copy")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    InitDb {
        /// Drop existing tables first
        #[arg(long)]
        force: bool,
    },
    /// Fetch hot posts and replace the stored set
    Scrape {
        #[arg(long)]
        subreddit: Option<String>,
        #[arg(long, default_value_t = 3)]
        max_pages: u32,
    },
    /// List stored posts, newest first
    Posts {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
    /// Search stored posts, falling back to a live Reddit search
    Search {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        subreddit: Option<String>,
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("reddit_scraper=info,reddit_client=info,database=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let reporter = ErrorReporter::new();

    let config = AppConfig::load(cli.config.as_deref())
        .inspect_err(|e| reporter.report_error(e))
        .context("failed to load configuration")?;

    let db = Database::connect(&config.database.url)
        .await
        .inspect_err(|e| reporter.report_error(e))
        .context("failed to open database")?;

    let outcome = run(cli.command, db, &config).await;

    match outcome {
        Ok(Some(output)) => {
            println!("{}", output);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            reporter.report(&e);
            Err(anyhow::anyhow!(e.user_friendly_message()))
        }
    }
}

/// Runs one command. Read and fetch commands yield pretty JSON for stdout.
async fn run(
    command: Command,
    db: Database,
    config: &AppConfig,
) -> Result<Option<String>, CoreError> {
    let output = match command {
        Command::InitDb { force } => {
            init_db(&db, force).await?;
            info!("Database initialized at {}", config.database.url);
            return Ok(None);
        }
        Command::Scrape {
            subreddit,
            max_pages,
        } => {
            let service = open_service(db, config, true).await?;
            let summary = service.scrape(subreddit.as_deref(), max_pages).await;
            render(&service, summary).await?
        }
        Command::Posts { page, per_page } => {
            let service = open_service(db, config, false).await?;
            let page = service.posts(page, per_page).await;
            render(&service, page).await?
        }
        Command::Search {
            query,
            subreddit,
            pages,
        } => {
            let service = open_service(db, config, true).await?;
            let result = service
                .search(query.as_deref(), subreddit.as_deref(), pages)
                .await;
            render(&service, result).await?
        }
    };
    Ok(Some(output))
}

async fn init_db(db: &Database, force: bool) -> Result<(), CoreError> {
    let initialized = if force {
        db.reset().await
    } else {
        db.run_migrations().await
    };
    db.close().await;
    initialized
}

/// Applies migrations and wires the Reddit client when the command needs one.
async fn open_service(
    db: Database,
    config: &AppConfig,
    live: bool,
) -> Result<PostService, CoreError> {
    db.run_migrations().await?;
    let scraper = if live {
        Some(RedditScraper::from_config(config)?)
    } else {
        None
    };
    Ok(PostService::new(db, scraper, config.fetch.max_search_pages))
}

async fn render<T: Serialize>(
    service: &PostService,
    result: Result<T, CoreError>,
) -> Result<String, CoreError> {
    if let Some(metrics) = service.api_metrics().await {
        info!(
            "Reddit API: {} requests, {} failed, {} timed out, avg {:?}",
            metrics.total_requests,
            metrics.failed_requests,
            metrics.timed_out_requests,
            metrics.average_response_time()
        );
        for (endpoint, endpoint_metrics) in &metrics.requests_by_endpoint {
            debug!(
                "{}: {} requests, {:.0}% ok, avg {:?}",
                endpoint,
                endpoint_metrics.request_count,
                endpoint_metrics.success_rate() * 100.0,
                endpoint_metrics.average_response_time()
            );
        }
    }
    Ok(serde_json::to_string_pretty(&result?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_database() -> (Database, AppConfig) {
        let db_path = std::env::temp_dir().join(format!(
            "test_reddit_scraper_cli_{}.db",
            uuid::Uuid::new_v4()
        ));
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", db_path.display());
        let db = Database::connect(&config.database.url).await.unwrap();
        (db, config)
    }

    #[tokio::test]
    async fn test_init_db_prints_nothing() {
        let (db, config) = temp_database().await;

        let output = run(Command::InitDb { force: true }, db, &config).await.unwrap();
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn test_posts_on_fresh_database_is_not_found() {
        let (db, config) = temp_database().await;

        let result = run(
            Command::Posts {
                page: 1,
                per_page: 20,
            },
            db,
            &config,
        )
        .await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_live_command_without_credentials_is_config_error() {
        let (db, config) = temp_database().await;

        let result = run(
            Command::Scrape {
                subreddit: Some("rust".to_string()),
                max_pages: 1,
            },
            db,
            &config,
        )
        .await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
