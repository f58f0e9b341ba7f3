//! Application-only OAuth2: trades the client id and secret for a bearer
//! token using the client-credentials grant.

use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AccessToken, AuthUrl, Client as OAuthClient, ClientId, ClientSecret, HttpRequest,
    HttpResponse, RefreshToken, Scope, StandardRevocableToken, TokenResponse, TokenUrl,
};
use reqwest::Client;
use scraper_core::{ConfigError, CoreError, FetchError, RedditConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

/// Token endpoint body. Only `access_token` is required; Reddit adds
/// `token_type`, `expires_in` and `scope`, other servers may not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditTokenResponse {
    access_token: AccessToken,
    #[serde(skip, default = "bearer")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

impl TokenResponse<BasicTokenType> for RedditTokenResponse {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        None
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

type RedditOAuthClient = OAuthClient<
    BasicErrorResponse,
    RedditTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Anything able to hand out a bearer token for one fetch.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, CoreError>;
}

#[derive(Debug, Clone)]
pub struct OAuthTokenProvider {
    oauth_client: RedditOAuthClient,
    http_client: Client,
}

impl OAuthTokenProvider {
    pub fn new(config: &RedditConfig, http_client: Client) -> Result<Self, CoreError> {
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| ConfigError::MissingField {
                field: "reddit.client_id".to_string(),
            })?;
        let client_secret =
            config
                .client_secret
                .clone()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "reddit.client_secret".to_string(),
                })?;

        let auth_url = AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "authorize_url".to_string(),
                value: e.to_string(),
            }
        })?;
        let token_url =
            TokenUrl::new(config.token_url.clone()).map_err(|_| ConfigError::InvalidValue {
                field: "reddit.token_url".to_string(),
                value: config.token_url.clone(),
            })?;

        // Client credentials go out as HTTP basic auth.
        let oauth_client = RedditOAuthClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            oauth_client,
            http_client,
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenProvider {
    /// One attempt, no retry: a rejected credential stays rejected.
    async fn access_token(&self) -> Result<AccessToken, CoreError> {
        debug!("Requesting application access token");
        let http_client = self.http_client.clone();

        let token = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(move |request| send_token_request(http_client, request))
            .await
            .map_err(|e| {
                error!("Access token exchange failed: {}", e);
                FetchError::Auth {
                    reason: e.to_string(),
                }
            })?;

        info!(
            "Obtained application access token (expires in {:?})",
            token.expires_in()
        );
        Ok(token.access_token().clone())
    }
}

/// Sends the token request through the shared client so the configured
/// User-Agent is applied; Reddit rejects anonymous agents.
async fn send_token_request(
    client: Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one HTTP request with `body` and hands back the raw request.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!(
            "http://{}/api/v1/access_token",
            listener.local_addr().unwrap()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).to_string()
        });

        (url, handle)
    }

    fn credentials() -> RedditConfig {
        RedditConfig {
            client_id: Some("test_client_id".to_string()),
            client_secret: Some("test_client_secret".to_string()),
            ..RedditConfig::default()
        }
    }

    #[test]
    fn test_provider_creation() {
        let provider = OAuthTokenProvider::new(&credentials(), Client::new());
        assert!(provider.is_ok());
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let config = RedditConfig {
            client_secret: None,
            ..credentials()
        };

        let result = OAuthTokenProvider::new(&config, Client::new());
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::MissingField { field })) if field == "reddit.client_secret"
        ));
    }

    #[test]
    fn test_invalid_token_url() {
        let config = RedditConfig {
            token_url: "not a url".to_string(),
            ..credentials()
        };

        let result = OAuthTokenProvider::new(&config, Client::new());
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_unreachable_token_endpoint_is_auth_error() {
        let config = RedditConfig {
            token_url: "http://127.0.0.1:9/api/v1/access_token".to_string(),
            ..credentials()
        };
        let provider = OAuthTokenProvider::new(&config, Client::new()).unwrap();

        let result = tokio_test::block_on(provider.access_token());
        assert!(matches!(
            result,
            Err(CoreError::Fetch(FetchError::Auth { .. }))
        ));
    }

    #[tokio::test]
    async fn test_token_body_with_only_access_token() {
        let (token_url, server) = serve_once(r#"{"access_token":"abc"}"#).await;
        let config = RedditConfig {
            token_url,
            ..credentials()
        };
        let provider = OAuthTokenProvider::new(&config, Client::new()).unwrap();

        let token = provider.access_token().await.unwrap();
        assert_eq!(token.secret(), "abc");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/access_token"));
        assert!(request.contains("grant_type=client_credentials"));
        assert!(request.to_ascii_lowercase().contains("authorization: basic"));
    }

    #[tokio::test]
    async fn test_full_reddit_token_body() {
        let (token_url, server) = serve_once(
            r#"{"access_token":"xyz","token_type":"bearer","expires_in":86400,"scope":"*"}"#,
        )
        .await;
        let config = RedditConfig {
            token_url,
            ..credentials()
        };
        let provider = OAuthTokenProvider::new(&config, Client::new()).unwrap();

        let token = provider.access_token().await.unwrap();
        assert_eq!(token.secret(), "xyz");
        server.await.unwrap();
    }
}
