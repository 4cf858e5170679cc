use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use crate::error::{ForgeWatchError, Result};

const API_ROOT: &str = "/api/v1";

/// Forgejo API client.
///
/// Performs authenticated calls against `{base_url}/api/v1`; all business
/// logic (pagination, filtering, retry-on-skip) lives in the callers.
pub struct ForgejoClient {
    /// HTTP client
    http: reqwest::Client,
    /// Instance base URL, without trailing slash
    base_url: String,
    /// Optional API token
    token: Option<String>,
}

impl ForgejoClient {
    /// Create a new Forgejo API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Forgejo instance URL (e.g., "https://codeberg.org")
    /// * `token` - Optional personal access token
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| ForgeWatchError::Config(format!("Invalid base URL: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("forgewatch/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ForgeWatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Build a client around a pre-configured `reqwest::Client`, so tests can
    /// control timeouts.
    #[cfg(test)]
    fn with_http(http: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Perform a GET call against an API endpoint (path + query, starting
    /// with `/`) and return the parsed JSON body.
    ///
    /// Authentication policy: with a token configured, the first attempt
    /// sends `Authorization: token <t>`. If that attempt dies at the
    /// transport level (the request never reached the server — typically a
    /// cross-origin or proxy setup that strips the header), the same call is
    /// retried once with the token as a query parameter instead. HTTP error
    /// statuses are never retried; they surface as [`ForgeWatchError::Http`].
    pub async fn call(&self, endpoint: &str) -> Result<Value> {
        let url = format!("{}{API_ROOT}{endpoint}", self.base_url);

        let Some(token) = &self.token else {
            return self.request(&url, None).await;
        };

        match self.request(&url, Some(token)).await {
            Err(ForgeWatchError::Network(err)) if is_transport_error(&err) => {
                debug!("header auth failed in transport ({err}), retrying with query token");
                let fallback = format!(
                    "{}{API_ROOT}{}",
                    self.base_url,
                    with_query_token(endpoint, token)
                );
                self.request(&fallback, None).await
            }
            other => other,
        }
    }

    async fn request(&self, url: &str, token: Option<&str>) -> Result<Value> {
        let mut request = self.http.get(url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ForgeWatchError::Http {
                status: status.as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string()),
            });
        }

        Ok(response.json().await?)
    }
}

/// The request never completed: connection, timeout, or request-build
/// failures. HTTP error statuses are not transport errors.
fn is_transport_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Append a percent-encoded `token=` to an endpoint, respecting an existing
/// query string.
fn with_query_token(endpoint: &str, token: &str) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
    format!("{endpoint}{sep}token={encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_token_uses_question_mark_without_existing_query() {
        assert_eq!(
            with_query_token("/orgs/acme/repos", "s3cret"),
            "/orgs/acme/repos?token=s3cret"
        );
    }

    #[test]
    fn test_query_token_uses_ampersand_with_existing_query() {
        assert_eq!(
            with_query_token("/orgs/acme/repos?page=1&limit=50", "s3cret"),
            "/orgs/acme/repos?page=1&limit=50&token=s3cret"
        );
    }

    #[test]
    fn test_query_token_is_percent_encoded() {
        assert_eq!(
            with_query_token("/version", "s3&cret#1"),
            "/version?token=s3%26cret%231"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(ForgejoClient::new("not a url", None).is_err());
    }

    #[test]
    fn test_empty_token_is_treated_as_absent() {
        let client = ForgejoClient::new("https://git.example.com", Some(String::new())).unwrap();
        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn test_call_sends_token_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/version")
            .match_header("authorization", "token s3cret")
            .match_header("accept", "application/json")
            .with_body(r#"{"version":"13.0.0"}"#)
            .create_async()
            .await;

        let client = ForgejoClient::new(&server.url(), Some("s3cret".to_string())).unwrap();
        let value = client.call("/version").await.unwrap();

        assert_eq!(value["version"], "13.0.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_to_query_token() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        // The authorized attempt stalls past the client timeout; only the
        // query-token retry answers in time.
        let slow = server
            .mock("GET", "/api/v1/version")
            .match_header("authorization", "token s3cret")
            .with_chunked_body(|writer| {
                std::thread::sleep(std::time::Duration::from_millis(150));
                writer.write_all(b"{}")
            })
            .create_async()
            .await;
        let fallback = server
            .mock("GET", "/api/v1/version")
            .match_header("authorization", mockito::Matcher::Missing)
            .match_query(mockito::Matcher::UrlEncoded("token".into(), "s3cret".into()))
            .with_body(r#"{"version":"13.0.0"}"#)
            .create_async()
            .await;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(100))
            .build()
            .unwrap();
        let client =
            ForgejoClient::with_http(http, &server.url(), Some("s3cret".to_string()));

        let value = client.call("/version").await.unwrap();

        assert_eq!(value["version"], "13.0.0");
        slow.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/orgs/acme/repos")
            .with_status(403)
            .with_body("forbidden")
            .expect(1)
            .create_async()
            .await;

        let client = ForgejoClient::new(&server.url(), Some("s3cret".to_string())).unwrap();
        let err = client.call("/orgs/acme/repos").await.unwrap_err();

        match err {
            ForgeWatchError::Http { status, .. } => assert_eq!(status, 403),
            other => panic!("expected Http error, got {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anonymous_call_omits_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/version")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_body("{}")
            .create_async()
            .await;

        let client = ForgejoClient::new(&server.url(), None).unwrap();
        client.call("/version").await.unwrap();
        mock.assert_async().await;
    }
}
