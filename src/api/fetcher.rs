//! GraphQL fetcher
//!
//! This module handles all requests to the remote API, including:
//! - Building the HTTP client with a proper user agent
//! - Classifying each response into a [`FetchOutcome`]
//! - Driving the retry loop from [`RetryPolicy`]
//!
//! # Classification
//!
//! | Response | Outcome |
//! |----------|---------|
//! | HTTP 200 with non-null `data` | Success |
//! | HTTP 200 with only `errors` | ClientError(200) |
//! | HTTP 200 with an unreadable body | ServerError(200) |
//! | HTTP 429 | RateLimited(retry-after, default 1s) |
//! | HTTP 5xx | ServerError |
//! | Connection failure or timeout | ServerError(0) |
//! | Anything else | ClientError |

use crate::api::auth::TokenProvider;
use crate::api::request::{GraphQlRequest, Variables};
use crate::api::retry::RetryPolicy;
use crate::config::ApiConfig;
use crate::CrawlError;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of one request attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The `data` payload of a successful response
    Success(Value),
    /// HTTP 429; seconds to wait before retrying
    RateLimited(u64),
    /// HTTP 5xx, or 0 when the request never got a response
    ServerError(u16),
    /// The request itself was rejected
    ClientError(u16),
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => write!(f, "success"),
            Self::RateLimited(secs) => write!(f, "rate limited (retry after {}s)", secs),
            Self::ServerError(0) => write!(f, "transport error"),
            Self::ServerError(code) => write!(f, "server error (HTTP {})", code),
            Self::ClientError(code) => write!(f, "client error (HTTP {})", code),
        }
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
}

/// Classifies a raw HTTP response
///
/// # Arguments
///
/// * `status` - The HTTP status code
/// * `retry_after` - Value of the `retry-after` header, if any
/// * `body` - The response body
/// * `default_retry_after` - Hint used when a 429 has no usable header
pub fn classify_response(
    status: StatusCode,
    retry_after: Option<&str>,
    body: &[u8],
    default_retry_after: Duration,
) -> FetchOutcome {
    if status == StatusCode::OK {
        return match serde_json::from_slice::<GraphQlResponse>(body) {
            Ok(GraphQlResponse {
                data: Some(data), ..
            }) if !data.is_null() => FetchOutcome::Success(data),
            Ok(_) => FetchOutcome::ClientError(status.as_u16()),
            Err(_) => FetchOutcome::ServerError(status.as_u16()),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let secs = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| default_retry_after.as_secs().max(1));
        return FetchOutcome::RateLimited(secs);
    }

    if status.is_server_error() {
        return FetchOutcome::ServerError(status.as_u16());
    }

    FetchOutcome::ClientError(status.as_u16())
}

/// Builds an HTTP client for the API
///
/// # Example
///
/// ```no_run
/// use anilist_crawler::api::build_http_client;
/// use anilist_crawler::config::ApiConfig;
///
/// let client = build_http_client(&ApiConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issues GraphQL requests against one endpoint with one query
pub struct Fetcher {
    client: Client,
    endpoint: String,
    query: String,
    policy: RetryPolicy,
    auth: Option<Arc<dyn TokenProvider>>,
}

impl Fetcher {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        query: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            query: query.into(),
            policy,
            auth: None,
        }
    }

    /// Attaches a bearer token provider consulted before every request
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    /// Makes exactly one attempt
    ///
    /// Only credential failures are returned as errors; everything the API or the
    /// network does is folded into the outcome.
    pub async fn fetch(&self, variables: &Variables) -> Result<FetchOutcome, CrawlError> {
        let body = GraphQlRequest {
            query: &self.query,
            variables,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(&body);

        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.token().await?);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Request for {} failed: {}", variables, e);
                return Ok(FetchOutcome::ServerError(0));
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Reading response for {} failed: {}", variables, e);
                return Ok(FetchOutcome::ServerError(0));
            }
        };

        let outcome = classify_response(
            status,
            retry_after.as_deref(),
            &bytes,
            self.policy.default_retry_after,
        );

        if let FetchOutcome::ClientError(code) = outcome {
            let text = String::from_utf8_lossy(&bytes);
            let snippet: String = text.chars().take(500).collect();
            tracing::warn!("Request for {} rejected (HTTP {}): {}", variables, code, snippet);
        }

        Ok(outcome)
    }

    /// Fetches the `data` payload, retrying transient failures
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The `data` object of a successful response
    /// * `Err(CrawlError::ClientError)` - The request was rejected, not retried
    /// * `Err(CrawlError::RetriesExhausted)` - Every attempt hit a transient failure
    pub async fn fetch_data(&self, variables: &Variables) -> Result<Value, CrawlError> {
        let mut attempt = 1;

        loop {
            let outcome = self.fetch(variables).await?;
            let decision = self.policy.decide(&outcome, attempt);

            if decision.retry {
                match &outcome {
                    FetchOutcome::RateLimited(secs) => {
                        tracing::info!("Rate limit reached, retry after {} seconds", secs)
                    }
                    other => tracing::warn!(
                        "{} for {}, retry after {:?} (attempt {}/{})",
                        other,
                        variables,
                        decision.delay,
                        attempt,
                        self.policy.max_attempts
                    ),
                }
                tokio::time::sleep(decision.delay).await;
                attempt += 1;
                continue;
            }

            return match outcome {
                FetchOutcome::Success(data) => Ok(data),
                FetchOutcome::ClientError(status) => Err(CrawlError::ClientError { status }),
                last => Err(CrawlError::RetriesExhausted {
                    attempts: attempt,
                    last: last.to_string(),
                }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::StaticToken;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher(uri: &str) -> Fetcher {
        let policy = RetryPolicy {
            max_attempts: 3,
            server_error_delay: Duration::ZERO,
            default_retry_after: Duration::from_secs(1),
        };
        Fetcher::new(Client::new(), uri, "query { Page { media { id } } }", policy)
    }

    #[test]
    fn test_classify_success() {
        let body = br#"{"data":{"Page":{"media":[]}}}"#;
        let outcome = classify_response(StatusCode::OK, None, body, Duration::from_secs(1));
        assert_eq!(outcome, FetchOutcome::Success(json!({ "Page": { "media": [] } })));
    }

    #[test]
    fn test_classify_graphql_errors_only() {
        let body = br#"{"data":null,"errors":[{"message":"Invalid query"}]}"#;
        let outcome = classify_response(StatusCode::OK, None, body, Duration::from_secs(1));
        assert_eq!(outcome, FetchOutcome::ClientError(200));
    }

    #[test]
    fn test_classify_unreadable_body() {
        let outcome = classify_response(StatusCode::OK, None, b"<html>", Duration::from_secs(1));
        assert_eq!(outcome, FetchOutcome::ServerError(200));
    }

    #[test]
    fn test_classify_rate_limited() {
        let default = Duration::from_secs(1);
        let status = StatusCode::TOO_MANY_REQUESTS;
        assert_eq!(classify_response(status, Some("2"), b"", default), FetchOutcome::RateLimited(2));
        assert_eq!(classify_response(status, None, b"", default), FetchOutcome::RateLimited(1));
        assert_eq!(classify_response(status, Some("soon"), b"", default), FetchOutcome::RateLimited(1));
        assert_eq!(classify_response(status, Some("0"), b"", default), FetchOutcome::RateLimited(1));
    }

    #[test]
    fn test_classify_status_codes() {
        let default = Duration::from_secs(1);
        assert_eq!(
            classify_response(StatusCode::BAD_GATEWAY, None, b"", default),
            FetchOutcome::ServerError(502)
        );
        assert_eq!(
            classify_response(StatusCode::BAD_REQUEST, None, b"", default),
            FetchOutcome::ClientError(400)
        );
        assert_eq!(
            classify_response(StatusCode::NOT_FOUND, None, b"", default),
            FetchOutcome::ClientError(404)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "ok": true } })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(&server.uri());
        let start = Instant::now();
        let data = fetcher.fetch_data(&Variables::item(1)).await.unwrap();

        assert_eq!(data, json!({ "ok": true }));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(&server.uri());
        let result = fetcher.fetch_data(&Variables::item(1)).await;
        assert!(matches!(result, Err(CrawlError::ClientError { status: 400 })));
    }

    #[tokio::test]
    async fn test_graphql_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "data": null, "errors": [{ "message": "Not Found.", "status": 404 }] }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(&server.uri());
        let result = fetcher.fetch_data(&Variables::item(999_999)).await;
        assert!(matches!(result, Err(CrawlError::ClientError { status: 200 })));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(&server.uri());
        match fetcher.fetch_data(&Variables::item(1)).await {
            Err(CrawlError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("503"));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_carries_variables_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_partial_json(json!({ "variables": { "page": 2, "perPage": 50 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(&server.uri())
            .with_token_provider(Arc::new(StaticToken::new("secret-token")));
        let cursor = crate::api::PageCursor::new(2, 50).unwrap();
        fetcher.fetch_data(&Variables::page(cursor)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Nothing listens on port 9 locally; every attempt fails to connect
        let fetcher = test_fetcher("http://127.0.0.1:9/");
        let outcome = fetcher.fetch(&Variables::item(1)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::ServerError(0));
    }
}
