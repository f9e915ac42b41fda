//! Remote API access
//!
//! This module contains everything that talks to the GraphQL endpoint:
//! - Request shapes and the built-in media query
//! - Response classification and the retry loop
//! - Response parsing into opaque [`Item`]s
//! - Bearer token providers

pub mod auth;
mod fetcher;
mod query;
mod request;
mod response;
pub mod retry;

pub use auth::{AuthError, ClientCredentials, StaticToken, TokenProvider};
pub use fetcher::{build_http_client, classify_response, FetchOutcome, Fetcher};
pub use query::{load_query, DEFAULT_QUERY};
pub use request::{GraphQlRequest, PageCursor, Variables};
pub use response::{parse_media_page, Item, MediaPage, PageInfo};
pub use retry::{RetryDecision, RetryPolicy};
