use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://graphql.anilist.co/";

/// Default directory for the filesystem sink
pub const DEFAULT_OUTPUT_DIR: &str = "anilist_anime";

/// Main configuration structure for the crawler
///
/// Every section is optional. A missing `[sinks]` section enables only the
/// filesystem sink, writing into [`DEFAULT_OUTPUT_DIR`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub sinks: SinksConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiConfig {
    /// GraphQL endpoint receiving the POSTed queries
    pub endpoint: String,

    /// Number of media records requested per page
    pub per_page: u32,

    /// Optional file holding the query text; the built-in query is used otherwise
    pub query_path: Option<PathBuf>,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            per_page: 50,
            query_path: None,
            timeout_secs: 30,
            user_agent: format!("anilist-crawler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent sink workers
    pub workers: usize,

    /// Maximum attempts per API request, including the first one
    pub max_attempts: u32,

    /// Delay before retrying after a server error (seconds)
    pub server_error_delay_secs: u64,

    /// Delay used when a 429 response carries no usable retry-after header (seconds)
    pub default_retry_after_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: crate::crawler::DEFAULT_POOL_SIZE,
            max_attempts: 5,
            server_error_delay_secs: 5,
            default_retry_after_secs: 1,
        }
    }
}

/// Credentials for APIs that require a bearer token
///
/// Either a static `token`, or a client-credentials triple
/// (`token-url`, `client-id`, `client-secret`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    pub token: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Sink selection; each sink is independently optional
#[derive(Debug, Clone, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteSinkConfig>,
    #[serde(default)]
    pub search: Option<SearchSinkConfig>,
    #[serde(default)]
    pub filesystem: Option<FilesystemSinkConfig>,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            sqlite: None,
            search: None,
            filesystem: Some(FilesystemSinkConfig::default()),
        }
    }
}

impl SinksConfig {
    pub fn is_empty(&self) -> bool {
        self.sqlite.is_none() && self.search.is_none() && self.filesystem.is_none()
    }
}

/// Relational store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SqliteSinkConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Table holding one JSON document per media id
    #[serde(default = "default_table")]
    pub table: String,

    /// View whose `json` column, keyed by id, replaces the document sent to the search index
    #[serde(default)]
    pub merge_view: Option<String>,
}

fn default_table() -> String {
    "anime".to_string()
}

/// Search index settings (Elasticsearch-style `PUT {index}/{type}/{id}`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchSinkConfig {
    pub endpoint: String,
    pub index: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
}

fn default_doc_type() -> String {
    "anime".to_string()
}

/// Filesystem sink settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilesystemSinkConfig {
    pub output_dir: PathBuf,
}

impl Default for FilesystemSinkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
