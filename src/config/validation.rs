use crate::config::types::{
    ApiConfig, AuthConfig, Config, CrawlerConfig, SearchSinkConfig, SinksConfig, SqliteSinkConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest page size the API accepts
pub const MAX_PER_PAGE: u32 = 50;

/// Upper bound on the worker pool
pub const MAX_WORKERS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    if let Some(auth) = &config.auth {
        validate_auth_config(auth)?;
    }
    validate_sinks_config(&config.sinks)?;
    Ok(())
}

/// Validates remote API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_http_url("endpoint", &config.endpoint)?;

    if config.per_page < 1 || config.per_page > MAX_PER_PAGE {
        return Err(ConfigError::Validation(format!(
            "per-page must be between 1 and {}, got {}",
            MAX_PER_PAGE, config.per_page
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// Validates that credentials are either a static token or a full client-credentials set
fn validate_auth_config(config: &AuthConfig) -> Result<(), ConfigError> {
    let has_client = config.token_url.is_some()
        || config.client_id.is_some()
        || config.client_secret.is_some();

    match (&config.token, has_client) {
        (Some(_), true) => Err(ConfigError::Validation(
            "auth: use either token or token-url/client-id/client-secret, not both".to_string(),
        )),
        (Some(token), false) if token.trim().is_empty() => Err(ConfigError::Validation(
            "auth: token cannot be empty".to_string(),
        )),
        (Some(_), false) => Ok(()),
        (None, true) => {
            let token_url = config.token_url.as_deref().ok_or_else(|| {
                ConfigError::Validation("auth: token-url is required".to_string())
            })?;
            validate_http_url("token-url", token_url)?;
            if config.client_id.is_none() || config.client_secret.is_none() {
                return Err(ConfigError::Validation(
                    "auth: client-id and client-secret are both required".to_string(),
                ));
            }
            Ok(())
        }
        (None, false) => Err(ConfigError::Validation(
            "auth section is present but empty".to_string(),
        )),
    }
}

/// Validates sink configuration
fn validate_sinks_config(config: &SinksConfig) -> Result<(), ConfigError> {
    if config.is_empty() {
        return Err(ConfigError::Validation(
            "at least one sink must be configured".to_string(),
        ));
    }

    if let Some(sqlite) = &config.sqlite {
        validate_sqlite_config(sqlite)?;
    }

    if let Some(search) = &config.search {
        validate_search_config(search)?;
    }

    if let Some(fs) = &config.filesystem {
        if fs.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output-dir cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_sqlite_config(config: &SqliteSinkConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    validate_identifier(&config.table)?;
    if let Some(view) = &config.merge_view {
        validate_identifier(view)?;
    }

    Ok(())
}

fn validate_search_config(config: &SearchSinkConfig) -> Result<(), ConfigError> {
    validate_http_url("search endpoint", &config.endpoint)?;

    for (name, segment) in [("index", &config.index), ("doc-type", &config.doc_type)] {
        if segment.is_empty() || segment.contains('/') {
            return Err(ConfigError::Validation(format!(
                "search {} must be a non-empty path segment, got '{}'",
                name, segment
            )));
        }
    }

    Ok(())
}

/// Table and view names are interpolated into SQL, so only plain identifiers are accepted
fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidIdentifier(name.to_string()));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", field, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
