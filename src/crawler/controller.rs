//! Run controller
//!
//! Builds the fetcher and sinks from the configuration, selects the item source
//! for the requested mode, runs the worker pool over it and turns the pool's
//! counters into a final run status. When a relational sink is configured the
//! run is also recorded in its ledger.

use crate::api::auth::provider_from_config;
use crate::api::{build_http_client, load_query, Fetcher, PageCursor, RetryPolicy};
use crate::config::{validate, Config, MAX_PER_PAGE};
use crate::crawler::dispatcher::{DispatchReport, Dispatcher};
use crate::crawler::frontier::{FrontierWalker, SingleItemSource};
use crate::sink::SinkWriter;
use crate::{ConfigError, CrawlError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a run crawls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One media record looked up by id
    SingleItem(i64),
    /// Pages `start..=end`, or from `start` until the API reports the last page
    PageRange { start: u32, end: Option<u32> },
}

/// Immutable description of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSpec {
    mode: RunMode,
}

impl RunSpec {
    pub fn single_item(id: i64) -> Self {
        Self {
            mode: RunMode::SingleItem(id),
        }
    }

    /// Creates a page range run
    ///
    /// # Returns
    ///
    /// * `Ok(RunSpec)` - `start >= 1` and `end`, if any, is not before `start`
    /// * `Err(CrawlError::InvalidRange)` - Otherwise
    pub fn page_range(start: u32, end: Option<u32>) -> Result<Self, CrawlError> {
        let invalid = || {
            CrawlError::InvalidRange(match end {
                Some(end) => format!("{}-{}", start, end),
                None => format!("{}-", start),
            })
        };

        if start == 0 {
            return Err(invalid());
        }
        if let Some(end) = end {
            if end < start {
                return Err(invalid());
            }
        }

        Ok(Self {
            mode: RunMode::PageRange { start, end },
        })
    }

    /// Parses `START`, `START-` or `START-END`
    ///
    /// A bare `START` crawls that page only; `START-` runs until the listing ends.
    pub fn parse_page_range(input: &str) -> Result<Self, CrawlError> {
        let invalid = || CrawlError::InvalidRange(input.to_string());
        let number = |text: &str| -> Result<u32, CrawlError> {
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            text.parse().map_err(|_| invalid())
        };

        let trimmed = input.trim();
        let (start, end) = match trimmed.split_once('-') {
            None => {
                let page = number(trimmed)?;
                (page, Some(page))
            }
            Some((start, "")) => (number(start)?, None),
            Some((start, end)) => (number(start)?, Some(number(end)?)),
        };

        Self::page_range(start, end).map_err(|_| invalid())
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

impl fmt::Display for RunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            RunMode::SingleItem(id) => write!(f, "anime {}", id),
            RunMode::PageRange {
                start,
                end: Some(end),
            } if start == end => write!(f, "page {}", start),
            RunMode::PageRange {
                start,
                end: Some(end),
            } => write!(f, "pages {}-{}", start, end),
            RunMode::PageRange { start, end: None } => write!(f, "pages {}-", start),
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    CompletedWithFailures(u64),
    Aborted(String),
}

impl RunStatus {
    /// Converts the status to its ledger representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithFailures(_) => "completed_with_failures",
            RunStatus::Aborted(_) => "aborted",
        }
    }

    /// Process exit code: 0 on success, 1 when items failed, 2 when aborted
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::CompletedWithFailures(_) => 1,
            RunStatus::Aborted(_) => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithFailures(n) => write!(f, "completed with {} failed items", n),
            RunStatus::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub spec: RunSpec,
    pub status: RunStatus,
    /// Ledger id, when a relational sink recorded the run
    pub run_id: Option<i64>,
    /// Page numbers fetched, in order; empty in single-item mode
    pub pages_fetched: Vec<u32>,
    pub items_written: u64,
    pub items_failed: u64,
    pub failed_ids: Vec<i64>,
    pub peak_busy: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }

    /// Items written per second over the whole run
    pub fn items_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.items_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// Top-level driver wiring the fetcher, frontier, pool and sinks together
pub struct Controller {
    fetcher: Arc<Fetcher>,
    writer: Arc<SinkWriter>,
    workers: usize,
    per_page: u32,
    config_hash: String,
}

impl Controller {
    /// Builds a controller from a validated configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration source, stored in the run ledger
    pub fn new(config: &Config, config_hash: impl Into<String>) -> Result<Self, CrawlError> {
        validate(config)?;
        let client = build_http_client(&config.api)?;
        let query = load_query(config.api.query_path.as_deref())?;
        let policy = RetryPolicy::from_config(&config.crawler);

        let mut fetcher = Fetcher::new(client.clone(), config.api.endpoint.clone(), query, policy);
        if let Some(auth) = &config.auth {
            if let Some(provider) = provider_from_config(auth, &client) {
                fetcher = fetcher.with_token_provider(provider);
            }
        }

        let writer = SinkWriter::from_config(&config.sinks, &client)?;
        tracing::info!(
            "Configured sinks: {}",
            writer
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self::from_parts(
            Arc::new(fetcher),
            writer,
            config.crawler.workers,
            config.api.per_page,
            config_hash,
        ))
    }

    /// Assembles a controller from prebuilt parts
    pub fn from_parts(
        fetcher: Arc<Fetcher>,
        writer: SinkWriter,
        workers: usize,
        per_page: u32,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            writer: Arc::new(writer),
            workers: workers.max(1),
            per_page,
            config_hash: config_hash.into(),
        }
    }

    /// Executes one run to completion
    ///
    /// Never fails: aborts are reported through [`RunStatus::Aborted`].
    pub async fn run(&self, spec: &RunSpec) -> RunReport {
        let started = Instant::now();
        let run_id = self.begin_ledger(spec);
        tracing::info!("Starting run for {}", spec);

        let (dispatch, pages_fetched) = match spec.mode() {
            RunMode::SingleItem(id) => {
                let mut source = SingleItemSource::new(Arc::clone(&self.fetcher), id);
                let dispatcher = Dispatcher::new(Arc::clone(&self.writer), 1);
                (dispatcher.run(&mut source).await, Vec::new())
            }
            RunMode::PageRange { start, end } => match PageCursor::new(start, self.per_page) {
                Some(cursor) => {
                    let mut walker =
                        FrontierWalker::new(Arc::clone(&self.fetcher), cursor, end);
                    let dispatcher = Dispatcher::new(Arc::clone(&self.writer), self.workers);
                    let report = dispatcher.run(&mut walker).await;
                    (report, walker.pages_visited().to_vec())
                }
                None => {
                    let invalid = ConfigError::Validation(format!(
                        "per-page must be between 1 and {}, got {}",
                        MAX_PER_PAGE, self.per_page
                    ));
                    let report = DispatchReport {
                        frontier_error: Some(invalid.into()),
                        ..Default::default()
                    };
                    (report, Vec::new())
                }
            },
        };

        let status = status_of(&dispatch);
        match &status {
            RunStatus::Completed => tracing::info!("Run for {} completed", spec),
            RunStatus::CompletedWithFailures(n) => {
                tracing::warn!("Run for {} completed with {} failed items", spec, n)
            }
            RunStatus::Aborted(reason) => tracing::error!("Run for {} aborted: {}", spec, reason),
        }

        let report = RunReport {
            spec: *spec,
            status,
            run_id,
            pages_fetched,
            items_written: dispatch.items_written,
            items_failed: dispatch.items_failed,
            failed_ids: dispatch.failed_ids,
            peak_busy: dispatch.peak_busy,
            elapsed: started.elapsed(),
        };
        self.finish_ledger(&report);
        report
    }

    fn begin_ledger(&self, spec: &RunSpec) -> Option<i64> {
        let db = self.writer.relational()?;
        match db.begin_run(&spec.to_string(), &self.config_hash) {
            Ok(id) => {
                tracing::debug!("Recorded run {} in the ledger", id);
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Could not record run start: {}", e);
                None
            }
        }
    }

    fn finish_ledger(&self, report: &RunReport) {
        let (Some(db), Some(run_id)) = (self.writer.relational(), report.run_id) else {
            return;
        };

        let detail = match &report.status {
            RunStatus::Aborted(reason) => Some(reason.clone()),
            RunStatus::CompletedWithFailures(_) => Some(
                report
                    .failed_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            RunStatus::Completed => None,
        };

        if let Err(e) = db.finish_run(
            run_id,
            report.status.to_db_string(),
            report.items_written,
            report.items_failed,
            detail.as_deref(),
        ) {
            tracing::warn!("Could not record end of run {}: {}", run_id, e);
        }
    }
}

fn status_of(dispatch: &DispatchReport) -> RunStatus {
    if let Some(e) = &dispatch.frontier_error {
        RunStatus::Aborted(e.to_string())
    } else if dispatch.items_failed > 0 {
        RunStatus::CompletedWithFailures(dispatch.items_failed)
    } else {
        RunStatus::Completed
    }
}

/// Builds a controller from `config` and executes `spec`
///
/// Only setup failures (HTTP client, query file, sinks) are returned as errors.
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    spec: &RunSpec,
) -> Result<RunReport, CrawlError> {
    let controller = Controller::new(config, config_hash)?;
    Ok(controller.run(spec).await)
}
