//! Crawl orchestration
//!
//! This module contains the moving parts of a run:
//! - The frontier, a lazy item source over the paginated listing
//! - The worker pool dispatcher feeding items to the sinks on demand
//! - The run controller selecting the mode and reporting the outcome

mod controller;
mod dispatcher;
mod frontier;

pub use controller::{run_crawl, Controller, RunMode, RunReport, RunSpec, RunStatus};
pub use dispatcher::{DispatchReport, Dispatcher, DEFAULT_POOL_SIZE};
pub use frontier::{FrontierWalker, ItemSource, SingleItemSource};
