//! Output module for reporting run results
//!
//! Progress is reported through `tracing` while the run is going; this module
//! renders the final summary once it is over.

pub mod stats;

pub use stats::{format_summary, print_summary};
