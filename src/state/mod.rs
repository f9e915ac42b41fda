//! State module for tracking worker progress
//!
//! # Components
//!
//! - `WorkerState`: lifecycle of one slot in the dispatcher pool (idle, busy, draining, terminated)

mod worker_state;

pub use worker_state::WorkerState;
