//! tailhub - live container log fan-out
//!
//! Follows each workload's log stream once and relays it to any number of
//! browser viewers over WebSocket.
//!
//! ## Features
//!
//! - One reader per workload no matter how many viewers are attached
//! - Late joiners get the most recent lines replayed before live output
//! - Slow viewers are dropped instead of holding up the others
//! - Idle workloads are torn down after a configurable timeout
//! - Docker Engine API over a unix socket or TCP

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod source;
pub mod stream;

pub use config::Config;
pub use error::{Result, TailError};
