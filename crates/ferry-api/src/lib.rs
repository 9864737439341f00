//! REST transport for Ferry's source and target time-tracking tools.
//!
//! This crate knows how to talk to a tool's API, but nothing about what the
//! payloads mean. Normalization and linking live in `ferry-sync`.
//!
//! ## Features
//!
//! - **HTTP Client**: authenticated JSON client with bounded retry and backoff
//! - **Pagination**: page-number and cursor collections merged into one sequence
//! - **Throttle**: one request limiter per tool, shared by every caller
//! - **Batch Executor**: windowed create/delete runs with permission-skip semantics

mod api;
mod batch;
mod client;
mod config;
mod error;
mod routes;
mod throttle;
mod tool;

pub use api::{HttpToolApi, ToolApi};
pub use batch::{
    AbortSignal, BatchAbort, BatchOutcome, Completed, FailureClass, ItemFailure, ItemProgress,
    run_batch,
};
pub use client::{MAX_PAGES, ToolClient};
pub use config::{AuthContext, RetryConfig, ToolConfig};
pub use error::{ApiError, FetchError};
pub use routes::{Endpoint, Pagination, RouteTable};
pub use throttle::{Throttle, ThrottlePermit};
pub use tool::{EntityGroup, ParseEntityGroupError, Tool};
