pub mod config;
pub mod deployments;
pub mod error;
pub mod openai;
pub mod report;
pub mod rounding;
pub mod routes;
pub mod usage;
pub mod vercel;

use std::sync::Arc;

use axum::{Extension, Router};

pub use report::{UsageMonitor, UsageReport, UpstreamSettings};

/// Report routes with the monitor attached as shared state.
pub fn app(monitor: Arc<UsageMonitor>) -> Router {
    routes::api_routes().layer(Extension(monitor))
}
