use axum::{routing::get, Router};

use crate::report;

pub async fn root() -> &'static str {
    "Usage Monitor API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/data", get(report::get_usage_report))
}
