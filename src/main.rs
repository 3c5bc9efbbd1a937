use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use tracing_subscriber::{fmt, EnvFilter};
use usage_monitor::{config, UsageMonitor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let monitor = Arc::new(UsageMonitor::from_env()?);

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = usage_monitor::app(monitor)
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
