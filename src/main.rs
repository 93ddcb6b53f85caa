//! This file defines the hyperstack binary entry point.

use hyperstack::app;
use hyperstack::cli;
use hyperstack::metrics;
use hyperstack::server;
use hyperstack::tracing;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    ::tracing::info!("{:?}", args);
    metrics::register_metrics();
    let service = app::service(&args);
    server::serve(&args, service).await;
}
