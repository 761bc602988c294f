pub mod api;
pub mod challenge;
pub mod client_meta;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod service;
pub mod session;

use crate::api::localization::LocalizationHandler;
use crate::errors::RedirectorError;
use crate::notify::HttpNotifier;
use crate::orchestrator::Orchestrator;
use crate::service::RedirectorService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::time::Duration;
use tracker::TrackerClient;

/// Wires the service graph from config and serves both listeners until the
/// public listener fails.
pub async fn run(config: config::Config) -> Result<(), RedirectorError> {
    let tracker = TrackerClient::new(
        config.tracker.api_base_url.clone(),
        Duration::from_millis(config.tracker.timeout_ms),
    );
    let notifier = Arc::new(HttpNotifier::new(&config.tracker.api_base_url));
    let cookie_policy = config.cookies.policy();

    let orchestrator = Orchestrator::new(
        tracker.clone(),
        notifier,
        config.tracker.domain.clone(),
        cookie_policy.clone(),
    );
    let localization = LocalizationHandler::new(
        tracker,
        config.tracker.domain.clone(),
        cookie_policy,
    );
    let service = RedirectorService::new(orchestrator, localization);

    let admin_host = config.admin_listener.host.clone();
    let admin_port = config.admin_listener.port;
    tokio::spawn(async move {
        let admin = AdminService::<_, RedirectorError>::new(|| true);
        if let Err(error) = run_http_service(&admin_host, admin_port, admin).await {
            tracing::error!(error = %error, "admin listener failed");
        }
    });

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "redirector listening"
    );
    run_http_service(&config.listener.host, config.listener.port, service).await
}
