use crate::cli::ServeArgs;
use crate::infra::{in_memory_ports, load_seed_accounts, AppState};
use crate::routes::with_listing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use listing_intake::config::AppConfig;
use listing_intake::error::AppError;
use listing_intake::listings::{ListingSubmissionService, SubmissionError};
use listing_intake::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let accounts = load_seed_accounts(config.accounts_seed.as_deref())?;
    let seeded = accounts.len();
    let ports =
        in_memory_ports(accounts).map_err(|err| AppError::Listing(SubmissionError::from(err)))?;
    let listing_service = Arc::new(ListingSubmissionService::new(
        ports,
        config.listings.clone(),
        config.environment,
    ));

    let app = with_listing_routes(listing_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = %config.environment,
        %addr,
        seeded_accounts = seeded,
        "listing intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
