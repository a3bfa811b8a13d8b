use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{CONTENT_LENGTH, CONTENT_TYPE, ORIGIN},
    },
    middleware,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

use crate::config::Args;
use crate::error::Result;
use crate::handlers::{
    CLIENT_ID_HEADER, data_handler, health_handler, metrics_handler, public_handler,
    rate_limit_gate, resource_handler,
};
use crate::metrics;
use crate::rate_limit::AdmissionTracker;
use crate::state::AppState;
use crate::sweeper::eviction_sweeper;

/// Build the gateway router.
///
/// Only the routes under `/api` pass through the rate limit gate. CORS sits
/// outermost so preflight requests are answered without spending quota.
pub fn build_router(state: Arc<AppState>) -> Router {
    metrics::init();

    let api = Router::new()
        .route("/resource", get(resource_handler))
        .route("/data", post(data_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_gate,
        ));

    Router::new()
        .nest("/api", api)
        .route("/public", get(public_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        // credentials rule out a wildcard origin, echo the caller's instead
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ORIGIN, CONTENT_TYPE, HeaderName::from_static(CLIENT_ID_HEADER)])
        .expose_headers([CONTENT_LENGTH])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60))
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Wire the tracker, sweeper and router from `args` and serve until Ctrl-C.
pub async fn run(args: Args) -> Result<()> {
    let config = args.window_config()?;
    let tracker = match args.shard_amount()? {
        Some(shards) => AdmissionTracker::with_shard_amount(config, shards)?,
        None => AdmissionTracker::new(config),
    };
    let tracker = Arc::new(tracker);

    if let Some(every) = args.sweep_every() {
        tokio::spawn(eviction_sweeper(Arc::clone(&tracker), every));
    }

    let app = build_router(Arc::new(AppState::new(tracker)));

    let addr = args.addr();
    let listener = TcpListener::bind(&addr).await?;

    info!(
        %addr,
        limit = config.limit,
        window = ?config.window,
        shards = ?args.shards,
        "rate limiting gateway running"
    );

    serve(listener, app, shutdown_signal()).await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            // without a signal handler, run until the process is killed
            error!(%err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
