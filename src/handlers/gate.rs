//! Rate limiting middleware for the protected routes.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::{CHECK_DURATION, REQUESTS_ADMITTED, REQUESTS_REJECTED, REQUESTS_TOTAL};
use crate::models::ErrorResponse;
use crate::rate_limit::{ANONYMOUS, Decision};
use crate::state::AppState;

pub const CLIENT_ID_HEADER: &str = "x-user-id"; // caller's client id

pub const REJECTION_MESSAGE: &str = "Too many requests. Please try again later.";

// missing, empty or non UTF-8 header falls back to the anonymous bucket
pub fn client_id(headers: &HeaderMap) -> &str {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
        .unwrap_or(ANONYMOUS)
}

pub async fn rate_limit_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = client_id(request.headers()).to_owned();
    REQUESTS_TOTAL.inc();

    let timer = CHECK_DURATION.start_timer();
    let decision = state.tracker.check_and_record(&client_id);
    timer.observe_duration();

    match decision {
        Decision::Admitted { remaining } => {
            REQUESTS_ADMITTED.inc();
            debug!(%client_id, remaining, "request admitted");
            next.run(request).await
        }
        Decision::Rejected { retry_after } => {
            REQUESTS_REJECTED.inc();
            warn!(%client_id, ?retry_after, "rate limit exceeded");
            too_many_requests(retry_after)
        }
    }
}

fn too_many_requests(retry_after: Duration) -> Response {
    // admission needs strictly more than `retry_after` to pass
    let seconds = retry_after.as_secs() + 1;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, seconds.to_string())],
        Json(ErrorResponse::new(REJECTION_MESSAGE)),
    )
        .into_response()
}
