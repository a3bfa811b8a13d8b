use axum::Json;
use crate::models::MessageResponse;

// Protected operations, only reached through the rate limit gate

pub async fn resource_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("Access granted to resource!"))
}

pub async fn data_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("Data processed!"))
}

// Not gated
pub async fn public_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new(
        "This is a public resource, not rate-limited.",
    ))
}
