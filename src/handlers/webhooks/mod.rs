mod mercadopago;

pub use mercadopago::*;

use axum::{Router, http::StatusCode, routing::post};

use crate::db::AppState;

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/webhooks/mercadopago",
        post(handle_processor_webhook).options(preflight),
    )
}
