//! Routers per concern and the assembled application.

mod common;
mod entity;

pub use common::common_routes;
pub use entity::entity_routes;

use crate::error::AppError;
use crate::middleware::method_timeout;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::internal("internal error")
        .with_detail(serde_json::Value::String(detail))
        .into_response()
}

/// Common and entity routes with panic catching, body limit and per-method timeouts.
pub fn app(state: AppState) -> Router {
    let body_limit = state.settings.server.body_limit;
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(entity_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(axum::middleware::from_fn_with_state(state, method_timeout)),
        )
}
