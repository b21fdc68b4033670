//! Per-method request timeouts. Expiry drops the handler future, cancelling in-flight queries.

use crate::error::AppError;
use crate::settings::ServerSettings;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;

pub fn timeout_for(method: &Method, server: &ServerSettings) -> Duration {
    match *method {
        Method::POST => server.timeout_post,
        Method::PUT | Method::PATCH => server.timeout_put,
        Method::DELETE => server.timeout_delete,
        _ => server.timeout_get,
    }
}

pub async fn method_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limit = timeout_for(req.method(), &state.settings.server);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(method = %method, path = %path, ?limit, "request timed out");
            AppError::status(408, "request timed out").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_limit_by_method() {
        let server = ServerSettings {
            timeout_get: Duration::from_secs(1),
            timeout_post: Duration::from_secs(2),
            timeout_put: Duration::from_secs(3),
            timeout_delete: Duration::from_secs(4),
            ..ServerSettings::default()
        };
        assert_eq!(timeout_for(&Method::GET, &server), Duration::from_secs(1));
        assert_eq!(timeout_for(&Method::POST, &server), Duration::from_secs(2));
        assert_eq!(timeout_for(&Method::PATCH, &server), Duration::from_secs(3));
        assert_eq!(timeout_for(&Method::DELETE, &server), Duration::from_secs(4));
    }
}
