//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} key {key}")]
    InvalidPrimaryKey { entity: String, key: String },
    #[error("duplicate output key '{key}' in entity {entity}")]
    DuplicateKey { entity: String, key: String },
    #[error("duplicate alias '{alias}' in entity {entity}")]
    DuplicateAlias { entity: String, alias: String },
    #[error("unknown alias '{alias}' in '{expr}' of entity {entity}")]
    UnknownAlias {
        entity: String,
        expr: String,
        alias: String,
    },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("subquery relations form a cycle through {0}")]
    Cycle(String),
    #[error("schema load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Query-string grammar failures. Every variant carries the offending parameter key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("unknown field in '{0}'")]
    UnknownField(String),
    #[error("unknown operator in '{0}'")]
    UnknownOperator(String),
    #[error("'{0}' must be a positive integer")]
    InvalidNumber(String),
    #[error("invalid value for '{0}'")]
    InvalidValue(String),
    #[error("unknown array field in '{0}'")]
    UnknownInclude(String),
    #[error("unknown query parameter '{0}'")]
    UnknownParam(String),
    #[error("malformed expression in '{0}'")]
    Malformed(String),
    #[error("operator in '{0}' is not supported by this database")]
    UnsupportedOperator(String),
}

impl QueryError {
    pub fn key(&self) -> &str {
        match self {
            QueryError::UnknownField(k)
            | QueryError::UnknownOperator(k)
            | QueryError::InvalidNumber(k)
            | QueryError::InvalidValue(k)
            | QueryError::UnknownInclude(k)
            | QueryError::UnknownParam(k)
            | QueryError::Malformed(k)
            | QueryError::UnsupportedOperator(k) => k,
        }
    }

    /// Catalog key of the message template.
    pub fn message_key(&self) -> &'static str {
        match self {
            QueryError::UnknownField(_) => "query.unknown_field",
            QueryError::UnknownOperator(_) => "query.unknown_operator",
            QueryError::InvalidNumber(_) => "query.invalid_number",
            QueryError::InvalidValue(_) => "query.invalid_value",
            QueryError::UnknownInclude(_) => "query.unknown_include",
            QueryError::UnknownParam(_) => "query.unknown_param",
            QueryError::Malformed(_) => "query.malformed",
            QueryError::UnsupportedOperator(_) => "query.unsupported_operator",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{message}")]
    BadRequest {
        message: String,
        detail: Option<Value>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<Value>,
    },
    /// Any other status; codes outside 400..=599 render as 500.
    #[error("{message}")]
    Status {
        code: u16,
        message: String,
        detail: Option<Value>,
    },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            detail: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            detail: None,
        }
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        let code = if (400..=599).contains(&code) { code } else { 500 };
        AppError::Status {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(self, detail: Value) -> Self {
        match self {
            AppError::BadRequest { message, .. } => AppError::BadRequest {
                message,
                detail: Some(detail),
            },
            AppError::Internal { message, .. } => AppError::Internal {
                message,
                detail: Some(detail),
            },
            AppError::Status { code, message, .. } => AppError::Status {
                code,
                message,
                detail: Some(detail),
            },
            other => other,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            AppError::Query(_) | AppError::BadRequest { .. } => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Schema(_) | AppError::Internal { .. } => 500,
            AppError::Status { code, .. } => *code,
        }
    }

    pub fn detail(&self) -> Option<Value> {
        match self {
            AppError::Query(e) => Some(json!({ "param": e.key() })),
            AppError::BadRequest { detail, .. }
            | AppError::Internal { detail, .. }
            | AppError::Status { detail, .. } => detail.clone(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal {
            message: "database error".into(),
            detail: Some(Value::String(e.to_string())),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl From<&AppError> for ErrorBody {
    fn from(e: &AppError) -> Self {
        ErrorBody {
            error: ErrorDetail {
                code: e.code(),
                message: e.to_string(),
                detail: e.detail(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        if body.error.code >= 500 {
            tracing::error!(code = body.error.code, error = %self, detail = ?body.error.detail, "request failed");
        }
        let status =
            StatusCode::from_u16(body.error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_outside_error_range_become_500() {
        assert_eq!(AppError::status(302, "moved").code(), 500);
        assert_eq!(AppError::status(99, "x").code(), 500);
        assert_eq!(AppError::status(429, "slow down").code(), 429);
    }

    #[test]
    fn query_errors_carry_param() {
        let e = AppError::from(QueryError::UnknownField("nope".into()));
        assert_eq!(e.code(), 400);
        assert_eq!(e.detail(), Some(json!({ "param": "nope" })));
    }

    #[test]
    fn body_shape() {
        let e = AppError::bad_request("bad").with_detail(json!({"field": "title"}));
        let body = serde_json::to_value(ErrorBody::from(&e)).unwrap();
        assert_eq!(
            body,
            json!({"error": {"code": 400, "message": "bad", "detail": {"field": "title"}}})
        );
    }
}
