//! Standard response envelope.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: Meta,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Meta {
    pub count: u64,
    #[serde(flatten)]
    pub page: Option<PageMeta>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
    pub total_data: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(page: u64, per_page: u64, total_data: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total_data.div_ceil(per_page)
        };
        PageMeta {
            page,
            per_page,
            total_data,
            total_pages,
        }
    }
}

impl<T> SuccessMany<T> {
    pub fn new(data: Vec<T>, page: Option<PageMeta>) -> Self {
        let count = data.len() as u64;
        SuccessMany {
            data,
            meta: Meta { count, page },
        }
    }
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data }))
}

/// Pre-serialized JSON body, as stored in the response cache.
pub struct JsonBytes(pub Vec<u8>);

impl IntoResponse for JsonBytes {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            self.0,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn many_without_pagination() {
        let body = SuccessMany::new(vec![json!({"id": 1})], None);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"data": [{"id": 1}], "meta": {"count": 1}})
        );
    }

    #[test]
    fn many_with_pagination() {
        let body = SuccessMany::new(vec![json!(1), json!(2)], Some(PageMeta::new(2, 2, 5)));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"data": [1, 2], "meta": {"count": 2, "page": 2, "per_page": 2, "total_data": 5, "total_pages": 3}})
        );
    }
}
