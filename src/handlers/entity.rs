//! Entity CRUD handlers. The collection path segment names the entity.

use crate::error::AppError;
use crate::extractors::Lang;
use crate::response::{success_one, success_one_ok, JsonBytes};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

fn require_object(body: &Value) -> Result<(), AppError> {
    if body.is_object() {
        Ok(())
    } else {
        Err(AppError::bad_request("body must be a JSON object"))
    }
}

fn respond<T: IntoResponse>(state: &AppState, lang: &Lang, result: Result<T, AppError>) -> Response {
    match result {
        Ok(r) => r.into_response(),
        Err(e) => state
            .translator
            .localize(lang.or(&state.settings.lang), e)
            .into_response(),
    }
}

pub async fn list(
    State(state): State<AppState>,
    lang: Lang,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let result = async {
        let schema = state.schema(&collection)?;
        CrudService::list(&state, &schema, &params).await.map(JsonBytes)
    }
    .await;
    respond(&state, &lang, result)
}

pub async fn read(
    State(state): State<AppState>,
    lang: Lang,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let result = async {
        let schema = state.schema(&collection)?;
        CrudService::read(&state, &schema, &id, &params).await.map(JsonBytes)
    }
    .await;
    respond(&state, &lang, result)
}

pub async fn create(
    State(state): State<AppState>,
    lang: Lang,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let result = async {
        let schema = state.schema(&collection)?;
        require_object(&body)?;
        let row = CrudService::create(&state, &schema, &body).await?;
        Ok(success_one(row))
    }
    .await;
    respond(&state, &lang, result)
}

pub async fn update(
    State(state): State<AppState>,
    lang: Lang,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let result = async {
        let schema = state.schema(&collection)?;
        require_object(&body)?;
        let row = CrudService::update(&state, &schema, &id, &body).await?;
        Ok(success_one_ok(row))
    }
    .await;
    respond(&state, &lang, result)
}

pub async fn delete(
    State(state): State<AppState>,
    lang: Lang,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let schema = state.schema(&collection)?;
        let row = CrudService::delete(&state, &schema, &id).await?;
        Ok(success_one_ok(row))
    }
    .await;
    respond(&state, &lang, result)
}
