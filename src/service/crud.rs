//! Request pipeline: cache lookup, compile, execute, expand children, shape, store.

use super::RequestValidator;
use crate::cache::fingerprint;
use crate::error::{AppError, QueryError};
use crate::nullable::ScalarType;
use crate::query::{instantiate, ParsedQuery, Plan};
use crate::response::{PageMeta, SuccessMany, SuccessOne};
use crate::schema::{RelationSource, Schema};
use crate::shape::{to_structured, unmarshal_schema, Separator};
use crate::sql::{delete, insert, update, SqlValue};
use crate::state::AppState;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

type RowsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Value>, AppError>> + Send + 'a>>;

pub struct CrudService;

impl CrudService {
    /// `GET /collection`: serialized list envelope, served from the cache when present.
    pub async fn list(
        state: &AppState,
        schema: &Schema,
        params: &[(String, String)],
    ) -> Result<Vec<u8>, AppError> {
        let key = fingerprint(&schema.name, params);
        if let Some(hit) = Self::cached(state, &key).await {
            return Ok(hit);
        }

        let q = ParsedQuery::parse(params)?;
        let plan = state.compiler().compile(schema, &q)?;
        let data = Self::rows(state, schema, &plan).await?;
        let page = match &plan.count {
            Some(count) => {
                let rows = state.executor.fetch_all(count).await?;
                let total = rows.first().and_then(first_number).unwrap_or(0);
                Some(PageMeta::new(plan.page, plan.per_page, total))
            }
            None => None,
        };

        let body = encode(&SuccessMany::new(data, page))?;
        Self::store(state, &key, &body).await;
        Ok(body)
    }

    /// `GET /collection/{id}`: serialized single-row envelope.
    pub async fn read(
        state: &AppState,
        schema: &Schema,
        id: &str,
        params: &[(String, String)],
    ) -> Result<Vec<u8>, AppError> {
        let mut keyed = params.to_vec();
        keyed.push(("$id".into(), id.into()));
        let key = fingerprint(&schema.name, &keyed);
        if let Some(hit) = Self::cached(state, &key).await {
            return Ok(hit);
        }

        let q = ParsedQuery::parse(params)?;
        let row = Self::fetch_one(state, schema, &q, id).await?;
        let body = encode(&SuccessOne { data: row })?;
        Self::store(state, &key, &body).await;
        Ok(body)
    }

    /// Insert one row and return it as read back through the compiler.
    pub async fn create(state: &AppState, schema: &Schema, payload: &Value) -> Result<Value, AppError> {
        let mut values = unmarshal_schema(schema, payload);
        RequestValidator::validate(schema, &values)?;

        if let Some(pk) = schema.primary_field() {
            let missing = values.get(&pk.key).map_or(true, Value::is_null);
            if pk.ty == ScalarType::Uuid && missing {
                values.insert(pk.key.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }

        let columns = own_values(schema, &values);
        if columns.is_empty() {
            return Err(AppError::bad_request("payload has no writable fields"));
        }
        let q = insert(schema, state.executor.dialect(), &columns);
        state.executor.execute(&q).await?;
        Self::invalidate(state, schema);

        match values.get(&schema.primary_key).filter(|v| !v.is_null()) {
            Some(id) => Self::fetch_one(state, schema, &ParsedQuery::default(), &text(id)).await,
            None => Ok(shape_row(schema, values)),
        }
    }

    /// Update the given fields of one row. Unknown ids are not found.
    pub async fn update(
        state: &AppState,
        schema: &Schema,
        id: &str,
        payload: &Value,
    ) -> Result<Value, AppError> {
        let values = unmarshal_schema(schema, payload);
        RequestValidator::validate_partial(schema, &values)?;

        let (pk_column, pk) = Self::primary(schema, id)?;
        let columns = own_values(schema, &values);
        match update(schema, state.executor.dialect(), pk_column, pk, &columns) {
            Some(q) => {
                if state.executor.execute(&q).await? == 0 {
                    return Err(AppError::NotFound(schema.name.clone()));
                }
                Self::invalidate(state, schema);
            }
            None => tracing::debug!(entity = %schema.name, "update without writable fields"),
        }
        Self::fetch_one(state, schema, &ParsedQuery::default(), id).await
    }

    /// Delete one row and return it as it was.
    pub async fn delete(state: &AppState, schema: &Schema, id: &str) -> Result<Value, AppError> {
        let row = Self::fetch_one(state, schema, &ParsedQuery::default(), id).await?;
        let (pk_column, pk) = Self::primary(schema, id)?;
        let q = delete(schema, state.executor.dialect(), pk_column, pk);
        if state.executor.execute(&q).await? == 0 {
            return Err(AppError::NotFound(schema.name.clone()));
        }
        Self::invalidate(state, schema);
        Ok(row)
    }

    async fn fetch_one(
        state: &AppState,
        schema: &Schema,
        q: &ParsedQuery,
        id: &str,
    ) -> Result<Value, AppError> {
        let plan = state.compiler().compile_one(schema, q, id)?;
        Self::rows(state, schema, &plan)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(schema.name.clone()))
    }

    fn primary<'s>(schema: &'s Schema, id: &str) -> Result<(&'s str, SqlValue), AppError> {
        let field = schema
            .primary_field()
            .ok_or_else(|| AppError::internal(format!("{} has no primary key field", schema.name)))?;
        let column = schema
            .primary_column()
            .ok_or_else(|| AppError::internal(format!("{} primary key is not a column", schema.name)))?;
        let value = field
            .ty
            .parse_param(id)
            .ok_or_else(|| QueryError::InvalidValue(schema.primary_key.clone()))?;
        Ok((column, value))
    }

    /// Execute the row statement, expand requested children, then shape every row.
    fn rows<'a>(state: &'a AppState, schema: &'a Schema, plan: &'a Plan) -> RowsFuture<'a> {
        Box::pin(async move {
            let fetched = state.executor.fetch_all(&plan.select).await?;
            let mut out = Vec::with_capacity(fetched.len());
            for raw in fetched {
                let mut row = normalize(schema, raw);
                for key in &plan.includes {
                    let children = Self::children(state, schema, key, &row).await?;
                    row.insert(key.clone(), Value::Array(children));
                }
                for key in &plan.strip {
                    row.remove(key);
                }
                out.push(shape_row(schema, row));
            }
            Ok(out)
        })
    }

    /// Rows of one array child for one parent row. Runs one query per parent row; a parent
    /// without the referenced key values gets none.
    async fn children(
        state: &AppState,
        schema: &Schema,
        key: &str,
        row: &Map<String, Value>,
    ) -> Result<Vec<Value>, AppError> {
        let child = schema
            .array_field(key)
            .ok_or_else(|| QueryError::UnknownInclude(key.to_string()))?;
        let child_schema = state
            .registry
            .get(&child.entity)
            .ok_or_else(|| AppError::internal(format!("unknown child entity {}", child.entity)))?;
        let Some(pairs) = instantiate(child, row) else {
            return Ok(Vec::new());
        };
        let q = ParsedQuery::parse(&pairs)?;
        let plan = state.compiler().compile_all(&child_schema, &q)?;
        Self::rows(state, &child_schema, &plan).await
    }

    async fn cached(state: &AppState, key: &str) -> Option<Vec<u8>> {
        let cache = state.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => {
                if hit.is_some() {
                    tracing::debug!(key = %key, "cache hit");
                }
                hit
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn store(state: &AppState, key: &str, body: &[u8]) {
        let Some(cache) = &state.cache else {
            return;
        };
        if let Err(e) = cache.set(key, body.to_vec(), state.settings.cache.ttl()).await {
            tracing::warn!(key = %key, error = %e, "cache write failed");
        }
    }

    /// Sweep cached reads of this entity and of every entity that embeds it.
    fn invalidate(state: &AppState, schema: &Schema) {
        let Some(cache) = &state.cache else {
            return;
        };
        let mut names = vec![schema.name.clone()];
        for other in state.registry.iter() {
            let embeds = other.children.iter().any(|c| c.entity == schema.name)
                || other
                    .relations
                    .iter()
                    .any(|r| r.source == RelationSource::Schema(schema.name.clone()));
            if embeds && !names.contains(&other.name) {
                names.push(other.name.clone());
            }
        }
        for name in names {
            let _ = cache.clone().invalidate(format!("{}:", name), Vec::new());
        }
    }
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(body).map_err(|e| AppError::internal(format!("encode response: {}", e)))
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_number(row: &Map<String, Value>) -> Option<u64> {
    match row.values().next()? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Driver values scanned into each field's JSON form. Keys without a field pass through.
fn normalize(schema: &Schema, row: Map<String, Value>) -> Map<String, Value> {
    row.into_iter()
        .map(|(k, v)| {
            let v = match schema.field(&k) {
                Some(f) => match f.ty.scan_json(SqlValue::from_json(&v)) {
                    Ok(scanned) => scanned,
                    Err(e) => {
                        tracing::debug!(key = %k, error = %e, "keeping unscanned value");
                        v
                    }
                },
                None => v,
            };
            (k, v)
        })
        .collect()
}

fn shape_row(schema: &Schema, row: Map<String, Value>) -> Value {
    let row = Value::Object(row);
    if schema.flat {
        row
    } else {
        to_structured(&row, Separator::DOT)
    }
}

/// Payload values of the schema's own-table columns, as bind values.
fn own_values<'s>(schema: &'s Schema, values: &Map<String, Value>) -> Vec<(&'s str, SqlValue)> {
    schema
        .own_columns()
        .filter_map(|(col, f)| values.get(&f.key).map(|v| (col, f.ty.to_sql(v))))
        .collect()
}
