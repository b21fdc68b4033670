//! rowpath: declarative REST backend. Entity schemas drive a query-string to SQL compiler,
//! flat/structured JSON shaping and a cached response pipeline.

pub mod cache;
pub mod dialect;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod i18n;
pub mod middleware;
pub mod migration;
pub mod nullable;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod settings;
pub mod shape;
pub mod sql;
pub mod state;

pub use cache::{Cache, LocalCache, SqlCache};
pub use dialect::Dialect;
pub use error::{AppError, QueryError, SchemaError};
pub use i18n::Translator;
pub use migration::{create_table_sql, rebuild_stale};
pub use query::{Compiler, ParsedQuery, Plan, QueryOptions};
pub use routes::{app, common_routes, entity_routes};
pub use schema::{load_dir, Record, Registry, RegistryBuilder, Schema};
pub use service::{CrudService, PgExecutor, SqlExecutor};
pub use settings::Settings;
pub use state::AppState;
