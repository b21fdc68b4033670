//! Example consumer: serves the entity files of `APP_ENTITIES_DIR` plus one record type.
//!
//! Run from repo root: `cargo run -p example-consumer`

use rowpath::nullable::{NullBool, NullDateTime, NullString, NullUuid};
use rowpath::schema::{EntityConfig, FieldVisitor, Record, Tag};
use rowpath::{app, cache, load_dir, rebuild_stale, AppState, PgExecutor, RegistryBuilder, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone, Default, Debug)]
struct Project {
    id: NullUuid,
    name: NullString,
    archived: NullBool,
    created_at: NullDateTime,
}

impl Record for Project {
    fn entity() -> EntityConfig {
        EntityConfig::new("projects", "projects", "p", "1")
    }

    fn visit(&mut self, v: &mut dyn FieldVisitor) {
        v.field(&Tag::new("id", "p.id"), &mut self.id);
        v.field(&Tag::new("name", "p.name").validate("required,max=80"), &mut self.name);
        v.field(&Tag::new("archived", "p.archived"), &mut self.archived);
        v.field(&Tag::new("created_at", "p.created_at"), &mut self.created_at);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rowpath=info,example_consumer=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let executor = Arc::new(PgExecutor::connect(&settings.database).await?);

    let mut builder = RegistryBuilder::new().record::<Project>();
    if let Some(dir) = &settings.server.entities_dir {
        builder = builder.entities(load_dir(dir).await?);
    }
    let registry = builder.build()?;
    tracing::info!(entities = registry.len(), "registry built");

    if settings.database.migrate {
        let rebuilt = rebuild_stale(executor.as_ref(), &registry).await?;
        tracing::info!(?rebuilt, "schema versions checked");
    }

    let cache = cache::connect(&settings.cache).await;
    let addr = settings.server.addr.clone();
    let state = AppState::new(executor, registry, settings).with_cache(cache);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
