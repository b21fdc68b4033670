//! Application context shared by every route. Built once at startup.

use crate::cache::Cache;
use crate::error::AppError;
use crate::i18n::Translator;
use crate::query::Compiler;
use crate::schema::{Registry, Schema};
use crate::service::SqlExecutor;
use crate::settings::Settings;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn SqlExecutor>,
    pub registry: Arc<Registry>,
    /// `None` when caching is disabled.
    pub cache: Option<Arc<dyn Cache>>,
    pub settings: Arc<Settings>,
    pub translator: Arc<Translator>,
}

impl AppState {
    pub fn new(executor: Arc<dyn SqlExecutor>, registry: Registry, settings: Settings) -> Self {
        let translator = Translator::builtin(&settings.lang);
        AppState {
            executor,
            registry: Arc::new(registry),
            cache: None,
            settings: Arc::new(settings),
            translator: Arc::new(translator),
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn Cache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.registry, self.executor.dialect(), self.settings.query)
    }

    /// Schema behind a collection path segment.
    pub fn schema(&self, collection: &str) -> Result<Arc<Schema>, AppError> {
        self.registry
            .get(collection)
            .ok_or_else(|| AppError::NotFound(collection.to_string()))
    }
}
