#![allow(dead_code)]

use async_trait::async_trait;
use rowpath::nullable::{NullBool, NullDateTime, NullInt, NullString, NullText};
use rowpath::schema::{
    ClauseConfig, EntityConfig, FieldVisitor, JoinKind, Record, RelationConfig, SortConfig, Tag,
};
use rowpath::sql::QueryBuf;
use rowpath::{AppError, AppState, Dialect, Registry, RegistryBuilder, Settings, SqlExecutor};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default, Debug, PartialEq)]
pub struct Comment {
    pub id: NullInt,
    pub body: NullString,
    pub article_id: NullInt,
}

impl Record for Comment {
    fn entity() -> EntityConfig {
        EntityConfig::new("comments", "comments", "c", "1")
    }

    fn visit(&mut self, v: &mut dyn FieldVisitor) {
        v.field(&Tag::new("id", "c.id"), &mut self.id);
        v.field(&Tag::new("body", "c.body"), &mut self.body);
        v.field(&Tag::new("article_id", "c.article_id"), &mut self.article_id);
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct User {
    pub id: NullInt,
    pub name: NullString,
}

impl Record for User {
    fn entity() -> EntityConfig {
        EntityConfig::new("users", "users", "u", "1")
    }

    fn visit(&mut self, v: &mut dyn FieldVisitor) {
        v.field(&Tag::new("id", "u.id"), &mut self.id);
        v.field(&Tag::new("name", "u.name"), &mut self.name);
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct Article {
    pub id: NullInt,
    pub title: NullString,
    pub content: NullText,
    pub is_active: NullBool,
    pub author_name: NullString,
    pub updated_at: NullDateTime,
    pub is_hidden: NullBool,
    pub comments: Vec<Comment>,
}

impl Record for Article {
    fn entity() -> EntityConfig {
        let mut c = EntityConfig::new("articles", "articles", "a", "1");
        c.relations.push(RelationConfig {
            kind: JoinKind::Left,
            table: Some("users".into()),
            schema: None,
            alias: "u".into(),
            conditions: vec![ClauseConfig::column_eq("u.id", "a.author_id")],
        });
        c.filters.push(ClauseConfig::is_null("a.deleted_at"));
        c.sorts.push(SortConfig {
            column: "a.updated_at".into(),
            desc: true,
            case_insensitive: false,
            required: false,
        });
        c
    }

    fn visit(&mut self, v: &mut dyn FieldVisitor) {
        v.field(&Tag::new("id", "a.id"), &mut self.id);
        v.field(&Tag::new("title", "a.title").validate("required,max=120"), &mut self.title);
        v.field(&Tag::new("content", "a.content"), &mut self.content);
        v.field(&Tag::new("is_active", "a.is_active"), &mut self.is_active);
        v.field(&Tag::new("author.name", "u.name"), &mut self.author_name);
        v.field(&Tag::new("updated_at", "a.updated_at"), &mut self.updated_at);
        v.field(&Tag::new("is_hidden", "a.is_hidden,hide"), &mut self.is_hidden);
        v.children(&Tag::new("comments", "article_id={id}"), &mut self.comments);
    }
}

pub fn registry() -> Registry {
    RegistryBuilder::new()
        .record::<Article>()
        .record::<User>()
        .record::<Comment>()
        .build()
        .unwrap()
}

pub fn row(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

pub fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Records every statement. Fetches answer with the rows of the first registered pattern
/// contained in the SQL, or no rows.
#[derive(Default)]
pub struct RecordingExecutor {
    statements: Mutex<Vec<QueryBuf>>,
    responses: Mutex<Vec<(String, Vec<Map<String, Value>>)>>,
    affected: AtomicU64,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        RecordingExecutor {
            affected: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        RecordingExecutor {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn respond(&self, pattern: &str, rows: Vec<Map<String, Value>>) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), rows));
    }

    pub fn set_affected(&self, n: u64) {
        self.affected.store(n, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<QueryBuf> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|q| q.sql).collect()
    }

    async fn record(&self, q: &QueryBuf) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.statements.lock().unwrap().push(q.clone());
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Map<String, Value>>, AppError> {
        self.record(q).await;
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(pattern, _)| q.sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        self.record(q).await;
        Ok(self.affected.load(Ordering::SeqCst))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn state(executor: Arc<RecordingExecutor>, settings: Settings) -> AppState {
    AppState::new(executor, registry(), settings)
}
