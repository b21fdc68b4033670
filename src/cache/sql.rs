use super::{Cache, CacheError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

const TABLE: &str = "_cache_entries";

/// Shared cache kept in a PostgreSQL key/value table, reachable by every process.
pub struct SqlCache {
    pool: PgPool,
}

fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl SqlCache {
    /// Connect to `url` and ensure the entry table exists.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await?;
        let cache = SqlCache { pool };
        cache.ensure_table().await?;
        Ok(cache)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        SqlCache { pool }
    }

    pub async fn ensure_table(&self) -> Result<(), CacheError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value BYTEA NOT NULL, expires_at TIMESTAMPTZ)",
            TABLE
        );
        tracing::debug!(sql = %sql, "query");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Cache for SqlCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let sql = format!(
            "SELECT value FROM {} WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())",
            TABLE
        );
        let row: Option<(Vec<u8>,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = match ttl {
            Some(d) => Some(
                Utc::now()
                    + chrono::Duration::from_std(d)
                        .map_err(|e| CacheError::Other(e.to_string()))?,
            ),
            None => None,
        };
        let sql = format!(
            r#"
            INSERT INTO {} (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET value = $2, expires_at = $3
            "#,
            TABLE
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", TABLE);
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let sql = format!("DELETE FROM {} WHERE key LIKE $1 ESCAPE '\\'", TABLE);
        let result = sqlx::query(&sql)
            .bind(like_prefix(prefix))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::like_prefix;

    #[test]
    fn prefix_pattern_escapes_wildcards() {
        assert_eq!(like_prefix("articles:"), "articles:%");
        assert_eq!(like_prefix("a_b%"), "a\\_b\\%%");
    }
}
