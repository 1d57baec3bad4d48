use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Sqlite-backed key-value store with per-entry expiry, plus the user
/// registry used for broadcast fan-out. Expired entries read as absent;
/// callers must treat absence as a normal case.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
                user_id INTEGER PRIMARY KEY,\
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_cache (\
                key TEXT PRIMARY KEY,\
                value BLOB NOT NULL,\
                expires_at INTEGER\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_cache_expires_at ON kv_cache(expires_at);")
            .execute(&pool)
            .await?;

        Ok(Database { pool })
    }

    pub async fn kv_put(&self, key: &str, value: &[u8], ttl_seconds: Option<i64>) -> Result<()> {
        let expires_at = ttl_seconds.map(|ttl| Utc::now().timestamp() + ttl);
        sqlx::query(
            "INSERT INTO kv_cache (key, value, expires_at) VALUES (?, ?, ?)\
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at;",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.kv_get_at(key, Utc::now().timestamp()).await
    }

    /// Expiry is evaluated against the given timestamp so TTL behavior can
    /// be exercised with a simulated clock.
    pub async fn kv_get_at(&self, key: &str, now: i64) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value, expires_at FROM kv_cache WHERE key = ?;")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<i64> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at {
            if now >= expires_at {
                self.kv_delete(key).await?;
                return Ok(None);
            }
        }

        Ok(Some(row.try_get("value")?))
    }

    pub async fn kv_get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .kv_get(key)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_cache WHERE key = ?;")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn kv_list(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query(
            "SELECT key FROM kv_cache WHERE key LIKE ? ESCAPE '\\' \
             AND (expires_at IS NULL OR expires_at > ?);",
        )
        .bind(pattern)
        .bind(Utc::now().timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(Into::into))
            .collect()
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv_cache WHERE expires_at IS NOT NULL AND expires_at <= ?;")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            debug!("Purged {removed} expired cache entries");
        }
        Ok(removed)
    }

    pub async fn add_user(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?);")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE user_id = ?;")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT user_id FROM users ORDER BY user_id;")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("user_id").map_err(Into::into))
            .collect()
    }

    pub async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users;")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
        let db = Database::init(&url).await.expect("init");
        (dir, db)
    }

    #[tokio::test]
    async fn kv_roundtrip_and_delete() {
        let (_dir, db) = test_db().await;

        db.kv_put("a", b"one", None).await.unwrap();
        assert_eq!(db.kv_get("a").await.unwrap(), Some(b"one".to_vec()));

        db.kv_put("a", b"two", None).await.unwrap();
        assert_eq!(db.kv_get("a").await.unwrap(), Some(b"two".to_vec()));

        db.kv_delete("a").await.unwrap();
        assert_eq!(db.kv_get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kv_entry_expires_after_ttl() {
        let (_dir, db) = test_db().await;

        db.kv_put("audio_cache:42", b"{}", Some(600)).await.unwrap();

        let now = Utc::now().timestamp();
        assert!(db.kv_get_at("audio_cache:42", now).await.unwrap().is_some());
        // 700 simulated seconds later the entry reads as absent.
        assert!(db
            .kv_get_at("audio_cache:42", now + 700)
            .await
            .unwrap()
            .is_none());
        // The expired row was dropped, not just hidden.
        assert!(db.kv_get_at("audio_cache:42", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn kv_list_filters_by_prefix() {
        let (_dir, db) = test_db().await;

        db.kv_put("user:1", b"1", None).await.unwrap();
        db.kv_put("user:2", b"1", None).await.unwrap();
        db.kv_put("audio_cache:1", b"1", None).await.unwrap();

        let mut keys = db.kv_list("user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:1".to_string(), "user:2".to_string()]);
    }

    #[tokio::test]
    async fn user_registry_tracks_membership() {
        let (_dir, db) = test_db().await;

        assert!(db.add_user(7).await.unwrap());
        assert!(!db.add_user(7).await.unwrap());
        assert!(db.add_user(8).await.unwrap());
        assert_eq!(db.count_users().await.unwrap(), 2);

        db.remove_user(7).await.unwrap();
        assert_eq!(db.list_users().await.unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let (_dir, db) = test_db().await;

        db.kv_put("keep", b"1", Some(3600)).await.unwrap();
        db.kv_put("gone", b"1", Some(-10)).await.unwrap();

        db.purge_expired().await.unwrap();
        assert!(db.kv_get("keep").await.unwrap().is_some());
        assert!(db.kv_get("gone").await.unwrap().is_none());
    }
}
