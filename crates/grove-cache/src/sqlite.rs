//! Durable cache backed by SQLite

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use grove_core::{CacheError, Node, NodeId, OutgoingRef};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::store::{CacheStore, is_fresh, now_millis};

/// Cache database file name inside the cache directory.
pub const CACHE_DB: &str = "cache.db";

/// SQLite-backed [`CacheStore`]. Blocking calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn unavailable(e: rusqlite::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CacheError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(&path).map_err(unavailable)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=2500;",
        )
        .map_err(unavailable)?;
        init_schema(&conn)?;
        debug!("Opened node cache at {}", path.display());

        Ok(SqliteCache {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
            path: Some(path),
        })
    }

    /// Private database that lives as long as this value.
    pub fn open_in_memory(ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        init_schema(&conn)?;
        Ok(SqliteCache {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CacheError::Unavailable("cache connection poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("cache task failed: {}", e)))?
    }

    /// Fresh JSON list stored under `parent` by `sql`.
    async fn get_list<T>(
        &self,
        sql: &'static str,
        parent: &NodeId,
    ) -> Result<Option<Vec<T>>, CacheError>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let key = parent.as_str().to_string();
        let ttl = self.ttl;
        self.with_conn(move |conn| {
            let Some(payload) = read_fresh(conn, sql, &key, ttl)? else {
                return Ok(None);
            };
            serde_json::from_str(&payload)
                .map(Some)
                .map_err(|source| CacheError::Corrupt { key, source })
        })
        .await
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nodes (
            id         TEXT    PRIMARY KEY,
            payload    TEXT    NOT NULL,
            written_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS children (
            parent_id  TEXT    PRIMARY KEY,
            payload    TEXT    NOT NULL,
            written_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS refs (
            parent_id  TEXT    PRIMARY KEY,
            payload    TEXT    NOT NULL,
            written_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_nodes_written ON nodes(written_at);
         CREATE INDEX IF NOT EXISTS idx_children_written ON children(written_at);
         CREATE INDEX IF NOT EXISTS idx_refs_written ON refs(written_at);",
    )
    .map_err(unavailable)
}

fn read_fresh(
    conn: &Connection,
    sql: &str,
    key: &str,
    ttl: Duration,
) -> Result<Option<String>, CacheError> {
    let row: Option<(String, i64)> = conn
        .query_row(sql, params![key], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()
        .map_err(unavailable)?;

    Ok(row.and_then(|(payload, written_at)| {
        is_fresh(written_at, now_millis(), ttl).then_some(payload)
    }))
}

fn encode<T: serde::Serialize + ?Sized>(key: &str, value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|source| CacheError::Corrupt {
        key: key.to_string(),
        source,
    })
}

fn upsert_node(conn: &Connection, node: &Node, written_at: i64) -> Result<(), CacheError> {
    let payload = encode(node.id.as_str(), node)?;
    conn.execute(
        "INSERT OR REPLACE INTO nodes (id, payload, written_at) VALUES (?1, ?2, ?3)",
        params![node.id.as_str(), payload, written_at],
    )
    .map_err(unavailable)?;
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, CacheError> {
        let key = id.as_str().to_string();
        let ttl = self.ttl;
        self.with_conn(move |conn| {
            let Some(payload) = read_fresh(
                conn,
                "SELECT payload, written_at FROM nodes WHERE id = ?1",
                &key,
                ttl,
            )?
            else {
                return Ok(None);
            };
            serde_json::from_str(&payload)
                .map(Some)
                .map_err(|source| CacheError::Corrupt { key, source })
        })
        .await
    }

    async fn get_children(&self, parent: &NodeId) -> Result<Option<Vec<Node>>, CacheError> {
        self.get_list(
            "SELECT payload, written_at FROM children WHERE parent_id = ?1",
            parent,
        )
        .await
    }

    async fn get_references(
        &self,
        parent: &NodeId,
    ) -> Result<Option<Vec<OutgoingRef>>, CacheError> {
        self.get_list(
            "SELECT payload, written_at FROM refs WHERE parent_id = ?1",
            parent,
        )
        .await
    }

    async fn set_node(&self, node: &Node) -> Result<(), CacheError> {
        let node = node.clone();
        self.with_conn(move |conn| upsert_node(conn, &node, now_millis()))
            .await
    }

    async fn set_children(&self, parent: &NodeId, children: &[Node]) -> Result<(), CacheError> {
        let parent = parent.clone();
        let children = children.to_vec();
        self.with_conn(move |conn| {
            let written_at = now_millis();
            let payload = encode(parent.as_str(), &children)?;
            let tx = conn.transaction().map_err(unavailable)?;
            tx.execute(
                "INSERT OR REPLACE INTO children (parent_id, payload, written_at) VALUES (?1, ?2, ?3)",
                params![parent.as_str(), payload, written_at],
            )
            .map_err(unavailable)?;
            for child in &children {
                upsert_node(&tx, child, written_at)?;
            }
            tx.commit().map_err(unavailable)
        })
        .await
    }

    async fn set_references(
        &self,
        parent: &NodeId,
        references: &[OutgoingRef],
    ) -> Result<(), CacheError> {
        let parent = parent.clone();
        let payload = encode(parent.as_str(), references)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO refs (parent_id, payload, written_at) VALUES (?1, ?2, ?3)",
                params![parent.as_str(), payload, now_millis()],
            )
            .map_err(unavailable)?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute_batch("DELETE FROM nodes; DELETE FROM children; DELETE FROM refs;")
                .map_err(unavailable)
        })
        .await?;
        debug!("Node cache cleared");
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let ttl_ms = self.ttl.as_millis() as i64;
        self.with_conn(move |conn| {
            let cutoff = now_millis().saturating_sub(ttl_ms);
            let nodes = conn
                .execute("DELETE FROM nodes WHERE written_at < ?1", params![cutoff])
                .map_err(unavailable)?;
            let children = conn
                .execute("DELETE FROM children WHERE written_at < ?1", params![cutoff])
                .map_err(unavailable)?;
            let refs = conn
                .execute("DELETE FROM refs WHERE written_at < ?1", params![cutoff])
                .map_err(unavailable)?;
            Ok(nodes + children + refs)
        })
        .await
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
