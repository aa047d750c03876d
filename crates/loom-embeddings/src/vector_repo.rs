//! `SQLite`-backed [`SemanticIndex`] with brute-force cosine ranking.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::errors::{EmbeddingError, Result};
use crate::index::{Document, DocumentMetadata, SearchHit, SearchRequest, SemanticIndex};
use crate::normalize::cosine_similarity;
use crate::service::EmbeddingService;

/// Hits returned when a request leaves `limit` at zero.
const DEFAULT_LIMIT: usize = 10;

/// Convert an f32 slice to a byte blob for storage.
pub fn f32_slice_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a byte blob back to an f32 vector.
pub fn blob_to_f32_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Semantic index storing documents and their vectors in `SQLite`.
///
/// Every search loads the collection's vectors and ranks them in memory.
/// Suited to conversation-sized collections, not corpora.
pub struct SqliteSemanticIndex {
    conn: Mutex<Connection>,
    service: Arc<dyn EmbeddingService>,
}

impl SqliteSemanticIndex {
    /// Wrap an open connection, creating tables if needed.
    pub fn new(conn: Connection, service: Arc<dyn EmbeddingService>) -> Result<Self> {
        let index = Self {
            conn: Mutex::new(conn),
            service,
        };
        index.ensure_tables()?;
        Ok(index)
    }

    /// Index in a private in-memory database.
    pub fn in_memory(service: Arc<dyn EmbeddingService>) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, service)
    }

    /// Index in the database file at `path`.
    pub fn open(path: impl AsRef<Path>, service: Arc<dyn EmbeddingService>) -> Result<Self> {
        Self::new(Connection::open(path)?, service)
    }

    fn ensure_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, doc_id)
            );",
        )?;
        Ok(())
    }

    fn collection_exists(conn: &Connection, collection: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![collection],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_rows(
        conn: &Connection,
        collection: &str,
    ) -> Result<Vec<(String, String, String, Vec<u8>)>> {
        let mut stmt = conn.prepare(
            "SELECT doc_id, text, metadata, embedding FROM documents WHERE collection = ?1",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn rank(
        query: &[f32],
        rows: Vec<(String, String, String, Vec<u8>)>,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        let limit = if request.limit == 0 {
            DEFAULT_LIMIT
        } else {
            request.limit
        };

        let mut hits = Vec::new();
        for (id, text, metadata, blob) in rows {
            let metadata: DocumentMetadata = serde_json::from_str(&metadata)?;
            if !metadata.matches(&request.filter) {
                continue;
            }
            let score = cosine_similarity(query, &blob_to_f32_vec(&blob));
            if request.min_score.is_some_and(|min| score < min) {
                continue;
            }
            hits.push(SearchHit {
                id,
                score,
                text,
                metadata,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl SemanticIndex for SqliteSemanticIndex {
    async fn index_document(&self, collection: &str, document: Document) -> Result<()> {
        let embedding = self.service.embed_single(&document.text).await?;
        if embedding.len() != self.service.dimensions() {
            return Err(EmbeddingError::Storage(format!(
                "dimension mismatch: expected {}, got {}",
                self.service.dimensions(),
                embedding.len()
            )));
        }
        let metadata = serde_json::to_string(&document.metadata)?;

        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            params![collection],
        )?;
        let _ = conn.execute(
            "INSERT OR REPLACE INTO documents (collection, doc_id, text, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                collection,
                document.id,
                document.text,
                metadata,
                f32_slice_to_blob(&embedding)
            ],
        )?;
        debug!(collection, doc_id = %document.id, "indexed document");
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        if request.query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = self.service.embed_single(&request.query).await?;
        let rows = Self::load_rows(&self.conn.lock(), &request.collection)?;
        Self::rank(&query, rows, request)
    }

    async fn clear_collection(&self, collection: &str) -> Result<()> {
        let removed = self.conn.lock().execute(
            "DELETE FROM documents WHERE collection = ?1",
            params![collection],
        )?;
        debug!(collection, removed, "cleared collection");
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let conn = self.conn.lock();
        if !Self::collection_exists(&conn, collection)? {
            return Err(EmbeddingError::CollectionNotFound(collection.to_owned()));
        }
        let _ = conn.execute(
            "DELETE FROM documents WHERE collection = ?1",
            params![collection],
        )?;
        let _ = conn.execute("DELETE FROM collections WHERE name = ?1", params![collection])?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    async fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        if !Self::collection_exists(&conn, collection)? {
            return Err(EmbeddingError::CollectionNotFound(collection.to_owned()));
        }
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
