// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based storage for corpus documents.
//!
//! The `embedding` column is declared without a type so that SQLite keeps
//! whatever encoding a row was written with: BLOBs of little-endian `f32`
//! written by `ragmatch ingest`, or TEXT arrays written by other tools.

use anyhow::{anyhow, Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{CorpusRow, CorpusStore, StoredEmbedding};
use crate::utils::{CORPUS_DB, INDEX_DIR};

/// Input document data for bulk writes.
pub struct DocumentInput<'a> {
    pub doc_id: &'a str,
    pub title: &'a str,
    pub text_chunk: &'a str,
    pub embedding: &'a StoredEmbedding,
}

/// SQLite-based corpus store.
///
/// Stores documents in `.ragmatch/corpus.sqlite` by default.
pub struct CorpusStorage {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl CorpusStorage {
    /// Opens or creates a corpus at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let storage = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Opens the corpus in the default location under a root directory.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(INDEX_DIR).join(CORPUS_DB))
    }

    /// Opens a throwaway in-memory corpus.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let storage = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                text_chunk TEXT NOT NULL,
                embedding,
                created_at INTEGER NOT NULL
            );
            "#,
            )
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("corpus connection lock poisoned"))
    }

    /// Returns the path to the database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Inserts or replaces documents in a single transaction.
    pub fn upsert_documents(&self, documents: &[DocumentInput<'_>]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO documents (doc_id, title, text_chunk, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(doc_id) DO UPDATE SET
                    title = excluded.title,
                    text_chunk = excluded.text_chunk,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at
                "#,
            )?;

            for doc in documents {
                match doc.embedding {
                    StoredEmbedding::Native(values) => stmt.execute(params![
                        doc.doc_id,
                        doc.title,
                        doc.text_chunk,
                        StoredEmbedding::to_blob(values),
                        created_at
                    ])?,
                    StoredEmbedding::Blob(bytes) => stmt.execute(params![
                        doc.doc_id,
                        doc.title,
                        doc.text_chunk,
                        bytes,
                        created_at
                    ])?,
                    StoredEmbedding::Text(text) => stmt.execute(params![
                        doc.doc_id,
                        doc.title,
                        doc.text_chunk,
                        text,
                        created_at
                    ])?,
                    StoredEmbedding::Missing => stmt.execute(params![
                        doc.doc_id,
                        doc.title,
                        doc.text_chunk,
                        Option::<Vec<u8>>::None,
                        created_at
                    ])?,
                };
            }
        }

        tx.commit()?;
        Ok(documents.len())
    }

    /// Checks whether a document id is already present.
    pub fn contains(&self, doc_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT 1 FROM documents WHERE doc_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query document")?;
        Ok(found.is_some())
    }

    /// Counts stored documents.
    pub fn count_documents(&self) -> Result<u64> {
        let count: i64 =
            self.lock()?
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Deletes all documents and metadata. Returns the number of documents removed.
    pub fn clear_all(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM documents", [])
            .context("Failed to clear documents")?;
        conn.execute("DELETE FROM meta", [])
            .context("Failed to clear meta")?;
        Ok(removed)
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock()?
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to get meta")?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<CorpusRow> {
        let embedding = match row.get_ref(3)? {
            ValueRef::Blob(bytes) => StoredEmbedding::Blob(bytes.to_vec()),
            ValueRef::Text(text) => {
                StoredEmbedding::Text(String::from_utf8_lossy(text).into_owned())
            }
            ValueRef::Null | ValueRef::Integer(_) | ValueRef::Real(_) => StoredEmbedding::Missing,
        };
        Ok(CorpusRow {
            id: row.get(0)?,
            title: row.get(1)?,
            text_chunk: row.get(2)?,
            embedding,
        })
    }
}

impl CorpusStore for CorpusStorage {
    fn scan(&self, limit: usize) -> Result<Vec<CorpusRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT doc_id, title, text_chunk, embedding
            FROM documents
            ORDER BY rowid
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map(params![limit as i64], Self::read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to scan documents")?;
        Ok(rows)
    }

    fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CorpusRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT doc_id, title, text_chunk, embedding FROM documents WHERE doc_id IN ({}) ORDER BY rowid",
            placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), Self::read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to fetch documents")?;
        Ok(rows)
    }
}
