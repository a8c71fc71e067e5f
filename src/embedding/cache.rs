//! Persistent embedding cache
//!
//! SQLite-backed text→vector cache keyed by (text hash, model name), so
//! re-indexing an unchanged corpus never recomputes embeddings.

use crate::embedding::Embedding;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

pub struct EmbeddingCache {
    conn: Connection,
    model_name: String,
}

impl EmbeddingCache {
    pub fn new(db_path: &Path, model_name: String) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open embedding cache: {:?}", db_path))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS embeddings (
                id INTEGER PRIMARY KEY,
                text_hash TEXT NOT NULL,
                model_name TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(text_hash, model_name)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_hash_model
             ON embeddings(text_hash, model_name)",
            [],
        )?;

        Ok(Self { conn, model_name })
    }

    fn hash_text(text: &str) -> String {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    fn to_bytes(embedding: &Embedding) -> Vec<u8> {
        embedding.iter().flat_map(|&f| f.to_le_bytes()).collect()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Embedding> {
        if bytes.len() % 4 != 0 {
            anyhow::bail!("Corrupt embedding blob ({} bytes)", bytes.len());
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn get(&self, text: &str) -> Result<Option<Embedding>> {
        let mut stmt = self.conn.prepare(
            "SELECT embedding FROM embeddings WHERE text_hash = ?1 AND model_name = ?2",
        )?;
        let row = stmt.query_row(params![Self::hash_text(text), self.model_name], |row| {
            row.get::<_, Vec<u8>>(0)
        });

        match row {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn put(&self, text: &str, embedding: &Embedding) -> Result<()> {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs() as i64;

        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (text_hash, model_name, embedding, dimension, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Self::hash_text(text),
                self.model_name,
                Self::to_bytes(embedding),
                embedding.len() as i64,
                created_at
            ],
        )?;
        Ok(())
    }

    /// Return the cached embedding or compute and store it.
    pub fn get_or_compute<F>(&self, text: &str, compute: F) -> Result<Embedding>
    where
        F: FnOnce(&str) -> Result<Embedding>,
    {
        if let Some(embedding) = self.get(text)? {
            return Ok(embedding);
        }
        let embedding = compute(text)?;
        self.put(text, &embedding)?;
        Ok(embedding)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
        let model: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE model_name = ?1",
            params![self.model_name],
            |r| r.get(0),
        )?;

        Ok(CacheStats {
            total_entries: total as usize,
            model_entries: model as usize,
        })
    }

    /// Drop all entries for the current model. Returns the deleted count.
    pub fn clear_model(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM embeddings WHERE model_name = ?1",
            params![self.model_name],
        )?)
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub model_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn cache() -> (NamedTempFile, EmbeddingCache) {
        let file = NamedTempFile::new().unwrap();
        let cache = EmbeddingCache::new(file.path(), "test-model".to_string()).unwrap();
        (file, cache)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_f, cache) = cache();
        assert!(cache.get("hello").unwrap().is_none());

        let emb = vec![1.0, -2.5, 3.25];
        cache.put("hello", &emb).unwrap();
        assert_eq!(cache.get("hello").unwrap().unwrap(), emb);
    }

    #[test]
    fn test_get_or_compute_only_computes_once() {
        let (_f, cache) = cache();
        let mut calls = 0;

        let emb = cache
            .get_or_compute("text", |_| {
                calls += 1;
                Ok(vec![4.0, 5.0])
            })
            .unwrap();
        assert_eq!(emb, vec![4.0, 5.0]);
        assert_eq!(calls, 1);

        let again = cache
            .get_or_compute("text", |_| {
                calls += 1;
                Ok(vec![0.0])
            })
            .unwrap();
        assert_eq!(again, vec![4.0, 5.0]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_stats_and_clear() {
        let (_f, cache) = cache();
        cache.put("a", &vec![1.0]).unwrap();
        cache.put("b", &vec![2.0]).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.model_entries, 2);

        assert_eq!(cache.clear_model().unwrap(), 2);
        assert!(cache.get("a").unwrap().is_none());
    }
}
