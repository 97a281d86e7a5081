//! Content store seam.
//!
//! The pipeline persists cache records and textbook unit collections through
//! this trait. The store does no cross-key locking; callers serialize
//! generation per cache key and hold a write lock around reconciliation of a
//! learner's units. An unreadable persisted record is a miss, never an error
//! surfaced to the learner path.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tutoring::textbook::InstructionalUnit;

use crate::pipeline::ComposedUnit;

/// One cached synthesis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// `{learner_id}::{template_id}::{input_hash}`.
    pub cache_key: String,
    pub unit: ComposedUnit,
    pub created_at: DateTime<Utc>,
}

/// Infrastructure failures from the store seam.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a cache record. Unreadable records come back as `None`.
    async fn get_cache_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError>;
    async fn save_cache_record(&self, record: &CacheRecord) -> Result<(), StoreError>;
    async fn get_textbook_units(
        &self,
        learner_id: &str,
    ) -> Result<Vec<InstructionalUnit>, StoreError>;
    async fn save_textbook_units(
        &self,
        learner_id: &str,
        units: &[InstructionalUnit],
    ) -> Result<(), StoreError>;
}

/// In-memory store for tests and single-process deployments.
///
/// Records are held serialized, the way a persistent backend would hold
/// them, so corrupt-record degradation is exercised the same way.
#[derive(Default)]
pub struct InMemoryContentStore {
    cache: RwLock<HashMap<String, String>>,
    textbooks: RwLock<HashMap<String, String>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw cache record, bypassing serialization. Lets tests
    /// exercise unreadable-record handling.
    pub async fn seed_raw_cache_record(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.cache.write().await.insert(key.into(), raw.into());
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_cache_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let cache = self.cache.read().await;
        let Some(raw) = cache.get(key) else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheRecord>(raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                tracing::warn!(key, error = %err, "unreadable cache record treated as miss");
                Ok(None)
            }
        }
    }

    async fn save_cache_record(&self, record: &CacheRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        self.cache
            .write()
            .await
            .insert(record.cache_key.clone(), raw);
        Ok(())
    }

    async fn get_textbook_units(
        &self,
        learner_id: &str,
    ) -> Result<Vec<InstructionalUnit>, StoreError> {
        let textbooks = self.textbooks.read().await;
        let Some(raw) = textbooks.get(learner_id) else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<InstructionalUnit>>(raw) {
            Ok(units) => Ok(units),
            Err(err) => {
                tracing::warn!(
                    learner = learner_id,
                    error = %err,
                    "unreadable textbook collection treated as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save_textbook_units(
        &self,
        learner_id: &str,
        units: &[InstructionalUnit],
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(units)?;
        self.textbooks
            .write()
            .await
            .insert(learner_id.to_string(), raw);
        Ok(())
    }
}
