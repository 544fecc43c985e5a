use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{BlockStore, NewBlock, SearchPage, SearchQuery, StoreError};

#[derive(Debug, Clone)]
struct StoredBlock {
    seq: u64,
    label: String,
    body: Map<String, Value>,
}

/// In-process block store. Search results come back in insertion order.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blocks: Arc<RwLock<HashMap<String, StoredBlock>>>,
    next_seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    match key.split_once(':') {
        Some((label, id)) if !label.is_empty() && !id.is_empty() => Ok(()),
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

fn project(body: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    if fields.is_empty() {
        return body.clone();
    }
    fields
        .iter()
        .filter_map(|f| body.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn get_block(&self, key: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        validate_key(key)?;
        let blocks = self.blocks.read().await;
        Ok(blocks.get(key).map(|b| b.body.clone()))
    }

    async fn add_block(&self, block: NewBlock) -> Result<(), StoreError> {
        let key = block.key();
        validate_key(&key)?;

        let mut body = block.fields;
        body.insert("_id".into(), Value::String(block.id.clone()));
        body.insert("_label".into(), Value::String(block.label.clone()));
        body.insert(
            "_hosts".into(),
            Value::Array(block.hosts.into_iter().map(Value::String).collect()),
        );

        let mut blocks = self.blocks.write().await;
        if blocks.contains_key(&key) {
            return Err(StoreError::Conflict(key));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        blocks.insert(key.clone(), StoredBlock { seq, label: block.label, body });
        tracing::trace!("Added block {}", key);
        Ok(())
    }

    async fn update_block(&self, key: &str, update: Map<String, Value>) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut blocks = self.blocks.write().await;
        let stored = blocks
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        for (field, value) in update {
            // Identity fields are fixed at insert time
            if field == "_id" || field == "_label" {
                continue;
            }
            stored.body.insert(field, value);
        }
        Ok(())
    }

    async fn delete_block(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut blocks = self.blocks.write().await;
        blocks
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn search_find(&self, search: SearchQuery) -> Result<SearchPage, StoreError> {
        let blocks = self.blocks.read().await;

        let mut matches: Vec<&StoredBlock> = blocks
            .values()
            .filter(|b| b.label == search.label)
            .filter(|b| {
                search
                    .query
                    .iter()
                    .all(|(field, expected)| b.body.get(field) == Some(expected))
            })
            .collect();
        matches.sort_by_key(|b| b.seq);

        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(search.offset)
            .take(search.limit)
            .map(|b| project(&b.body, &search.fields))
            .collect();

        Ok(SearchPage { items, total })
    }
}
