// Document block store used by the entity modules.
//
// Blocks are JSON objects addressed as `label:id`. A block may be hosted under
// other blocks (a classroom under its school, a student under school and
// classroom); hosts are kept alongside the block as `_hosts`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors from a BlockStore
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Block not found: {0}")]
    NotFound(String),

    #[error("Block already exists: {0}")]
    Conflict(String),

    #[error("Invalid block key: {0}")]
    InvalidKey(String),
}

/// A block to insert. `fields` must not contain the reserved `_` keys;
/// they are filled in by the store.
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub label: String,
    pub id: String,
    pub hosts: Vec<String>,
    pub fields: Map<String, Value>,
}

impl NewBlock {
    pub fn new(label: impl Into<String>, id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
            hosts: Vec::new(),
            fields,
        }
    }

    pub fn hosted_by(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn key(&self) -> String {
        block_key(&self.label, &self.id)
    }
}

/// Equality search within one label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub label: String,
    pub query: Map<String, Value>,
    /// Projection; empty means every field
    pub fields: Vec<String>,
    pub limit: usize,
    pub offset: usize,
}

impl SearchQuery {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: Map::new(),
            fields: Vec::new(),
            limit: 20,
            offset: 0,
        }
    }

    pub fn matching(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.query.insert(field.to_string(), value.into());
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<Map<String, Value>>,
    /// Number of matches before paging
    pub total: usize,
}

/// Persistence operations consumed by the entity modules
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get_block(&self, key: &str) -> Result<Option<Map<String, Value>>, StoreError>;

    async fn add_block(&self, block: NewBlock) -> Result<(), StoreError>;

    /// Merge `update` into an existing block. A `_hosts` entry replaces the hosts.
    async fn update_block(&self, key: &str, update: Map<String, Value>) -> Result<(), StoreError>;

    async fn delete_block(&self, key: &str) -> Result<(), StoreError>;

    async fn search_find(&self, search: SearchQuery) -> Result<SearchPage, StoreError>;
}

pub fn block_key(label: &str, id: &str) -> String {
    format!("{}:{}", label, id)
}
