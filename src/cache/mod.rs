use crate::aggregation::Step;
use crate::types::{Table, Value};
use chrono::Datelike;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Memoizes derived tables by content hash of (source version, operation, arguments)
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<String, Arc<Table>>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key, counting the hit or miss
    pub fn get(&mut self, key: &str) -> Option<Arc<Table>> {
        match self.entries.get(key) {
            Some(table) => {
                self.hits += 1;
                debug!("cache hit {}", &key[..key.len().min(12)]);
                Some(Arc::clone(table))
            }
            None => {
                self.misses += 1;
                debug!("cache miss {}", &key[..key.len().min(12)]);
                None
            }
        }
    }

    /// Look up a key without touching the counters
    pub fn peek(&self, key: &str) -> Option<Arc<Table>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, table: Arc<Table>) {
        self.entries.insert(key, table);
    }

    /// Drop every entry; returns how many were dropped
    pub fn invalidate(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// Hash a source version and a chain of query steps into a cache key.
///
/// JSON writes every non-finite number as `null`, so key values are also
/// hashed bit for bit. Returns `None` when a step cannot be serialized; such
/// queries are computed without caching.
pub fn cache_key(version: &str, steps: &[Step]) -> Option<String> {
    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    hasher.update([0u8]);
    for step in steps {
        serde_json::to_writer(&mut hasher, step).ok()?;
        if let Step::Key { value, .. } = step {
            hash_value(&mut hasher, value);
        }
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Content version of a table: SHA-256 over its schema and every cell
pub fn table_version(table: &Table) -> String {
    let mut hasher = Sha256::new();
    for column in table.schema().columns() {
        hasher.update((column.name.len() as u64).to_le_bytes());
        hasher.update(column.name.as_bytes());
        hasher.update(column.ty.to_string().as_bytes());
        hasher.update([0u8]);
    }
    hasher.update((table.len() as u64).to_le_bytes());
    for row in table.rows() {
        for value in row {
            hash_value(&mut hasher, value);
        }
    }
    format!("{:x}", hasher.finalize())
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Missing => hasher.update([0u8]),
        Value::Text(s) => {
            hasher.update([1u8]);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Number(n) => {
            hasher.update([2u8]);
            hasher.update(n.to_bits().to_le_bytes());
        }
        Value::Integer(i) => {
            hasher.update([3u8]);
            hasher.update(i.to_le_bytes());
        }
        Value::Date(d) => {
            hasher.update([4u8]);
            hasher.update(d.num_days_from_ce().to_le_bytes());
        }
        Value::Bool(b) => hasher.update([5u8, u8::from(*b)]),
    }
}
