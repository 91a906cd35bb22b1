use crate::errors::{AppError, AppResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Host key-value persistence with optional expiry.
///
/// `get` returns `None` when nothing is stored (or the entry expired) and
/// `Some(Value::Bool(false))` when `false` itself was stored.
pub trait TransientStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Value>>;
    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<bool>;
    fn delete(&self, key: &str) -> AppResult<bool>;
}

#[derive(Debug)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

/// Process-local store used when no database is attached.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl TransientStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut entries = self.lock()?;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry
                .expires_at
                .map(|at| at <= Instant::now())
                .unwrap_or(false),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<bool> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.clone(),
                expires_at: ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        let mut entries = self.lock()?;
        Ok(entries.remove(key).is_some())
    }
}
