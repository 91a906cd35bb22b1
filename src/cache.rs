use crate::errors::{AppError, AppResult};
use crate::store::TransientStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const CACHE_KEY_PREFIX: &str = "kipro_";
pub const MAX_KEY_LENGTH: usize = 172;
pub const HASH_LENGTH: usize = 8;

/// Namespaced, length-capped view over a [`TransientStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn TransientStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn TransientStore>) -> Self {
        Self { store }
    }

    /// Returns `None` for invalid keys and missing entries, and the stored
    /// value otherwise (including a stored `false`).
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = sanitize_key(key);
        if key.is_empty() {
            return None;
        }

        match self.store.get(&key) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "cache read failed");
                None
            }
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                tracing::debug!(key = %key, error = %error, "cached value has unexpected shape");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &Value, ttl: Duration) -> AppResult<bool> {
        let key = checked_key(key)?;
        self.store.set(&key, value, Some(ttl))
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> AppResult<bool> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, ttl)
    }

    pub fn delete(&self, key: &str) -> AppResult<bool> {
        let key = checked_key(key)?;
        self.store.delete(&key)
    }
}

fn checked_key(key: &str) -> AppResult<String> {
    let sanitized = sanitize_key(key);
    if sanitized.is_empty() {
        return Err(AppError::TransientStore(format!("invalid cache key {:?}", key)));
    }
    Ok(sanitized)
}

/// Lowercases, keeps `[a-z0-9_-]`, prefixes the namespace and caps the length
/// at [`MAX_KEY_LENGTH`], replacing the tail with `_` plus a content hash when
/// the key is too long. Returns an empty string for keys with no usable
/// characters.
pub fn sanitize_key(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();
    if sanitized.is_empty() {
        return sanitized;
    }

    if !sanitized.starts_with(CACHE_KEY_PREFIX) {
        sanitized.insert_str(0, CACHE_KEY_PREFIX);
    }

    if sanitized.len() > MAX_KEY_LENGTH {
        let digest = hex::encode(Sha256::digest(sanitized.as_bytes()));
        let keep = MAX_KEY_LENGTH - HASH_LENGTH - 1;
        sanitized.truncate(keep);
        sanitized.push('_');
        sanitized.push_str(&digest[..HASH_LENGTH]);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::{sanitize_key, Cache, CACHE_KEY_PREFIX, MAX_KEY_LENGTH};
    use crate::errors::{AppError, AppResult};
    use crate::store::{MemoryStore, TransientStore};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    impl TransientStore for CountingStore {
        fn get(&self, key: &str) -> AppResult<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl)
        }

        fn delete(&self, key: &str) -> AppResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key)
        }
    }

    #[test]
    fn keys_are_normalized_and_prefixed() {
        assert_eq!(sanitize_key("Report Cache!"), "kipro_reportcache");
        assert_eq!(sanitize_key("kipro_already"), "kipro_already");
        assert_eq!(sanitize_key("!!!"), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let long = "k".repeat(400);
        for key in ["Mixed-Case_key", "kipro_x", long.as_str(), "a b c"] {
            let once = sanitize_key(key);
            assert_eq!(sanitize_key(&once), once, "key {:?}", key);
        }
    }

    #[test]
    fn long_keys_are_capped_with_distinct_suffixes() {
        let shared = "x".repeat(300);
        let first = sanitize_key(&format!("{}one", shared));
        let second = sanitize_key(&format!("{}two", shared));
        assert_eq!(first.len(), MAX_KEY_LENGTH);
        assert_eq!(second.len(), MAX_KEY_LENGTH);
        assert!(first.starts_with(CACHE_KEY_PREFIX));
        assert_ne!(first, second);
        assert_eq!(first.as_bytes()[MAX_KEY_LENGTH - 9], b'_');
    }

    #[test]
    fn stored_false_is_returned_as_false() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        cache.set("flag", &json!(false), Duration::from_secs(60)).expect("set");
        assert_eq!(cache.get("flag"), Some(json!(false)));
        assert_eq!(cache.get("unset"), None);
    }

    #[test]
    fn invalid_keys_never_touch_the_store() {
        let store = Arc::new(CountingStore::default());
        let cache = Cache::new(store.clone());

        assert_eq!(cache.get("???"), None);
        let err = cache
            .set("", &json!(1), Duration::from_secs(1))
            .expect_err("empty key rejected");
        assert!(matches!(err, AppError::TransientStore(_)));
        assert!(cache.delete("%%").is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn typed_round_trip_through_cache() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        cache
            .set_as("words", &vec!["seo".to_string()], Duration::from_secs(60))
            .expect("set");
        let words: Option<Vec<String>> = cache.get_as("words");
        assert_eq!(words, Some(vec!["seo".to_string()]));
        assert!(cache.delete("words").expect("delete"));
        assert_eq!(cache.get("words"), None);
    }
}
