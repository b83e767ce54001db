//! Per-context local storage.

use crate::core::Value;
use crate::errors::LocalConflictError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key/value storage private to one execution context.
///
/// Every context starts with its own bag; a context spawned with
/// inherited locals starts from a copy of its spawner's bag. `set` refuses
/// to overwrite an existing key, `replace` does not.
#[derive(Debug, Default)]
pub struct LocalBag {
    data: RwLock<HashMap<String, Value>>,
}

impl LocalBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a new key.
    ///
    /// # Errors
    ///
    /// Returns `LocalConflictError` if the key already exists.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), LocalConflictError> {
        let key = key.into();
        let mut data = self.data.write();

        if data.contains_key(&key) {
            return Err(LocalConflictError::new(key));
        }

        data.insert(key, value);
        Ok(())
    }

    /// Sets a value, returning the one it replaced.
    pub fn replace(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Removes a key.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Clone for LocalBag {
    fn clone(&self) -> Self {
        Self::from_data(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let bag = LocalBag::new();
        bag.set("request", json!("abc")).unwrap();

        assert_eq!(bag.get("request"), Some(json!("abc")));
        assert!(bag.contains_key("request"));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_set_conflict() {
        let bag = LocalBag::new();
        bag.set("k", json!(1)).unwrap();

        let err = bag.set("k", json!(2)).unwrap_err();
        assert_eq!(err.key, "k");
        assert_eq!(bag.get("k"), Some(json!(1)));
    }

    #[test]
    fn test_replace_and_remove() {
        let bag = LocalBag::new();
        assert_eq!(bag.replace("k", json!(1)), None);
        assert_eq!(bag.replace("k", json!(2)), Some(json!(1)));
        assert_eq!(bag.remove("k"), Some(json!(2)));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let bag = LocalBag::new();
        bag.set("a", json!(true)).unwrap();

        let copy = bag.clone();
        copy.replace("a", json!(false));
        copy.set("b", json!(null)).unwrap();

        assert_eq!(bag.get("a"), Some(json!(true)));
        assert_eq!(bag.keys(), vec!["a".to_string()]);
        assert_eq!(copy.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
