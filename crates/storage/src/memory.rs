use std::collections::HashMap;
use std::sync::Mutex;

use super::error::{LockPoisonedSnafu, StorageResult};
use super::{KeyValueStore, validate_key};

/// Process-local store; values vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store that already holds one value, mostly for restoring fixtures.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.into(), value.into());
        }
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let values = self.values.lock().map_err(|_| {
            LockPoisonedSnafu {
                stage: "memory-get",
            }
            .build()
        })?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        let mut values = self.values.lock().map_err(|_| {
            LockPoisonedSnafu {
                stage: "memory-set",
            }
            .build()
        })?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
