//! Key-value persistence for serialized snapshots.
//!
//! Callers hand over an already serialized blob under a fixed key and get the
//! same text back on the next start. Nothing here knows what the blob contains.

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;

use snafu::ensure;

use error::InvalidKeySnafu;

/// Synchronous get/set of serialized text keyed by a namespace string.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key was never written.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Replaces the stored value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// Keys double as file names, so they are restricted to a portable alphabet.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_'));

    ensure!(
        valid,
        InvalidKeySnafu {
            stage: "validate-key",
            key: key.to_string(),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_namespaced_keys() {
        assert!(validate_key("chats").is_ok());
        assert!(validate_key("chats.unreadable").is_ok());
        assert!(validate_key("settings_v2-backup").is_ok());
    }

    #[test]
    fn rejects_keys_that_escape_the_directory() {
        assert!(validate_key("").is_err());
        assert!(validate_key("../chats").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b").is_err());
    }
}
