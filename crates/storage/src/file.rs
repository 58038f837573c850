use std::path::{Path, PathBuf};

use snafu::ResultExt;

use super::error::{
    CreateStoreDirectorySnafu, InvalidUtf8Snafu, ReadValueSnafu, ReplaceValueSnafu, StorageResult,
    WriteValueSnafu,
};
use super::{KeyValueStore, validate_key};

const VALUE_EXTENSION: &str = "json";
const TEMPORARY_EXTENSION: &str = "json.tmp";

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{VALUE_EXTENSION}"))
    }

    fn ensure_root(&self) -> StorageResult<()> {
        if self.root.as_os_str().is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.root).context(CreateStoreDirectorySnafu {
            stage: "create-store-directory",
            path: display_path(&self.root),
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let path = self.value_path(key);

        match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes).map(Some).context(InvalidUtf8Snafu {
                stage: "decode-value-text",
                path: display_path(&path),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key, path = %path.display(), "no stored value yet");
                Ok(None)
            }
            Err(source) => Err(source).context(ReadValueSnafu {
                stage: "read-value",
                path: display_path(&path),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.ensure_root()?;

        let path = self.value_path(key);
        let temp_path = self.root.join(format!("{key}.{TEMPORARY_EXTENSION}"));

        // Readers only ever see the old file or the complete new one.
        std::fs::write(&temp_path, value).context(WriteValueSnafu {
            stage: "write-temporary-value",
            path: display_path(&temp_path),
        })?;
        std::fs::rename(&temp_path, &path).context(ReplaceValueSnafu {
            stage: "rename-temporary-value",
            from: display_path(&temp_path),
            to: display_path(&path),
        })?;

        tracing::trace!(key, bytes = value.len(), "stored value");
        Ok(())
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
