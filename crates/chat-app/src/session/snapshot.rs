use std::sync::Arc;

use mentii_storage::{KeyValueStore, StorageError};
use serde::Serialize;
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::chat::Chat;

/// Key holding the serialized chat list.
pub const CHATS_KEY: &str = "chats";
/// Key receiving a copy of a snapshot that could not be decoded.
pub const UNREADABLE_CHATS_KEY: &str = "chats.unreadable";
/// Version written by [`encode`].
pub const SNAPSHOT_VERSION: u64 = 1;
/// Version assigned to the bare-array layout written before envelopes existed.
pub const LEGACY_SNAPSHOT_VERSION: u64 = 0;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SnapshotError {
    #[snafu(display("failed to serialize chat snapshot"))]
    Serialize {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("chat snapshot is not valid JSON"))]
    ParseJson {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("chat snapshot has an unexpected {found} at the top level"))]
    UnexpectedShape {
        stage: &'static str,
        found: &'static str,
    },
    #[snafu(display("chat snapshot version {found:?} is not supported (newest known is {supported})"))]
    UnsupportedVersion {
        stage: &'static str,
        found: Option<u64>,
        supported: u64,
    },
    #[snafu(display("failed to decode chats from snapshot version {version}"))]
    DecodeChats {
        stage: &'static str,
        version: u64,
        source: serde_json::Error,
    },
    #[snafu(display("snapshot storage failed on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: StorageError,
    },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Serialize)]
struct SnapshotEnvelope<'a> {
    version: u64,
    chats: &'a [Chat],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSnapshot {
    pub version: u64,
    pub chats: Vec<Chat>,
}

pub fn encode(chats: &[Chat]) -> SnapshotResult<String> {
    serde_json::to_string(&SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        chats,
    })
    .context(SerializeSnafu {
        stage: "encode-snapshot",
    })
}

/// Decodes either the versioned envelope or the legacy bare array.
pub fn decode(raw: &str) -> SnapshotResult<DecodedSnapshot> {
    let value = serde_json::from_str::<Value>(raw).context(ParseJsonSnafu {
        stage: "decode-snapshot-json",
    })?;

    let (version, chats) = match value {
        Value::Array(chats) => (LEGACY_SNAPSHOT_VERSION, Value::Array(chats)),
        Value::Object(mut envelope) => {
            let version = envelope.get("version").and_then(Value::as_u64);
            let Some(version) = version.filter(|version| *version <= SNAPSHOT_VERSION) else {
                return UnsupportedVersionSnafu {
                    stage: "decode-snapshot-version",
                    found: version,
                    supported: SNAPSHOT_VERSION,
                }
                .fail();
            };
            (version, envelope.remove("chats").unwrap_or(Value::Null))
        }
        other => {
            return UnexpectedShapeSnafu {
                stage: "decode-snapshot-shape",
                found: value_kind(&other),
            }
            .fail();
        }
    };

    let chats = serde_json::from_value::<Vec<Chat>>(chats).context(DecodeChatsSnafu {
        stage: "decode-snapshot-chats",
        version,
    })?;

    Ok(DecodedSnapshot { version, chats })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of reading the persisted chat list at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedChats {
    Missing,
    Decoded(DecodedSnapshot),
    /// The stored blob could not be decoded and was copied to [`UNREADABLE_CHATS_KEY`].
    Quarantined { reason: String },
}

impl LoadedChats {
    pub fn into_chats(self) -> Vec<Chat> {
        match self {
            Self::Decoded(snapshot) => snapshot.chats,
            Self::Missing | Self::Quarantined { .. } => Vec::new(),
        }
    }
}

/// Glue between the chat list and a key-value backend.
#[derive(Clone)]
pub struct SnapshotPersistence {
    backend: Arc<dyn KeyValueStore>,
}

impl SnapshotPersistence {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Reads and decodes the chat list.
    ///
    /// Read failures are returned so callers never start empty and overwrite data
    /// they could not see. Decode failures keep a copy of the raw text first.
    pub fn load(&self) -> SnapshotResult<LoadedChats> {
        let raw = match self.backend.get(CHATS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(LoadedChats::Missing),
            Err(error) => match error.lossy_contents() {
                // Bytes that are not text cannot be a snapshot either.
                Some(contents) => return self.quarantine(&contents, &error),
                None => {
                    return Err(error).context(BackendSnafu {
                        stage: "load-snapshot",
                    });
                }
            },
        };

        match decode(&raw) {
            Ok(snapshot) => {
                if snapshot.version < SNAPSHOT_VERSION {
                    tracing::info!(
                        from_version = snapshot.version,
                        to_version = SNAPSHOT_VERSION,
                        chat_count = snapshot.chats.len(),
                        "loaded older chat snapshot; it will be rewritten on next save"
                    );
                }
                Ok(LoadedChats::Decoded(snapshot))
            }
            Err(error) => self.quarantine(&raw, &error),
        }
    }

    fn quarantine(
        &self,
        raw: &str,
        reason: &dyn std::fmt::Display,
    ) -> SnapshotResult<LoadedChats> {
        self.backend
            .set(UNREADABLE_CHATS_KEY, raw)
            .context(BackendSnafu {
                stage: "quarantine-snapshot",
            })?;
        tracing::warn!(
            error = %reason,
            quarantine_key = UNREADABLE_CHATS_KEY,
            "chat snapshot could not be decoded; starting with an empty chat list"
        );
        Ok(LoadedChats::Quarantined {
            reason: reason.to_string(),
        })
    }

    pub fn save(&self, chats: &[Chat]) -> SnapshotResult<()> {
        let serialized = encode(chats)?;
        self.backend
            .set(CHATS_KEY, &serialized)
            .context(BackendSnafu {
                stage: "save-snapshot",
            })
    }
}
