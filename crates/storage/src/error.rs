use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage key '{key}' is not a valid key"))]
    InvalidKey { stage: &'static str, key: String },
    #[snafu(display("failed to create storage directory at {path}"))]
    CreateStoreDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read stored value from {path}"))]
    ReadValue {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("stored value at {path} is not valid UTF-8"))]
    InvalidUtf8 {
        stage: &'static str,
        path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("failed to write stored value to {path}"))]
    WriteValue {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace {to} with {from}"))]
    ReplaceValue {
        stage: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
    #[snafu(display("in-memory store lock was poisoned on `{stage}`"))]
    LockPoisoned { stage: &'static str },
}

impl StorageError {
    /// Text of a value that was read but is not valid UTF-8, with invalid
    /// sequences replaced by U+FFFD.
    pub fn lossy_contents(&self) -> Option<String> {
        match self {
            Self::InvalidUtf8 { source, .. } => {
                Some(String::from_utf8_lossy(source.as_bytes()).into_owned())
            }
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
