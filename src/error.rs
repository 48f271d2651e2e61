//! Error taxonomy shared by the store, uploader, guard and transfer flow

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local path missing or unreadable. Raised before any remote call.
    #[error("local file {path:?} is not readable: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("object {key:?} does not exist")]
    NotFound { key: String },

    #[error("{operation} failed for {key:?}: {message}")]
    Remote {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// Terminal multipart failure, raised after the session was aborted.
    #[error("upload of {key:?} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: Box<Error>,
    },

    #[error("upload of {key:?} was aborted")]
    Aborted { key: String },

    #[error("failed to read source stream: {source}")]
    Read {
        #[source]
        source: io::Error,
    },

    #[error("part manifest incomplete: expected {expected} parts, received {received}")]
    Incomplete { expected: usize, received: usize },

    #[error("stream needs more than {limit} parts; raise the part size")]
    TooManyParts { limit: i32 },

    /// Writing downloaded bytes to a local sink failed
    #[error("failed to write local output: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    #[error("failed to render output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn remote(
        operation: &'static str,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Remote {
            operation,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }
}
