use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file {path:?} has wrong length: expected {expected}, found {actual}")]
    LengthMismatch { path: PathBuf, expected: u64, actual: u64 },

    #[error("malformed descriptor{}: {reason}", .path.as_ref().map(|p| format!(" {p:?}")).unwrap_or_default())]
    Decode { path: Option<PathBuf>, reason: String },

    #[error("cannot encode descriptor: {0}")]
    Encode(String),

    #[error("read of {len} bytes at offset {offset} outside span of {total} bytes")]
    OutOfRange { offset: u64, len: u64, total: u64 },

    #[error("unsafe path {path:?}: {reason}")]
    UnsafePath { path: PathBuf, reason: &'static str },

    #[error("piece length must be non-zero")]
    InvalidPieceLength,

    #[error("no content to describe under {0:?}")]
    EmptyContent(PathBuf),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn decode(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Decode { path, reason: reason.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
