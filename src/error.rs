use std::path::PathBuf;
use thiserror::Error;

/// The error taxonomy for the transfer engine. Each variant is one of the
/// kinds named in the specification's error handling design; the payload is
/// whatever context is needed to log something actionable.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("ambiguous date match for {0} name(s): {}", .0.join(", "))]
    AmbiguousDate(Vec<String>),

    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("another run is already in progress (live lock found at {0})")]
    AlreadyRunning(PathBuf),

    #[error("verification failed for {item}: {detail}")]
    Verification { item: String, detail: String },

    #[error("local filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
