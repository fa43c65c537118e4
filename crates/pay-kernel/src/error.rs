use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("failed to sign request: {0}")]
    Signing(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Transport(Box<dyn Error + Send + Sync + 'static>),
    #[error("downloaded content corrupted: expected {algorithm} {expected}, got {actual}")]
    Integrity {
        algorithm: &'static str,
        expected: String,
        actual: String,
    },
    #[error("file I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PaymentError>;

impl PaymentError {
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::Transport(error.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Local write failure on a transport's sink.
    ///
    /// The transport does not know where the sink lives; the path is left
    /// empty for [`at_path`](Self::at_path) to fill in.
    pub fn sink(source: io::Error) -> Self {
        Self::io(PathBuf::new(), source)
    }

    /// Attaches `path` to an I/O fault that does not name one yet.
    pub(crate) fn at_path(self, path: &Path) -> Self {
        match self {
            Self::Io { path: empty, source } if empty.as_os_str().is_empty() => {
                Self::io(path, source)
            }
            other => other,
        }
    }

    /// Whether repeating the whole call may succeed without operator action.
    ///
    /// Only network and local I/O faults qualify. Integrity faults require a
    /// fresh download, which the caller has to start from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io { .. })
    }
}
