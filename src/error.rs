//! Error types for staging and remote synchronization.

use git2::{ErrorClass, ErrorCode};
use thiserror::Error;

/// The main error type for repository operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not authorized: {message}")]
    Authorization { message: String },

    #[error("No remote configured: {message}")]
    RemoteNotConfigured { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Invalid repository state: {message}")]
    RepositoryState { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("File not present at HEAD: {0}")]
    BlobNotFound(String),

    #[error("Branch operation failed: {message}")]
    Branch { message: String },

    #[error("Git error: {0}")]
    Git(git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Operation scheduler is no longer running")]
    SchedulerStopped,
}

/// Category of a [`SyncError`], used by controllers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    RemoteNotConfigured,
    Transport,
    RepositoryState,
    Conflict,
    BlobNotFound,
    Other,
}

impl SyncError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Authentication { .. } => ErrorKind::Authentication,
            SyncError::Authorization { .. } => ErrorKind::Authorization,
            SyncError::RemoteNotConfigured { .. } => ErrorKind::RemoteNotConfigured,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::RepositoryState { .. } => ErrorKind::RepositoryState,
            SyncError::Conflict { .. } => ErrorKind::Conflict,
            SyncError::BlobNotFound(_) => ErrorKind::BlobNotFound,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        SyncError::RepositoryState {
            message: message.into(),
        }
    }

    pub(crate) fn remote_not_configured(message: impl Into<String>) -> Self {
        SyncError::RemoteNotConfigured {
            message: message.into(),
        }
    }
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        let message = err.message().to_string();

        match err.code() {
            ErrorCode::Auth => return SyncError::Authentication { message },
            ErrorCode::Certificate => return SyncError::Transport { message },
            ErrorCode::Conflict | ErrorCode::Unmerged | ErrorCode::MergeConflict => {
                return SyncError::Conflict { message };
            }
            ErrorCode::Locked
            | ErrorCode::BareRepo
            | ErrorCode::UnbornBranch
            | ErrorCode::Uncommitted
            | ErrorCode::IndexDirty => return SyncError::RepositoryState { message },
            _ => {}
        }

        match err.class() {
            ErrorClass::Http if is_forbidden(&message) => SyncError::Authorization { message },
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
                SyncError::Transport { message }
            }
            _ => SyncError::Git(err),
        }
    }
}

fn is_forbidden(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("403") || lower.contains("not permitted") || lower.contains("forbidden")
}

/// A specialized Result type for repository operations.
pub type Result<T> = std::result::Result<T, SyncError>;
