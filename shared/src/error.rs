use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{EntityKind, ValidationError};
use crate::ordering::OrderingError;
use crate::remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Fetch,
    Insert,
    Update,
    Delete,
    Reorder,
    UploadImage,
    RemoveImage,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Reorder => "reorder",
            Self::UploadImage => "upload image",
            Self::RemoveImage => "remove image",
        })
    }
}

/// Error returned by store operations. Remote variants are only produced after
/// the local state has already been restored.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{operation} of {kind} {id} failed: {source}")]
    Remote {
        kind: EntityKind,
        operation: Operation,
        id: String,
        #[source]
        source: RemoteError,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("{kind} {id} was deleted but the follow-up {operation} failed: {source}")]
    PartialCascade {
        kind: EntityKind,
        id: String,
        operation: Operation,
        #[source]
        source: RemoteError,
    },

    #[error("debounced writes need a running Tokio runtime")]
    NoRuntime,
}

impl SyncError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True when the failure came from the remote store (and was rolled back).
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::PartialCascade { .. })
    }
}
