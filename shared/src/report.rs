//! Failure surface.
//!
//! Remote failures never escape as panics; they are logged and published here
//! so a shell can show that an optimistic change was reverted.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::error;

use crate::error::{Operation, SyncError};
use crate::model::{EntityKind, UnixTimeMs};
use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub kind: EntityKind,
    pub operation: Operation,
    pub entity_id: String,
    pub message: String,
    pub at: UnixTimeMs,
}

#[derive(Clone, Debug)]
pub struct FailureReporter {
    tx: broadcast::Sender<SyncFailure>,
}

impl FailureReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncFailure> {
        self.tx.subscribe()
    }

    pub fn publish(&self, failure: SyncFailure) {
        error!(
            kind = %failure.kind,
            operation = %failure.operation,
            entity_id = %failure.entity_id,
            "{}",
            failure.message
        );
        // No subscribers is fine; the log line above is the record.
        let _ = self.tx.send(failure);
    }

    /// Report a remote failure whose local effects were rolled back.
    pub fn remote_failure(
        &self,
        kind: EntityKind,
        operation: Operation,
        id: impl ToString,
        source: RemoteError,
    ) -> SyncError {
        let err = SyncError::Remote {
            kind,
            operation,
            id: id.to_string(),
            source,
        };
        self.publish_error(kind, operation, &err);
        err
    }

    pub fn publish_error(&self, kind: EntityKind, operation: Operation, err: &SyncError) {
        let entity_id = match err {
            SyncError::Remote { id, .. }
            | SyncError::NotFound { id, .. }
            | SyncError::PartialCascade { id, .. } => id.clone(),
            SyncError::Validation(_) | SyncError::Ordering(_) | SyncError::NoRuntime => String::new(),
        };
        self.publish(SyncFailure {
            kind,
            operation,
            entity_id,
            message: err.to_string(),
            at: UnixTimeMs::now(),
        });
    }
}
