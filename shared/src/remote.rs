//! Remote persistence boundary.
//!
//! Stores talk to the hosted database and object storage only through the
//! traits below. `MemoryTable` and `MemoryBlobStorage` are full in-process
//! implementations used by tests and by shells running without a backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::error::Operation;
use crate::model::{Entity, FieldPatch, UnixTimeMs};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Failed(String),

    #[error("no response after {0:?}")]
    TimedOut(Duration),
}

/// Await `call`, giving up after `limit`. A timeout counts as a failure.
pub async fn bounded<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match limit {
        None => call.await,
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(RemoteError::TimedOut(limit))),
    }
}

#[async_trait]
pub trait RemoteTable<E: Entity>: Send + Sync {
    async fn select(&self, scope: &E::Scope) -> Result<Vec<E>, RemoteError>;

    /// Returns the canonical row, which may carry a server-assigned id.
    async fn insert(&self, record: &E) -> Result<E, RemoteError>;

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<(), RemoteError>;

    async fn delete(&self, id: &E::Id) -> Result<(), RemoteError>;

    /// Apply several patches in one request. Rank writes go through here so
    /// that only `display_order` reaches the server.
    async fn update_batch(&self, updates: &[(E::Id, E::Patch)]) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` at `path`, overwriting, and return the public URL.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str)
        -> Result<String, RemoteError>;

    async fn remove(&self, path: &str) -> Result<(), RemoteError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A call observed by a [`MemoryTable`], in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteCall<E: Entity> {
    Select(E::Scope),
    Insert(E),
    Update(E::Id, E::Patch),
    Delete(E::Id),
    UpdateBatch(Vec<(E::Id, E::Patch)>),
}

impl<E: Entity> RemoteCall<E> {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Select(_) => Operation::Fetch,
            Self::Insert(_) => Operation::Insert,
            Self::Update(..) => Operation::Update,
            Self::Delete(_) => Operation::Delete,
            Self::UpdateBatch(_) => Operation::Reorder,
        }
    }
}

#[derive(Default)]
struct FailurePlan {
    once: Vec<Operation>,
    always: HashSet<Operation>,
}

impl FailurePlan {
    fn should_fail(&mut self, op: Operation) -> bool {
        if self.always.contains(&op) {
            return true;
        }
        match self.once.iter().position(|o| *o == op) {
            Some(index) => {
                self.once.remove(index);
                true
            }
            None => false,
        }
    }
}

type IdAssigner<E> = Box<dyn Fn() -> <E as Entity>::Id + Send + Sync>;

/// In-memory table with failure injection, per-operation latency and a call log.
pub struct MemoryTable<E: Entity> {
    rows: Mutex<Vec<E>>,
    calls: Mutex<Vec<RemoteCall<E>>>,
    failures: Mutex<FailurePlan>,
    latency: Mutex<HashMap<Operation, Duration>>,
    assign_id: Option<IdAssigner<E>>,
}

impl<E: Entity> Default for MemoryTable<E> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(FailurePlan::default()),
            latency: Mutex::new(HashMap::new()),
            assign_id: None,
        }
    }
}

impl<E: Entity> MemoryTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = E>) -> Self {
        let table = Self::default();
        *lock(&table.rows) = rows.into_iter().collect();
        table
    }

    /// Replace client ids on insert, like a database generating primary keys.
    pub fn with_id_assigner(mut self, assign: impl Fn() -> E::Id + Send + Sync + 'static) -> Self {
        self.assign_id = Some(Box::new(assign));
        self
    }

    pub fn fail_next(&self, op: Operation) {
        lock(&self.failures).once.push(op);
    }

    pub fn set_failing(&self, op: Operation, failing: bool) {
        let mut plan = lock(&self.failures);
        if failing {
            plan.always.insert(op);
        } else {
            plan.always.remove(&op);
        }
    }

    pub fn set_latency(&self, op: Operation, latency: Duration) {
        lock(&self.latency).insert(op, latency);
    }

    pub fn rows(&self) -> Vec<E> {
        lock(&self.rows).clone()
    }

    pub fn row(&self, id: &E::Id) -> Option<E> {
        lock(&self.rows).iter().find(|r| r.id() == id).cloned()
    }

    pub fn calls(&self) -> Vec<RemoteCall<E>> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, op: Operation) -> Vec<RemoteCall<E>> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    async fn enter(&self, call: RemoteCall<E>) -> Result<(), RemoteError> {
        let op = call.operation();
        lock(&self.calls).push(call);
        let latency = lock(&self.latency).get(&op).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.failures).should_fail(op) {
            debug!(kind = %E::KIND, %op, "injected remote failure");
            return Err(RemoteError::Failed(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> RemoteTable<E> for MemoryTable<E> {
    #[instrument(skip(self), fields(kind = %E::KIND))]
    async fn select(&self, scope: &E::Scope) -> Result<Vec<E>, RemoteError> {
        self.enter(RemoteCall::Select(scope.clone())).await?;
        Ok(lock(&self.rows)
            .iter()
            .filter(|r| r.scope() == scope)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, record), fields(kind = %E::KIND, id = %record.id()))]
    async fn insert(&self, record: &E) -> Result<E, RemoteError> {
        self.enter(RemoteCall::Insert(record.clone())).await?;
        let mut canonical = record.clone();
        if let Some(assign) = &self.assign_id {
            canonical.set_id(assign());
        }
        canonical.set_created_at(UnixTimeMs::now());

        let mut rows = lock(&self.rows);
        if rows.iter().any(|r| r.id() == canonical.id()) {
            return Err(RemoteError::Failed(format!(
                "duplicate key {}",
                canonical.id()
            )));
        }
        rows.push(canonical.clone());
        Ok(canonical)
    }

    #[instrument(skip(self, patch), fields(kind = %E::KIND))]
    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Update(id.clone(), patch.clone())).await?;
        // Zero matched rows is not an error, same as a filtered SQL update.
        if let Some(row) = lock(&self.rows).iter_mut().find(|r| r.id() == id) {
            patch.apply_to(row);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(kind = %E::KIND))]
    async fn delete(&self, id: &E::Id) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Delete(id.clone())).await?;
        lock(&self.rows).retain(|r| r.id() != id);
        Ok(())
    }

    #[instrument(skip(self, updates), fields(kind = %E::KIND, count = updates.len()))]
    async fn update_batch(&self, updates: &[(E::Id, E::Patch)]) -> Result<(), RemoteError> {
        self.enter(RemoteCall::UpdateBatch(updates.to_vec())).await?;
        let mut rows = lock(&self.rows);
        for (id, patch) in updates {
            if let Some(row) = rows.iter_mut().find(|r| r.id() == id) {
                patch.apply_to(row);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredBlob {
    pub bytes: Bytes,
    pub content_type: String,
}

/// In-memory object storage serving public URLs under `base_url`.
pub struct MemoryBlobStorage {
    base_url: Url,
    objects: Mutex<HashMap<String, StoredBlob>>,
    failures: Mutex<FailurePlan>,
}

impl MemoryBlobStorage {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            objects: Mutex::new(HashMap::new()),
            failures: Mutex::new(FailurePlan::default()),
        }
    }

    pub fn fail_next(&self, op: Operation) {
        lock(&self.failures).once.push(op);
    }

    pub fn set_failing(&self, op: Operation, failing: bool) {
        let mut plan = lock(&self.failures);
        if failing {
            plan.always.insert(op);
        } else {
            plan.always.remove(&op);
        }
    }

    pub fn object(&self, path: &str) -> Option<StoredBlob> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.objects).keys().cloned().collect();
        paths.sort();
        paths
    }

    fn check(&self, op: Operation) -> Result<(), RemoteError> {
        if lock(&self.failures).should_fail(op) {
            return Err(RemoteError::Failed(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, RemoteError> {
        self.check(Operation::UploadImage)?;
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RemoteError::Failed(format!("bad object path {path:?}: {e}")))?;
        lock(&self.objects).insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(url.to_string())
    }

    #[instrument(skip(self))]
    async fn remove(&self, path: &str) -> Result<(), RemoteError> {
        self.check(Operation::RemoveImage)?;
        lock(&self.objects).remove(path);
        Ok(())
    }
}
