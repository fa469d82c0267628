//! Remote storage capability.
//!
//! The offload path talks to remote storage only through the narrow
//! `RemoteStore` trait (`authenticate` / `upload` / `list_older_than` /
//! `delete`), so the coordinator's retry, pause, and sweep logic is testable
//! against `InMemoryRemoteStore` without any network. The production
//! implementation is the HTTP object-store client in `store::http`.
//!
//! Errors are split by how the caller must react:
//! - `AuthRequired`: not retryable automatically; the operator has to
//!   complete the consent flow that produces the persisted credential.
//!   Uploads pause until it resolves.
//! - `Transient`: network-shaped; retried with bounded backoff.
//! - `Permanent`: malformed request/response; retrying cannot help.

pub mod http;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use http::{HttpRemoteStore, HttpStoreConfig};

/// Opaque identifier assigned by the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteId(pub String);

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One remote file as reported by a listing.
#[derive(Clone, Debug)]
pub struct RemoteFileInfo {
    pub id: RemoteId,
    pub name: String,
    pub age: Duration,
}

/// Failure mode of a remote store operation.
#[derive(Clone, Debug)]
pub enum StoreError {
    /// No valid credential. Not retryable until the operator intervenes.
    AuthRequired(String),
    /// Network-shaped failure; retry may succeed.
    Transient(String),
    /// Retrying cannot help.
    Permanent(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::AuthRequired(msg) => write!(f, "authentication required: {}", msg),
            StoreError::Transient(msg) => write!(f, "transient store failure: {}", msg),
            StoreError::Permanent(msg) => write!(f, "permanent store failure: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Narrow capability interface to remote storage.
pub trait RemoteStore: Send {
    /// Verify a usable credential exists (loading/refreshing as needed).
    fn authenticate(&mut self) -> Result<(), StoreError>;

    /// Upload a local file under the given remote name.
    fn upload(&mut self, path: &Path, name: &str) -> Result<RemoteId, StoreError>;

    /// List remote files older than the given age.
    fn list_older_than(&mut self, age: Duration) -> Result<Vec<RemoteFileInfo>, StoreError>;

    /// Delete a remote file.
    fn delete(&mut self, id: &RemoteId) -> Result<(), StoreError>;
}

// ----------------------------------------------------------------------------
// In-memory fake for tests
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InMemoryInner {
    files: Vec<RemoteFileInfo>,
    next_id: u64,
    upload_attempts: u64,
    deleted: Vec<RemoteId>,
    /// Scripted transient failures consumed by the next uploads.
    fail_uploads: VecDeque<StoreError>,
    auth_required: bool,
}

/// In-memory `RemoteStore` with scriptable failures.
///
/// Clones share state, so a test can keep a handle for inspection while the
/// store itself is moved into the coordinator thread.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRemoteStore {
    inner: Arc<Mutex<InMemoryInner>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `count` uploads to fail with a transient error.
    pub fn fail_next_uploads(&self, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            inner
                .fail_uploads
                .push_back(StoreError::Transient("scripted failure".into()));
        }
    }

    /// Toggle the not-yet-authenticated condition.
    pub fn set_auth_required(&self, required: bool) {
        self.inner.lock().unwrap().auth_required = required;
    }

    /// Seed a remote file with an explicit age, as if uploaded by a prior
    /// process instance.
    pub fn insert_remote_file(&self, name: &str, age: Duration) -> RemoteId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = RemoteId(format!("mem-{}", inner.next_id));
        inner.files.push(RemoteFileInfo {
            id: id.clone(),
            name: name.to_string(),
            age,
        });
        id
    }

    pub fn upload_attempts(&self) -> u64 {
        self.inner.lock().unwrap().upload_attempts
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<RemoteId> {
        self.inner.lock().unwrap().deleted.clone()
    }

    pub fn remote_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn authenticate(&mut self) -> Result<(), StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.auth_required {
            Err(StoreError::AuthRequired("no credential".into()))
        } else {
            Ok(())
        }
    }

    fn upload(&mut self, path: &Path, name: &str) -> Result<RemoteId, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.auth_required {
            return Err(StoreError::AuthRequired("no credential".into()));
        }
        inner.upload_attempts += 1;
        if let Some(err) = inner.fail_uploads.pop_front() {
            return Err(err);
        }
        if !path.exists() {
            return Err(StoreError::Permanent(format!(
                "local file missing: {}",
                path.display()
            )));
        }
        inner.next_id += 1;
        let id = RemoteId(format!("mem-{}", inner.next_id));
        inner.files.push(RemoteFileInfo {
            id: id.clone(),
            name: name.to_string(),
            age: Duration::ZERO,
        });
        Ok(id)
    }

    fn list_older_than(&mut self, age: Duration) -> Result<Vec<RemoteFileInfo>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.auth_required {
            return Err(StoreError::AuthRequired("no credential".into()));
        }
        Ok(inner
            .files
            .iter()
            .filter(|f| f.age > age)
            .cloned()
            .collect())
    }

    fn delete(&mut self, id: &RemoteId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.auth_required {
            return Err(StoreError::AuthRequired("no credential".into()));
        }
        let before = inner.files.len();
        inner.files.retain(|f| &f.id != id);
        if inner.files.len() == before {
            return Err(StoreError::Permanent(format!("no such remote file: {}", id)));
        }
        inner.deleted.push(id.clone());
        Ok(())
    }
}
