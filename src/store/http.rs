//! HTTP object-store client.
//!
//! Implements `RemoteStore` against a plain HTTP object-store API:
//!
//! - `POST   {base}/files?name=..&folder=..` with the file body -> `{ "id" }`
//! - `GET    {base}/files?folder=..&older_than_secs=..` -> `[ { id, name, age_secs } ]`
//! - `DELETE {base}/files/{id}`
//!
//! Authentication is a bearer token persisted at a configurable path. The
//! operator obtains it once through the store's out-of-band consent flow;
//! this client only loads it, sends it, and reports `AuthRequired` when the
//! file is missing or the store rejects it (HTTP 401/403). It never blocks
//! waiting for the operator.

use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::{RemoteFileInfo, RemoteId, RemoteStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HttpStoreConfig {
    /// Store endpoint, e.g. "https://store.example.net/v1".
    pub base_url: String,
    /// Path to the persisted bearer credential (JSON).
    pub token_path: PathBuf,
    /// Remote folder clips are scoped under.
    pub folder: String,
}

#[derive(Debug, Deserialize)]
struct Credential {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    id: String,
    name: String,
    age_secs: u64,
}

/// `RemoteStore` over HTTP with a persisted bearer credential.
pub struct HttpRemoteStore {
    config: HttpStoreConfig,
    agent: ureq::Agent,
    token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::Permanent(format!("invalid store url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StoreError::Permanent(format!(
                "unsupported store scheme '{}'; expected http(s)",
                url.scheme()
            )));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Ok(Self {
            config,
            agent,
            token: None,
        })
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.config.base_url.trim_end_matches('/'))
    }

    /// Load the persisted credential, caching it for subsequent calls.
    fn token(&mut self) -> Result<String, StoreError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let raw = std::fs::read_to_string(&self.config.token_path).map_err(|e| {
            StoreError::AuthRequired(format!(
                "cannot read credential {}: {}",
                self.config.token_path.display(),
                e
            ))
        })?;
        let credential: Credential = serde_json::from_str(&raw).map_err(|e| {
            StoreError::AuthRequired(format!(
                "malformed credential {}: {}",
                self.config.token_path.display(),
                e
            ))
        })?;
        self.token = Some(credential.access_token.clone());
        Ok(credential.access_token)
    }

    /// Map a request failure onto the error taxonomy. A 401/403 clears the
    /// cached token so the next attempt re-reads the credential file.
    fn map_error(&mut self, err: ureq::Error, what: &str) -> StoreError {
        match err {
            ureq::Error::Status(code @ (401 | 403), _) => {
                self.token = None;
                StoreError::AuthRequired(format!("{} rejected with HTTP {}", what, code))
            }
            ureq::Error::Status(code, _) if code == 429 || code >= 500 => {
                StoreError::Transient(format!("{} failed with HTTP {}", what, code))
            }
            ureq::Error::Status(code, _) => {
                StoreError::Permanent(format!("{} failed with HTTP {}", what, code))
            }
            ureq::Error::Transport(t) => {
                StoreError::Transient(format!("{} transport error: {}", what, t))
            }
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    fn authenticate(&mut self) -> Result<(), StoreError> {
        self.token().map(|_| ())
    }

    fn upload(&mut self, path: &Path, name: &str) -> Result<RemoteId, StoreError> {
        let token = self.token()?;
        let body = File::open(path).map_err(|e| {
            StoreError::Permanent(format!("open local clip {}: {}", path.display(), e))
        })?;
        let response = self
            .agent
            .post(&self.files_url())
            .query("name", name)
            .query("folder", &self.config.folder)
            .set("Authorization", &format!("Bearer {}", token))
            .set("Content-Type", "video/x-msvideo")
            .send(body)
            .map_err(|e| self.map_error(e, "upload"))?;
        let upload: UploadResponse = response
            .into_json()
            .map_err(|e| StoreError::Permanent(format!("malformed upload response: {}", e)))?;
        Ok(RemoteId(upload.id))
    }

    fn list_older_than(&mut self, age: Duration) -> Result<Vec<RemoteFileInfo>, StoreError> {
        let token = self.token()?;
        let response = self
            .agent
            .get(&self.files_url())
            .query("folder", &self.config.folder)
            .query("older_than_secs", &age.as_secs().to_string())
            .set("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(|e| self.map_error(e, "list"))?;
        let entries: Vec<RemoteEntry> = response
            .into_json()
            .map_err(|e| StoreError::Permanent(format!("malformed listing: {}", e)))?;
        Ok(entries
            .into_iter()
            .map(|entry| RemoteFileInfo {
                id: RemoteId(entry.id),
                name: entry.name,
                age: Duration::from_secs(entry.age_secs),
            })
            .collect())
    }

    fn delete(&mut self, id: &RemoteId) -> Result<(), StoreError> {
        let token = self.token()?;
        self.agent
            .delete(&format!("{}/{}", self.files_url(), id.0))
            .set("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(|e| self.map_error(e, "delete"))?;
        Ok(())
    }
}
