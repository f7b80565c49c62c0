//! Transport for permission requests and responses
//!
//! The broker and the external approver run in separate processes and only
//! share a directory. A request is written once as `request-<id>.json`; the
//! approver answers by creating `response-<id>.json`, and the existence of that
//! file is the only completion signal. The broker consumes the response once
//! and deletes it.
//!
//! [`FilePermissionChannel`] implements that protocol and also carries the
//! approver-side operations. [`MemoryPermissionChannel`] keeps everything in
//! memory for tests.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, Notify};

const REQUEST_PREFIX: &str = "request-";
const RESPONSE_PREFIX: &str = "response-";
const FILE_SUFFIX: &str = ".json";

/// A tool invocation waiting for an external decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub request_id: String,
    pub tool_name: String,
    pub inputs: Value,
    /// RFC 3339 creation time
    pub timestamp: String,
}

/// The approver's answer to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub allow: bool,
}

/// Broker-side view of the request/response transport
#[async_trait]
pub trait PermissionChannel: Send + Sync {
    /// Publish a request for the approver
    async fn write_request(&self, request: &PermissionRequest) -> Result<()>;

    /// Consume the response for `request_id` if the approver has written one
    ///
    /// A response is returned at most once. A response that cannot be parsed
    /// is still consumed and reported as an error.
    async fn take_response(&self, request_id: &str) -> Result<Option<PermissionResponse>>;

    /// Withdraw a request that will no longer be waited on
    async fn discard_request(&self, request_id: &str) -> Result<()>;
}

/// Files removed by a sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
}

/// Directory-backed permission channel
#[derive(Debug, Clone)]
pub struct FilePermissionChannel {
    dir: PathBuf,
}

impl FilePermissionChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn request_path(&self, request_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", REQUEST_PREFIX, request_id, FILE_SUFFIX))
    }

    pub fn response_path(&self, request_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", RESPONSE_PREFIX, request_id, FILE_SUFFIX))
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BridgeError::PermissionChannel(format!(
                "Failed to create permission directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Requests currently waiting for an answer, oldest first
    ///
    /// Files that cannot be parsed are skipped.
    pub async fn pending_requests(&self) -> Result<Vec<PermissionRequest>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut requests = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with(REQUEST_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            let content = match tokio::fs::read_to_string(entry.path()).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<PermissionRequest>(&content) {
                Ok(request) => requests.push(request),
                Err(e) => tracing::warn!("Skipping malformed request {}: {}", name, e),
            }
        }

        requests.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(requests)
    }

    /// Answer a request and remove it from the pending set
    ///
    /// The response is written to a scratch file and renamed into place so the
    /// broker never observes a partial write.
    pub async fn respond(&self, request_id: &str, allow: bool) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let target = self.response_path(request_id);
        let scratch = self
            .dir
            .join(format!(".{}{}.partial", RESPONSE_PREFIX, request_id));

        let body = serde_json::to_string(&PermissionResponse { allow })?;
        tokio::fs::write(&scratch, body).await?;
        tokio::fs::rename(&scratch, &target).await?;
        remove_if_exists(&self.request_path(request_id)).await?;

        tracing::info!(
            "Answered permission request {} with allow={}",
            request_id,
            allow
        );
        Ok(target)
    }

    /// Remove request and response files older than `max_age`
    pub async fn sweep(&self, max_age: Duration) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let ours = (name.starts_with(REQUEST_PREFIX) || name.starts_with(RESPONSE_PREFIX))
                && name.ends_with(FILE_SUFFIX);
            if !ours {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            if remove_if_exists(&entry.path()).await? {
                tracing::debug!("Swept stale permission file {}", name);
                report.removed.push(entry.path());
            }
        }

        if !report.removed.is_empty() {
            tracing::info!("Swept {} stale permission files", report.removed.len());
        }
        Ok(report)
    }
}

#[async_trait]
impl PermissionChannel for FilePermissionChannel {
    async fn write_request(&self, request: &PermissionRequest) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.request_path(&request.request_id);
        let body = serde_json::to_string_pretty(request)?;
        tokio::fs::write(&path, body).await.map_err(|e| {
            BridgeError::PermissionChannel(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("Wrote permission request {}", path.display());
        Ok(())
    }

    async fn take_response(&self, request_id: &str) -> Result<Option<PermissionResponse>> {
        let path = self.response_path(request_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BridgeError::PermissionChannel(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to delete response {}: {}", path.display(), e);
        }

        parse_response(request_id, &content).map(Some)
    }

    async fn discard_request(&self, request_id: &str) -> Result<()> {
        remove_if_exists(&self.request_path(request_id)).await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    requests: HashMap<String, PermissionRequest>,
    responses: HashMap<String, String>,
    history: Vec<PermissionRequest>,
}

/// In-memory permission channel
///
/// Cloning yields a handle to the same state, so a test can hand one clone to
/// the broker and answer requests through another.
#[derive(Clone, Default)]
pub struct MemoryPermissionChannel {
    state: Arc<Mutex<MemoryState>>,
    request_written: Arc<Notify>,
}

impl MemoryPermissionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet answered or discarded
    pub async fn pending(&self) -> Vec<PermissionRequest> {
        self.state.lock().await.requests.values().cloned().collect()
    }

    /// Every request ever written, in order
    pub async fn history(&self) -> Vec<PermissionRequest> {
        self.state.lock().await.history.clone()
    }

    pub async fn respond(&self, request_id: &str, allow: bool) {
        let body = serde_json::json!({ "allow": allow }).to_string();
        self.respond_raw(request_id, body).await;
    }

    /// Store an arbitrary response body, including malformed ones
    pub async fn respond_raw(&self, request_id: &str, body: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.requests.remove(request_id);
        state.responses.insert(request_id.to_string(), body.into());
    }

    /// Whether a response is still waiting to be consumed
    pub async fn has_response(&self, request_id: &str) -> bool {
        self.state.lock().await.responses.contains_key(request_id)
    }

    /// Wait until a request is pending and return the oldest one
    pub async fn next_request(&self) -> PermissionRequest {
        loop {
            let notified = self.request_written.notified();
            {
                let state = self.state.lock().await;
                let oldest = state
                    .history
                    .iter()
                    .find(|r| state.requests.contains_key(&r.request_id));
                if let Some(request) = oldest {
                    return request.clone();
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PermissionChannel for MemoryPermissionChannel {
    async fn write_request(&self, request: &PermissionRequest) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .requests
                .insert(request.request_id.clone(), request.clone());
            state.history.push(request.clone());
        }
        self.request_written.notify_waiters();
        Ok(())
    }

    async fn take_response(&self, request_id: &str) -> Result<Option<PermissionResponse>> {
        let body = self.state.lock().await.responses.remove(request_id);
        match body {
            Some(body) => parse_response(request_id, &body).map(Some),
            None => Ok(None),
        }
    }

    async fn discard_request(&self, request_id: &str) -> Result<()> {
        self.state.lock().await.requests.remove(request_id);
        Ok(())
    }
}

fn parse_response(request_id: &str, body: &str) -> Result<PermissionResponse> {
    serde_json::from_str(body).map_err(|e| {
        BridgeError::PermissionChannel(format!(
            "Malformed response for {}: {}",
            request_id, e
        ))
    })
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BridgeError::PermissionChannel(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
