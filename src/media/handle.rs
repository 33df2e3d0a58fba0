// src/media/handle.rs

//! Single-owner wrapper around a live stream's [`NativeHandle`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::errors::{RenderkitError, Result};
use crate::media::{MediaBackend, NativeHandle};
use crate::types::SessionId;

/// Open until the first successful or failed close; never reopens.
#[derive(Debug)]
enum StreamState {
    Open(NativeHandle),
    Closed,
}

/// How a stream was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    /// The manifest existed; the end marker was written.
    Finalized,
    /// The manifest was gone; resources were released without a marker.
    Freed,
}

/// Capability over one live stream: append, then close exactly once.
#[derive(Debug)]
pub struct StreamHandle {
    session_id: SessionId,
    manifest_path: PathBuf,
    state: StreamState,
    appended: usize,
}

impl StreamHandle {
    pub fn new(session_id: SessionId, manifest_path: PathBuf, handle: NativeHandle) -> Self {
        Self {
            session_id,
            manifest_path,
            state: StreamState::Open(handle),
            appended: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, StreamState::Open(_))
    }

    /// Number of successful appends so far.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Append one finished media file as the next live segment(s).
    pub async fn append(&mut self, backend: &dyn MediaBackend, media: &Path) -> Result<()> {
        let StreamState::Open(handle) = &self.state else {
            return Err(RenderkitError::StreamClosed(self.session_id.clone()));
        };
        backend.stream_append(handle, media).await?;
        self.appended += 1;
        info!(
            session = %self.session_id,
            media = %media.display(),
            appended = self.appended,
            "appended artifact to live stream"
        );
        Ok(())
    }

    /// Finalize the manifest if it still exists, otherwise free the handle.
    ///
    /// The handle is consumed before the backend call, so even a failed
    /// finalize leaves the stream closed.
    pub async fn close(&mut self, backend: &dyn MediaBackend) -> Result<CloseOutcome> {
        let handle = match std::mem::replace(&mut self.state, StreamState::Closed) {
            StreamState::Open(handle) => handle,
            StreamState::Closed => {
                return Err(RenderkitError::StreamClosed(self.session_id.clone()));
            }
        };

        let manifest_exists = tokio::fs::try_exists(&self.manifest_path)
            .await
            .unwrap_or(false);

        if manifest_exists {
            info!(
                session = %self.session_id,
                handle = handle.raw(),
                manifest = %self.manifest_path.display(),
                "finalizing live stream"
            );
            backend.stream_finish(handle, &self.manifest_path).await?;
            Ok(CloseOutcome::Finalized)
        } else {
            info!(
                session = %self.session_id,
                handle = handle.raw(),
                "manifest missing; freeing live stream without end marker"
            );
            backend.stream_free(handle);
            Ok(CloseOutcome::Freed)
        }
    }
}
