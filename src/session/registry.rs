// src/session/registry.rs

//! Registry of live streaming sessions.
//!
//! The map is the only owner of [`StreamHandle`]s. Insert happens once per
//! `start`, removal once per `finish`, both under the map lock; the close
//! itself runs after removal so a handle can never be closed twice.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::StreamSection;
use crate::errors::{RenderkitError, Result};
use crate::media::{CloseOutcome, HlsStreamSpec, MediaBackend, StreamHandle};
use crate::session::OutputLayout;
use crate::types::{SessionId, check_id};

/// Where a started session writes its live manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestInfo {
    pub session_id: SessionId,
    pub manifest_path: PathBuf,
}

pub type SharedStream = Arc<Mutex<StreamHandle>>;

pub struct SessionRegistry {
    media: Arc<dyn MediaBackend>,
    layout: OutputLayout,
    stream: StreamSection,
    sessions: Mutex<HashMap<SessionId, SharedStream>>,
}

impl SessionRegistry {
    pub fn new(media: Arc<dyn MediaBackend>, layout: OutputLayout, stream: StreamSection) -> Self {
        Self {
            media,
            layout,
            stream,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a live stream for `session_id`.
    ///
    /// Creates `hls/<session_id>/` and an empty manifest (truncating any
    /// leftover from an earlier session with the same id), then initializes
    /// the native stream. Starting a session that is still live fails with
    /// [`RenderkitError::SessionActive`] and leaves the live one untouched.
    pub async fn start(&self, session_id: &str) -> Result<ManifestInfo> {
        check_id("session", session_id)?;
        if self.is_active(session_id).await {
            return Err(RenderkitError::SessionActive(session_id.to_string()));
        }

        let hls_dir = self.layout.hls_dir(session_id);
        tokio::fs::create_dir_all(&hls_dir)
            .await
            .map_err(|e| RenderkitError::io_at(&hls_dir, e))?;
        let manifest_path = self.layout.session_manifest(session_id);
        tokio::fs::write(&manifest_path, b"")
            .await
            .map_err(|e| RenderkitError::io_at(&manifest_path, e))?;

        let spec = HlsStreamSpec {
            manifest_path: manifest_path.clone(),
            segment_pattern: hls_dir
                .join(&self.stream.segment_pattern)
                .to_string_lossy()
                .into_owned(),
            start_number: self.stream.start_number,
            segment_duration_secs: self.stream.segment_duration_secs,
        };
        let native = self.media.stream_init(&spec).await?;

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(session_id) {
            // Lost a race with a concurrent start; never leak the new handle.
            drop(sessions);
            self.media.stream_free(native);
            return Err(RenderkitError::SessionActive(session_id.to_string()));
        }
        let handle = StreamHandle::new(session_id.to_string(), manifest_path.clone(), native);
        sessions.insert(session_id.to_string(), Arc::new(Mutex::new(handle)));
        info!(session = %session_id, manifest = %manifest_path.display(), "session started");

        Ok(ManifestInfo {
            session_id: session_id.to_string(),
            manifest_path,
        })
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedStream> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close and forget `session_id`.
    ///
    /// `Ok(None)` for an unknown session: no native call is made. The entry
    /// is removed before closing, so it is gone even if finalizing fails.
    pub async fn finish(&self, session_id: &str) -> Result<Option<CloseOutcome>> {
        let Some(shared) = self.sessions.lock().await.remove(session_id) else {
            info!(session = %session_id, "finish on unknown session; nothing to do");
            return Ok(None);
        };
        let mut handle = shared.lock().await;
        let outcome = handle.close(self.media.as_ref()).await?;
        info!(
            session = %session_id,
            outcome = ?outcome,
            appended = handle.appended(),
            "session finished"
        );
        Ok(Some(outcome))
    }

    /// Finish every live session; failures are logged and skipped.
    pub async fn finish_all(&self) -> usize {
        let mut closed = 0;
        for session_id in self.active_sessions().await {
            match self.finish(&session_id).await {
                Ok(Some(_)) => closed += 1,
                Ok(None) => {}
                Err(e) => warn!(session = %session_id, error = %e, "failed to finish session"),
            }
        }
        closed
    }
}
