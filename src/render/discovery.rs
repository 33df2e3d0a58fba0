// src/render/discovery.rs

//! Locating the renderer's output inside a task's media directory.
//!
//! The renderer picks its own output folder from the quality tier and frame
//! rate. We do not try to predict it: a fixed, ordered list of candidate
//! folders is probed and the first one holding at least one media file wins.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use crate::errors::{RenderkitError, Result};

const RESOLUTIONS: [&str; 3] = ["480p", "720p", "1080p"];
const FRAME_RATES: [&str; 3] = ["30", "15", "10"];
const PREFIXES: [&str; 2] = ["videos", "videos/script"];

/// Candidate output folders, relative to the media directory, in probe order.
pub fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(PREFIXES.len() * RESOLUTIONS.len() * FRAME_RATES.len());
    for prefix in PREFIXES {
        for resolution in RESOLUTIONS {
            for fps in FRAME_RATES {
                dirs.push(Path::new(prefix).join(format!("{resolution}{fps}")));
            }
        }
    }
    dirs
}

/// Finds produced media files under a media directory.
#[derive(Clone)]
pub struct ArtifactLocator {
    candidates: Vec<PathBuf>,
    matcher: GlobMatcher,
}

impl fmt::Debug for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactLocator")
            .field("glob", &self.matcher.glob().glob())
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

impl ArtifactLocator {
    /// `pattern` is matched case-insensitively against file names.
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_candidates(pattern, candidate_dirs())
    }

    pub fn with_candidates(pattern: &str, candidates: Vec<PathBuf>) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| RenderkitError::ConfigError(format!("invalid artifact glob '{pattern}': {e}")))?;
        Ok(Self {
            candidates,
            matcher: glob.compile_matcher(),
        })
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Matching files in the first candidate folder that has any, sorted by
    /// file name. Empty when no candidate yields a file.
    ///
    /// Missing candidate folders are skipped; other read failures propagate.
    pub fn locate(&self, media_dir: &Path) -> Result<Vec<PathBuf>> {
        for candidate in &self.candidates {
            let dir = media_dir.join(candidate);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => continue,
                Err(e) => return Err(RenderkitError::io_at(&dir, e)),
            };

            let mut found = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| RenderkitError::io_at(&dir, e))?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.matcher.is_match(name))
                {
                    found.push(path);
                }
            }

            if !found.is_empty() {
                found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }
}
