use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::{RenderkitError, Result as RkResult};

/// Identifier grouping render tasks into one streaming session.
pub type SessionId = String;

/// Identifier of a single render task.
pub type TaskId = String;

/// Render quality tier passed to the renderer as `-q<letter>`.
///
/// - `Low` (`l`): 480p
/// - `Medium` (`m`): 720p
/// - `High` (`h`): 1080p
/// - `Production` (`p`): 1440p
/// - `FourK` (`k`): 2160p
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "l", alias = "low")]
    Low,
    #[serde(rename = "m", alias = "medium")]
    Medium,
    #[serde(rename = "h", alias = "high")]
    High,
    #[serde(rename = "p", alias = "production")]
    Production,
    #[serde(rename = "k", alias = "fourk")]
    FourK,
}

impl Quality {
    pub fn as_flag(self) -> &'static str {
        match self {
            Quality::Low => "l",
            Quality::Medium => "m",
            Quality::High => "h",
            Quality::Production => "p",
            Quality::FourK => "k",
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Low
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "l" | "low" => Ok(Quality::Low),
            "m" | "medium" => Ok(Quality::Medium),
            "h" | "high" => Ok(Quality::High),
            "p" | "production" => Ok(Quality::Production),
            "k" | "fourk" | "4k" => Ok(Quality::FourK),
            other => Err(format!(
                "invalid quality: {other} (expected one of l, m, h, p, k)"
            )),
        }
    }
}

/// Where speech cache records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreMode {
    /// JSON-lines file under the audio directory; survives restarts.
    File,
    /// In-memory only (lost on restart).
    Memory,
}

impl Default for CacheStoreMode {
    fn default() -> Self {
        CacheStoreMode::File
    }
}

/// True when `name` is exactly one normal path component: not empty, no
/// separators, not `.` or `..`.
pub fn is_plain_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.file_name().is_some_and(|f| f == path.as_os_str())
}

/// Reject ids that would leave their directory once joined into a path.
pub fn check_id(kind: &'static str, id: &str) -> RkResult<()> {
    if is_plain_name(id) {
        Ok(())
    } else {
        Err(RenderkitError::InvalidId {
            kind,
            id: id.to_string(),
        })
    }
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a time-ordered numeric identifier.
///
/// Millisecond timestamp in the high bits, a process-wide sequence in the
/// low 12 bits. Unique within one process.
pub fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xfff;
    ((millis << 12) | seq).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_parses_letters_and_words() {
        assert_eq!("l".parse::<Quality>(), Ok(Quality::Low));
        assert_eq!("High".parse::<Quality>(), Ok(Quality::High));
        assert!("ultra".parse::<Quality>().is_err());
        assert_eq!(Quality::Medium.to_string(), "m");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
        assert!(check_id("session", &a).is_ok());
    }

    #[test]
    fn ids_must_be_a_single_path_component() {
        assert!(is_plain_name("a.mp4"));
        assert!(is_plain_name("s-1_x"));
        for bad in ["", ".", "..", "../a", "x/a", "/abs", "a/"] {
            assert!(!is_plain_name(bad), "{bad:?} accepted");
        }
        let err = check_id("task", "../../x").unwrap_err();
        assert!(matches!(err, RenderkitError::InvalidId { kind: "task", .. }));
    }
}
