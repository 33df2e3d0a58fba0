// src/session/mod.rs

//! Streaming sessions.
//!
//! - [`layout`]: where sessions publish files.
//! - [`lock`]: striped per-session mutual exclusion.
//! - [`registry`]: session id to live stream handle.
//! - [`orchestrator`]: start / render / finish composed over the above.

pub mod layout;
pub mod lock;
pub mod orchestrator;
pub mod registry;

pub use layout::OutputLayout;
pub use lock::StripedLocks;
pub use orchestrator::{FinishReport, FinishRequest, SessionOrchestrator};
pub use registry::{ManifestInfo, SessionRegistry, SharedStream};
