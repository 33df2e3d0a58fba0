// src/render/mod.rs

//! Render task execution.
//!
//! A task's script is written into a scratch directory, the external
//! renderer runs under a hard deadline, and the produced media file is
//! located ([`discovery`]) and moved into the session's `scenes/` folder.

pub mod discovery;
pub mod executor;
pub mod task;

pub use discovery::{ArtifactLocator, candidate_dirs};
pub use executor::RenderExecutor;
pub use task::{RenderResult, RenderStatus, RenderTask, StreamDelivery};
