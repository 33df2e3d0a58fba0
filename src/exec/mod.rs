// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything that launches an external program (the renderer, ffmpeg,
//! speech synthesizers) goes through [`process::run_process`], which
//! enforces an explicit environment allow-list and a hard deadline.

pub mod process;

pub use process::{
    ProcessOutcome, ProcessSpec, SIGNAL_EXIT_CODE, TIMEOUT_EXIT_CODE, expand_template, path_arg,
    run_process,
};
