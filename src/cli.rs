// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::Quality;

/// Command-line arguments for `renderkit`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "renderkit",
    version,
    about = "Run rendering scripts into live HLS sessions, with a cached speech front.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Renderkit.toml` in the current working directory. A missing
    /// file means "all defaults".
    #[arg(long, value_name = "PATH", default_value = "Renderkit.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RENDERKIT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Render every `[task.<name>]` from the config into one session, then finish it.
    Session {
        /// Session identifier; generated when omitted.
        #[arg(long, value_name = "ID")]
        session_id: Option<String>,

        /// Do not start a live stream; every task gets a detached rendition.
        #[arg(long)]
        no_live: bool,

        /// Merge the live session's scene videos into one file when finishing.
        #[arg(long)]
        merge: bool,

        /// Burn this text into the merged video.
        #[arg(long, value_name = "TEXT")]
        watermark: Option<String>,

        /// Extract an mp3 track from the merged video.
        #[arg(long)]
        audio: bool,

        /// Upload the finished files to this platform via the configured uploader.
        #[arg(long, value_name = "PLATFORM")]
        upload: Option<String>,

        /// Parse + validate, print the plan, but don't run anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Render one source file without a live session (detached rendition).
    Render {
        /// Script to execute.
        #[arg(long, value_name = "FILE")]
        source: PathBuf,

        #[arg(long, value_name = "ID")]
        session_id: Option<String>,

        #[arg(long, value_name = "ID")]
        task_id: Option<String>,

        /// Quality tier (l, m, h, p, k).
        #[arg(long, value_name = "TIER")]
        quality: Option<Quality>,

        /// Hard deadline for the renderer, in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Side-channel input written next to the script as `figure.txt`.
        #[arg(long, value_name = "FILE")]
        aux: Option<PathBuf>,
    },

    /// Synthesize speech through the content-addressed cache.
    Tts {
        #[arg(long)]
        text: String,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        voice: Option<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
