// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod media;
pub mod render;
pub mod session;
pub mod types;
pub mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{SpeechRequest, SpeechService};
use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, TaskConfig, load_or_default};
use crate::media::{FfmpegBackend, MediaBackend};
use crate::render::{RenderResult, RenderTask};
use crate::session::{FinishRequest, OutputLayout, SessionOrchestrator};
use crate::types::{Quality, generate_id};
use crate::upload::LocalUploader;

/// High-level entry point used by `main.rs`.
///
/// Every command prints its results to stdout as JSON lines.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;
    let root = config_root_dir(&config_path);

    match args.command {
        Command::Session {
            session_id,
            no_live,
            merge,
            watermark,
            audio,
            upload,
            dry_run,
        } => {
            let session_id = session_id.unwrap_or_else(generate_id);
            if dry_run {
                print_dry_run(&cfg, &session_id, !no_live);
                return Ok(());
            }
            let finish = FinishRequest {
                session_id: session_id.clone(),
                merge,
                watermark,
                extract_audio: audio,
                upload_platform: upload,
            };
            run_session(&cfg, &root, finish, !no_live).await
        }
        Command::Render {
            source,
            session_id,
            task_id,
            quality,
            timeout,
            aux,
        } => {
            let task_cfg = TaskConfig {
                source,
                quality,
                timeout_secs: timeout,
                aux_input: aux,
            };
            let task_id = task_id.unwrap_or_else(generate_id);
            let session_id = session_id.unwrap_or_else(|| task_id.clone());
            let task = build_task(&cfg, &root, &task_cfg, session_id, task_id).await?;

            let media: Arc<dyn MediaBackend> = Arc::new(FfmpegBackend::new(&cfg.media));
            let orchestrator = SessionOrchestrator::new(&cfg, media)?;
            let result = orchestrator.render(&task).await?;
            print_json(&result)
        }
        Command::Tts {
            text,
            provider,
            voice,
        } => {
            let service = SpeechService::from_config(&cfg.tts)?;
            let output = service
                .synthesize(&SpeechRequest {
                    text,
                    provider,
                    voice,
                })
                .await?;
            print_json(&output)
        }
    }
}

/// Start a session, render every configured task into it, then finish.
///
/// Tasks are submitted concurrently; the session lock serializes them.
/// Ctrl-C finishes any live stream before returning.
async fn run_session(cfg: &ConfigFile, root: &Path, finish: FinishRequest, live: bool) -> Result<()> {
    let media: Arc<dyn MediaBackend> = Arc::new(FfmpegBackend::new(&cfg.media));
    let mut orchestrator = SessionOrchestrator::new(cfg, media)?;
    if let Some(upload) = &cfg.upload {
        orchestrator = orchestrator.with_uploader(Arc::new(LocalUploader::from_config(upload)));
    }
    let orchestrator = Arc::new(orchestrator);
    let session_id = finish.session_id.clone();

    if live {
        let manifest = orchestrator.start(&session_id).await?;
        print_json(&manifest)?;
    }

    let mut tasks = Vec::with_capacity(cfg.task.len());
    for (name, task_cfg) in cfg.task.iter() {
        tasks.push(build_task(cfg, root, task_cfg, session_id.clone(), name.clone()).await?);
    }
    info!(session = %session_id, tasks = tasks.len(), live, "running session");

    let mut set = JoinSet::new();
    for task in tasks {
        let orchestrator = Arc::clone(&orchestrator);
        set.spawn(async move {
            let outcome = orchestrator.render(&task).await;
            (task.task_id, outcome)
        });
    }

    let interrupted = tokio::select! {
        _ = drain_renders(&mut set) => false,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            true
        }
    };

    if interrupted {
        warn!(session = %session_id, "interrupted; closing live streams");
        set.abort_all();
        let closed = orchestrator.registry().finish_all().await;
        debug!(closed, "streams closed after interrupt");
        return Ok(());
    }

    let report = orchestrator.finish(&finish).await?;
    print_json(&report)
}

async fn drain_renders(set: &mut JoinSet<(String, crate::errors::Result<RenderResult>)>) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(result))) => {
                if let Err(e) = print_json(&result) {
                    error!(error = %e, "failed to print render result");
                }
            }
            Ok((task_id, Err(e))) => {
                error!(task = %task_id, error = %e, "render failed");
                let line = serde_json::json!({ "task_id": task_id, "error": e.to_string() });
                println!("{line}");
            }
            Err(e) => error!(error = %e, "render task panicked or was cancelled"),
        }
    }
}

/// Read a task's source (and aux input) relative to the config directory.
async fn build_task(
    cfg: &ConfigFile,
    root: &Path,
    task_cfg: &TaskConfig,
    session_id: String,
    task_id: String,
) -> Result<RenderTask> {
    let source_path = root.join(&task_cfg.source);
    let source_code = tokio::fs::read_to_string(&source_path)
        .await
        .with_context(|| format!("reading task source {:?}", source_path))?;
    let aux_input = match &task_cfg.aux_input {
        Some(aux) => {
            let aux_path = root.join(aux);
            Some(
                tokio::fs::read_to_string(&aux_path)
                    .await
                    .with_context(|| format!("reading aux input {:?}", aux_path))?,
            )
        }
        None => None,
    };

    Ok(RenderTask {
        task_id,
        session_id,
        source_code,
        quality: task_cfg.effective_quality(cfg.config.default_quality),
        timeout_secs: task_cfg.effective_timeout_secs(cfg.config.default_timeout_secs),
        aux_input,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("encoding result as JSON")?;
    println!("{line}");
    Ok(())
}

/// Directory that relative task paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "configs/Renderkit.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Renderkit.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print what a session run would do.
fn print_dry_run(cfg: &ConfigFile, session_id: &str, live: bool) {
    let layout = OutputLayout::from_config(cfg);
    println!("renderkit dry-run");
    println!("  session = {session_id}");
    println!("  live = {live}");
    if live {
        println!("  manifest = {}", layout.session_manifest(session_id).display());
    }
    println!("  renderer = {} {}", cfg.renderer.program, cfg.renderer.args.join(" "));
    println!("  lock_stripes = {}", cfg.config.lock_stripes);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        let quality: Quality = task.effective_quality(cfg.config.default_quality);
        println!("  - {name}");
        println!("      source: {}", task.source.display());
        println!("      quality: {quality}");
        println!(
            "      timeout_secs: {}",
            task.effective_timeout_secs(cfg.config.default_timeout_secs)
        );
        if let Some(aux) = &task.aux_input {
            println!("      aux_input: {}", aux.display());
        }
    }

    debug!("dry-run complete (no execution)");
}

