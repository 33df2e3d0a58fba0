// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{RenderkitError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RenderkitError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_renderer(cfg)?;
    validate_stream(cfg)?;
    validate_tts(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.lock_stripes == 0 {
        return Err(RenderkitError::ConfigError(
            "[config].lock_stripes must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.default_timeout_secs == 0 {
        return Err(RenderkitError::ConfigError(
            "[config].default_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_renderer(cfg: &RawConfigFile) -> Result<()> {
    let renderer = &cfg.renderer;
    if renderer.program.trim().is_empty() {
        return Err(RenderkitError::ConfigError(
            "[renderer].program must not be empty".to_string(),
        ));
    }
    if renderer.fps == 0 {
        return Err(RenderkitError::ConfigError(
            "[renderer].fps must be >= 1 (got 0)".to_string(),
        ));
    }
    if renderer.source_file.trim().is_empty() || renderer.source_file.contains('/') {
        return Err(RenderkitError::ConfigError(format!(
            "[renderer].source_file must be a plain file name (got '{}')",
            renderer.source_file
        )));
    }
    Glob::new(&renderer.artifact_glob).map_err(|e| {
        RenderkitError::ConfigError(format!(
            "[renderer].artifact_glob '{}' is invalid: {e}",
            renderer.artifact_glob
        ))
    })?;
    Ok(())
}

fn validate_stream(cfg: &RawConfigFile) -> Result<()> {
    let stream = &cfg.stream;
    if stream.segment_duration_secs == 0 || stream.detached_segment_duration_secs == 0 {
        return Err(RenderkitError::ConfigError(
            "[stream] segment durations must be >= 1 second".to_string(),
        ));
    }
    if !stream.segment_pattern.contains('%') {
        return Err(RenderkitError::ConfigError(format!(
            "[stream].segment_pattern '{}' needs a printf-style number (e.g. c_%03d.ts)",
            stream.segment_pattern
        )));
    }
    Ok(())
}

fn validate_tts(cfg: &RawConfigFile) -> Result<()> {
    let tts = &cfg.tts;
    if !tts.provider.is_empty() && !tts.provider.contains_key(&tts.default_provider) {
        return Err(RenderkitError::ConfigError(format!(
            "[tts].default_provider '{}' has no [tts.provider.{}] section",
            tts.default_provider, tts.default_provider
        )));
    }
    for (name, provider) in tts.provider.iter() {
        if provider.program.trim().is_empty() {
            return Err(RenderkitError::ConfigError(format!(
                "[tts.provider.{name}].program must not be empty"
            )));
        }
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.source.as_os_str().is_empty() {
            return Err(RenderkitError::ConfigError(format!(
                "task '{name}' has an empty `source`"
            )));
        }
        if task.timeout_secs == Some(0) {
            return Err(RenderkitError::ConfigError(format!(
                "task '{name}' has timeout_secs = 0"
            )));
        }
    }
    Ok(())
}
