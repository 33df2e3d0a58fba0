// src/cache/speech.rs

//! Text-to-speech behind the artifact cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{ArtifactCache, CacheKey, CacheStore, FileCacheStore, MemoryCacheStore};
use crate::config::{ProviderConfig, TtsSection};
use crate::errors::{RenderkitError, Result};
use crate::exec::{ProcessSpec, expand_template, path_arg, run_process};
use crate::media::BoxFuture;
use crate::types::{CacheStoreMode, generate_id};

/// An external synthesizer. Writes audio for `text` to `output`.
pub trait SpeechProvider: Send + Sync {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: &'a str,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Provider driven by a configured command line.
#[derive(Debug, Clone)]
pub struct CommandSpeechProvider {
    name: String,
    cfg: ProviderConfig,
}

impl CommandSpeechProvider {
    pub fn new(name: impl Into<String>, cfg: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
        }
    }
}

impl SpeechProvider for CommandSpeechProvider {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: &'a str,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let args = expand_template(
                &self.cfg.args,
                &[
                    ("text", text.to_string()),
                    ("voice", voice.to_string()),
                    ("output", path_arg(output)),
                ],
            );
            let spec = ProcessSpec::new(
                self.cfg.program.clone(),
                ".",
                Duration::from_secs(self.cfg.timeout_secs),
            )
            .args(args);
            let outcome = run_process(&spec).await?;
            if !outcome.success() {
                return Err(RenderkitError::Media(format!(
                    "speech provider '{}' exited with {}: {}",
                    self.name,
                    outcome.exit_code,
                    outcome.stderr.trim()
                )));
            }
            if !tokio::fs::try_exists(output).await.unwrap_or(false) {
                return Err(RenderkitError::Media(format!(
                    "speech provider '{}' produced no file at {}",
                    self.name,
                    output.display()
                )));
            }
            Ok(())
        })
    }
}

/// One synthesis request. Blank fields take the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SpeechRequest {
    pub text: String,
    pub provider: Option<String>,
    pub voice: Option<String>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechOutput {
    pub path: PathBuf,
    pub provider: String,
    pub voice: String,
    /// Served from the cache without calling the provider.
    pub cached: bool,
    /// The provider failed and the configured fallback file was returned.
    pub fallback: bool,
}

pub struct SpeechService {
    cache: ArtifactCache,
    providers: HashMap<String, Arc<dyn SpeechProvider>>,
    audio_dir: PathBuf,
    default_provider: String,
    default_voice: String,
    default_voice_han: String,
    fallback_audio: Option<PathBuf>,
    han: Regex,
}

impl SpeechService {
    /// Service with the configured store and command providers.
    pub fn from_config(cfg: &TtsSection) -> Result<Self> {
        let store: Arc<dyn CacheStore> = match cfg.store {
            CacheStoreMode::File => Arc::new(FileCacheStore::new(cfg.audio_dir.clone())),
            CacheStoreMode::Memory => Arc::new(MemoryCacheStore::new()),
        };
        let mut service = Self::new(cfg, store)?;
        for (name, provider) in &cfg.provider {
            service = service.with_provider(
                name.clone(),
                Arc::new(CommandSpeechProvider::new(name.clone(), provider.clone())),
            );
        }
        Ok(service)
    }

    /// Service over `store` with no providers registered.
    pub fn new(cfg: &TtsSection, store: Arc<dyn CacheStore>) -> Result<Self> {
        let han = Regex::new(r"\p{Han}")
            .map_err(|e| RenderkitError::ConfigError(format!("han pattern: {e}")))?;
        Ok(Self {
            cache: ArtifactCache::new(store),
            providers: HashMap::new(),
            audio_dir: cfg.audio_dir.clone(),
            default_provider: cfg.default_provider.clone(),
            default_voice: cfg.default_voice.clone(),
            default_voice_han: cfg.default_voice_han.clone(),
            fallback_audio: cfg.fallback_audio.clone(),
            han,
        })
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn SpeechProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Provider and voice a request resolves to.
    pub fn resolve(&self, request: &SpeechRequest) -> (String, String) {
        let provider = non_blank(request.provider.as_deref())
            .unwrap_or(self.default_provider.as_str())
            .to_string();
        let voice = match non_blank(request.voice.as_deref()) {
            Some(voice) => voice.to_string(),
            None if self.han.is_match(&request.text) => self.default_voice_han.clone(),
            None => self.default_voice.clone(),
        };
        (provider, voice)
    }

    /// Cached synthesis.
    ///
    /// A hit returns the stored file without calling the provider. On a miss
    /// the provider writes `<audio_dir>/<id>.mp3` and the result is cached.
    /// If the provider fails and a fallback file is configured, that file is
    /// returned (not cached); otherwise the provider error propagates.
    pub async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechOutput> {
        let (provider_name, voice) = self.resolve(request);
        let key = CacheKey::for_text(&request.text, &provider_name, &voice);

        if let Some(path) = self.cache.lookup(&key).await? {
            return Ok(SpeechOutput {
                path,
                provider: provider_name,
                voice,
                cached: true,
                fallback: false,
            });
        }

        let provider = self
            .providers
            .get(&provider_name)
            .ok_or_else(|| RenderkitError::UnknownProvider(provider_name.clone()))?;

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| RenderkitError::io_at(&self.audio_dir, e))?;
        let output = self.audio_dir.join(format!("{}.mp3", generate_id()));

        match provider.synthesize(&request.text, &voice, &output).await {
            Ok(()) => {
                self.cache.store(key, &output)?;
                info!(provider = %provider_name, voice = %voice, path = %output.display(), "synthesized speech");
                Ok(SpeechOutput {
                    path: output,
                    provider: provider_name,
                    voice,
                    cached: false,
                    fallback: false,
                })
            }
            Err(e) => match &self.fallback_audio {
                Some(fallback) => {
                    warn!(
                        provider = %provider_name,
                        voice = %voice,
                        error = %e,
                        fallback = %fallback.display(),
                        "speech provider failed; returning fallback audio"
                    );
                    Ok(SpeechOutput {
                        path: fallback.clone(),
                        provider: provider_name,
                        voice,
                        cached: false,
                        fallback: true,
                    })
                }
                None => Err(e),
            },
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SpeechService {
        SpeechService::new(&TtsSection::default(), Arc::new(MemoryCacheStore::new())).unwrap()
    }

    #[test]
    fn han_text_picks_the_han_default_voice() {
        let svc = service();
        let (provider, voice) = svc.resolve(&SpeechRequest::new("你好，世界"));
        assert_eq!(provider, "minimax");
        assert_eq!(voice, "Chinese (Mandarin)_Gentleman");

        let (_, voice) = svc.resolve(&SpeechRequest::new("hello"));
        assert_eq!(voice, "English_magnetic_voiced_man");
    }

    #[test]
    fn explicit_values_win_and_blanks_do_not() {
        let svc = service();
        let req = SpeechRequest {
            text: "你好".into(),
            provider: Some("  ".into()),
            voice: Some("custom".into()),
        };
        assert_eq!(svc.resolve(&req), ("minimax".to_string(), "custom".to_string()));
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let svc = service();
        let err = svc.synthesize(&SpeechRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, RenderkitError::UnknownProvider(name) if name == "minimax"));
    }
}
