// tests/speech_cache.rs

mod common;
use crate::common::{ConfigFileBuilder, CountingSpeechProvider, init_tracing};

use std::sync::Arc;

use renderkit::cache::{FileCacheStore, MemoryCacheStore, SpeechRequest, SpeechService};
use renderkit::config::TtsSection;
use renderkit::errors::RenderkitError;

fn service(tts: &TtsSection, provider: &Arc<CountingSpeechProvider>) -> SpeechService {
    SpeechService::new(tts, Arc::new(MemoryCacheStore::new()))
        .unwrap()
        .with_provider("minimax", provider.clone())
}

#[tokio::test]
async fn repeat_request_is_served_from_cache() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());
    let svc = service(&cfg.tts, &provider);

    let first = svc.synthesize(&SpeechRequest::new("hello there")).await.unwrap();
    let second = svc.synthesize(&SpeechRequest::new("hello there")).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.path, second.path);
    assert_eq!(provider.calls(), 1);
    assert!(first.path.starts_with(tmp.path().join("audio")));
    assert_eq!(first.path.extension().unwrap(), "mp3");
}

#[tokio::test]
async fn voice_is_part_of_the_key() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());
    let svc = service(&cfg.tts, &provider);

    let a = svc
        .synthesize(&SpeechRequest {
            text: "hi".into(),
            provider: None,
            voice: Some("a".into()),
        })
        .await
        .unwrap();
    let b = svc
        .synthesize(&SpeechRequest {
            text: "hi".into(),
            provider: None,
            voice: Some("b".into()),
        })
        .await
        .unwrap();

    assert_ne!(a.path, b.path);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn han_text_defaults_to_han_voice() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());
    let svc = service(&cfg.tts, &provider);

    svc.synthesize(&SpeechRequest::new("欢迎观看")).await.unwrap();
    svc.synthesize(&SpeechRequest::new("welcome")).await.unwrap();

    assert_eq!(
        provider.voices(),
        vec![
            "Chinese (Mandarin)_Gentleman".to_string(),
            "English_magnetic_voiced_man".to_string()
        ]
    );
}

#[tokio::test]
async fn deleted_audio_is_synthesized_again() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());
    let svc = service(&cfg.tts, &provider);

    let first = svc.synthesize(&SpeechRequest::new("again")).await.unwrap();
    tokio::fs::remove_file(&first.path).await.unwrap();

    let second = svc.synthesize(&SpeechRequest::new("again")).await.unwrap();
    assert!(!second.cached);
    assert!(second.path.is_file());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn provider_failure_returns_fallback_without_caching() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let fallback = tmp.path().join("default.mp3");
    tokio::fs::write(&fallback, b"default").await.unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path())
        .fallback_audio(&fallback)
        .build();
    let provider = Arc::new(CountingSpeechProvider::new());
    provider.set_failing(true);
    let svc = service(&cfg.tts, &provider);

    let out = svc.synthesize(&SpeechRequest::new("fails")).await.unwrap();
    assert!(out.fallback);
    assert_eq!(out.path, fallback);

    provider.set_failing(false);
    let out = svc.synthesize(&SpeechRequest::new("fails")).await.unwrap();
    assert!(!out.fallback);
    assert!(!out.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn provider_failure_without_fallback_is_an_error() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());
    provider.set_failing(true);
    let svc = service(&cfg.tts, &provider);

    let err = svc.synthesize(&SpeechRequest::new("nope")).await.unwrap_err();
    assert!(matches!(err, RenderkitError::Media(_)));
}

#[tokio::test]
async fn file_store_cache_outlives_the_service() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let provider = Arc::new(CountingSpeechProvider::new());

    let make = || {
        SpeechService::new(&cfg.tts, Arc::new(FileCacheStore::new(cfg.tts.audio_dir.clone())))
            .unwrap()
            .with_provider("minimax", provider.clone())
    };

    let first = make().synthesize(&SpeechRequest::new("durable")).await.unwrap();
    let second = make().synthesize(&SpeechRequest::new("durable")).await.unwrap();

    assert!(second.cached);
    assert_eq!(first.path, second.path);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn command_provider_runs_configured_program() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let mut raw = ConfigFileBuilder::new(tmp.path()).raw();
    raw.tts.provider.insert(
        "minimax".to_string(),
        renderkit::config::ProviderConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf '%s|%s' \"$0\" \"$1\" > \"$2\"".to_string(),
                "{text}".to_string(),
                "{voice}".to_string(),
                "{output}".to_string(),
            ],
            timeout_secs: 5,
        },
    );
    let cfg = renderkit::config::ConfigFile::try_from(raw).unwrap();
    let svc = SpeechService::from_config(&cfg.tts).unwrap();

    let out = svc.synthesize(&SpeechRequest::new("spoken")).await.unwrap();
    let written = tokio::fs::read_to_string(&out.path).await.unwrap();
    assert_eq!(written, "spoken|English_magnetic_voiced_man");
}
