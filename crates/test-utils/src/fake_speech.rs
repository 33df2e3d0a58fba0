use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use renderkit::cache::SpeechProvider;
use renderkit::errors::{RenderkitError, Result};
use renderkit::media::BoxFuture;

/// A speech provider that:
/// - counts how often it was asked to synthesize
/// - writes the requested text as the "audio" file
/// - can be switched into a failing mode.
#[derive(Default)]
pub struct CountingSpeechProvider {
    calls: AtomicUsize,
    fail: AtomicBool,
    voices: Mutex<Vec<String>>,
}

impl CountingSpeechProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Voices requested so far, in call order.
    pub fn voices(&self) -> Vec<String> {
        self.voices.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl SpeechProvider for CountingSpeechProvider {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: &'a str,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.voices.lock().unwrap().push(voice.to_string());
            if self.fail.load(Ordering::SeqCst) {
                return Err(RenderkitError::Media("provider unavailable".to_string()));
            }
            tokio::fs::write(output, text.as_bytes()).await?;
            Ok(())
        })
    }
}
