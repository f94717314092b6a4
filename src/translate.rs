//! Reply translation, for models that answer in another language.
//!
//! When enabled, the finished reply is translated into the session language
//! and the translation is what gets spoken.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::TranslationError;
use crate::speech::google::split_for_speech;

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// Keeps each GET comfortably under URL length limits.
const MAX_REQUEST_CHARS: usize = 1000;

/// Text translation service. Blocking; callers run it off the event loop.
pub trait Translator: Send + Sync {
    /// Translates `text` into `target` (BCP-47 tag, e.g. `am`). The source
    /// language is detected by the service.
    fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError>;
}

/// Google Translate's public `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    base_url: String,
}

impl Default for GoogleTranslate {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleTranslate {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl Translator for GoogleTranslate {
    fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
            .build()?;
        let url = format!("{}/translate_a/single", self.base_url);

        let mut pieces = Vec::new();
        for chunk in split_for_speech(text, MAX_REQUEST_CHARS) {
            let response = client
                .get(&url)
                .query(&[
                    ("client", "gtx"),
                    ("sl", "auto"),
                    ("tl", target),
                    ("dt", "t"),
                    ("q", chunk.as_str()),
                ])
                .send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(TranslationError::Status(status.as_u16()));
            }
            let body: Value = response
                .json()
                .map_err(|e| TranslationError::Decode(e.to_string()))?;
            pieces.push(parse_translation(&body)?);
        }

        debug!(chunks = pieces.len(), language = target, "reply translated");
        Ok(pieces.join(" "))
    }
}

/// Joins the translated segments of a `translate_a/single` answer, which
/// arrive as `[[["translated", "source", ...], ...], ...]`.
fn parse_translation(body: &Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::Decode("missing segment list".to_string()))?;

    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect())
}

/// The configured translator, or `None` when replies are spoken as written.
pub fn build_translator(config: &Config) -> Option<Arc<dyn Translator>> {
    if !config.translate_replies {
        return None;
    }
    let mut translator = GoogleTranslate::new();
    if let Some(url) = &config.translate_url {
        translator = translator.with_base_url(url);
    }
    Some(Arc::new(translator))
}
