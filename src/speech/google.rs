//! Google Translate's text-to-speech endpoint (the service gTTS wraps).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use super::SpeechSynthesizer;
use crate::error::SynthesisError;

const DEFAULT_BASE_URL: &str = "https://translate.google.com";

/// The endpoint rejects longer `q` parameters.
pub const MAX_CHUNK_CHARS: usize = 100;

/// Ethiopic and Latin sentence/clause punctuation.
const BREAKS: &[char] = &['።', '፣', '፤', '፥', '፦', '፧', '፨', '!', '?', '.', ',', ';', ':', '\n'];

#[derive(Debug, Clone)]
pub struct GoogleTranslateTts {
    base_url: String,
}

impl Default for GoogleTranslateTts {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleTranslateTts {
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

impl SpeechSynthesizer for GoogleTranslateTts {
    fn synthesize(&self, text: &str, language: &str, output: &Path) -> Result<(), SynthesisError> {
        let chunks = split_for_speech(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
            .build()?;
        let url = format!("{}/translate_tts", self.base_url);
        let total = chunks.len().to_string();

        let mut file = File::create(output)?;
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(SynthesisError::Status(status.as_u16()));
            }
            file.write_all(&response.bytes()?)?;
        }
        file.flush()?;

        debug!(chunks = chunks.len(), output = %output.display(), "speech written");
        Ok(())
    }
}

/// Splits text into pieces of at most `max_chars` characters, preferring
/// punctuation, then whitespace, and only cutting inside a word as a last resort.
pub fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();

    for sentence in sentences(text) {
        if sentence.chars().count() <= max_chars {
            pieces.push(sentence);
        } else {
            let words = sentence
                .split_whitespace()
                .flat_map(|word| hard_split(word, max_chars))
                .collect::<Vec<_>>();
            pieces.extend(pack(words, max_chars));
        }
    }

    pack(pieces, max_chars)
}

fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if BREAKS.contains(&c) {
            push_trimmed(&mut out, &mut current);
        }
    }
    push_trimmed(&mut out, &mut current);
    out
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Greedily joins parts with single spaces while they fit.
fn pack(parts: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for part in parts {
        let part_len = part.chars().count();
        if !current.is_empty() && current_len + 1 + part_len > max_chars {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&part);
        current_len += part_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_for_speech("ሰላም፣ እንዴት ነህ?", 100), vec!["ሰላም፣ እንዴት ነህ?"]);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(split_for_speech("  \n ", 100).is_empty());
    }

    #[test]
    fn test_splits_on_ethiopic_full_stop() {
        let chunks = split_for_speech("አንደኛ ዓረፍተ ነገር። ሁለተኛ ዓረፍተ ነገር።", 20);
        assert_eq!(chunks, vec!["አንደኛ ዓረፍተ ነገር።", "ሁለተኛ ዓረፍተ ነገር።"]);
    }

    #[test]
    fn test_every_chunk_respects_limit() {
        let text = "ሰላም ".repeat(60) + &"ሀ".repeat(250);
        let chunks = split_for_speech(&text, 100);

        assert!(chunks.len() > 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        let rejoined: String = chunks.concat().chars().filter(|c| !c.is_whitespace()).collect();
        let original: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(rejoined, original);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_chunk_audio() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "am"))
            .and(query_param("client", "tw-ob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("response.mp3");
        let tts = GoogleTranslateTts::new().with_base_url(&server.uri());
        let text = format!("{}። {}።", "ሀ".repeat(60), "ለ".repeat(60));

        let out = output.clone();
        tokio::task::spawn_blocking(move || tts.synthesize(&text, "am", &out))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"MP3MP3");
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("response.mp3");
        let tts = GoogleTranslateTts::new().with_base_url(&server.uri());

        let err = tokio::task::spawn_blocking(move || tts.synthesize("ሰላም", "am", &output))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Status(503)));
    }
}
