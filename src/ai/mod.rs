//! Language model service clients.
//!
//! Both providers stream their reply through [`LanguageModel::stream_chat`],
//! a blocking call meant to run on a generation worker thread.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use regex::Regex;

use crate::config::Config;
use crate::error::GenerationError;
use crate::provider::Provider;
use crate::transcript::ChatMessage;

/// Fixed repetition penalty applied to every chat turn.
pub const REPETITION_PENALTY: f32 = 1.1;

/// One inference call's worth of input.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub repetition_penalty: f32,
}

pub trait LanguageModel: Send + Sync {
    /// Streams the reply to `request`, handing each decoded fragment to `sink`
    /// in order. `sink` returns `false` once nobody is listening, and the call
    /// should stop reading as soon as it sees that.
    fn stream_chat(
        &self,
        request: &GenerationRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), GenerationError>;

    /// Short label for status lines, e.g. `Ollama: llama3.2`.
    fn describe(&self) -> String;
}

/// Removes chat-template control tokens such as `<|eot_id|>` or `</s>`.
pub fn strip_control_tokens(text: &str) -> String {
    static CONTROL: OnceLock<Regex> = OnceLock::new();
    let re = CONTROL.get_or_init(|| {
        Regex::new(r"<\|[A-Za-z0-9_\-]+\|>|</?s>").expect("control token pattern is valid")
    });
    re.replace_all(text, "").into_owned()
}

/// Longest control token (in bytes) worth holding back for.
const MAX_CONTROL_TOKEN_LEN: usize = 64;

/// Strips control tokens from a fragment stream, including tokens that
/// arrive split across fragments (`<|eot` then `_id|>`).
///
/// A trailing piece that could still grow into a token is held back until
/// the next fragment or [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct ControlTokenFilter {
    pending: String,
}

impl ControlTokenFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment and returns the text that is safe to emit.
    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let cleaned = strip_control_tokens(&self.pending);
        let hold = held_suffix_start(&cleaned);
        self.pending = cleaned[hold..].to_string();
        cleaned[..hold].to_string()
    }

    /// Releases whatever was held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}

fn held_suffix_start(text: &str) -> usize {
    match text.rfind('<') {
        Some(start) if is_token_prefix(&text[start..]) => start,
        _ => text.len(),
    }
}

fn is_token_prefix(piece: &str) -> bool {
    if piece.len() > MAX_CONTROL_TOKEN_LEN {
        return false;
    }
    if "</s>".starts_with(piece) || "<s>".starts_with(piece) {
        return true;
    }
    let Some(rest) = piece.strip_prefix("<|") else {
        return false;
    };
    let name = rest.strip_suffix('|').unwrap_or(rest);
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Builds the client for the configured provider.
pub fn build_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let provider = config.current_provider();
    let model = config.model_for(provider);

    match provider {
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(&config.ollama_url, &model))),
        Provider::OpenAI => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or(GenerationError::MissingApiKey(provider.api_key_env().unwrap_or("an API key")))?;
            let mut client = OpenAIClient::new(&key, &model).with_base_url(&config.openai_base_url);
            if let Some(prompt) = &config.system_prompt {
                client = client.with_system_prompt(prompt);
            }
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_control_tokens() {
        assert_eq!(strip_control_tokens("ሰላም<|eot_id|>"), "ሰላም");
        assert_eq!(strip_control_tokens("<s>hi</s>"), "hi");
        assert_eq!(strip_control_tokens("a < b | c > d"), "a < b | c > d");
    }

    fn filter_all(fragments: &[&str]) -> Vec<String> {
        let mut filter = ControlTokenFilter::new();
        let mut out: Vec<String> = fragments.iter().map(|f| filter.push(f)).collect();
        out.push(filter.finish());
        out.retain(|s| !s.is_empty());
        out
    }

    #[test]
    fn test_filter_removes_token_split_across_fragments() {
        assert_eq!(filter_all(&["ሰላም<|eot", "_id|>"]), vec!["ሰላም"]);
        assert_eq!(filter_all(&["ሰላም<|eot_id|", ">", " ነው"]), vec!["ሰላም", " ነው"]);
        assert_eq!(filter_all(&["hi<", "/s", ">"]), vec!["hi"]);
    }

    #[test]
    fn test_filter_releases_text_that_is_not_a_token() {
        assert_eq!(filter_all(&["a <", " b"]), vec!["a ", "< b"]);
        assert_eq!(filter_all(&["x <|not a token"]), vec!["x <|not a token"]);
        assert_eq!(filter_all(&["ends with <"]), vec!["ends with ", "<"]);
    }

    #[test]
    fn test_build_model_requires_openai_key() {
        let mut config = Config::new();
        config.provider = Some("openai".to_string());
        assert!(build_model(&config).is_err());

        config.openai_api_key = Some("sk-test".to_string());
        let model = build_model(&config).unwrap();
        assert_eq!(model.describe(), "OpenAI: gpt-4o-mini");
    }

    #[test]
    fn test_build_model_defaults_to_ollama() {
        let model = build_model(&Config::new()).unwrap();
        assert_eq!(model.describe(), "Ollama: llama3.2:latest");
    }
}
