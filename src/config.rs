use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow};

use crate::pipeline::ChatSettings;
use crate::provider::Provider;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Voice used by the default edge-tts command template.
pub const DEFAULT_SPEECH_COMMAND: &str =
    "edge-tts --voice am-ET-MekdesNeural --text {text} --write-media {output}";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    /// Chosen model per provider, keyed by provider name.
    pub models: BTreeMap<String, String>,
    pub ollama_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub system_prompt: Option<String>,

    // Translate finished replies into `language` before speaking them
    pub translate_replies: bool,
    pub translate_url: Option<String>,

    // Generation
    pub max_tokens: u32,
    pub context_messages: usize,
    pub repetition_penalty: f32,

    // Speech
    pub voice_enabled: bool,
    pub language: String,
    pub speech_backend: Option<String>,
    pub speech_command: Option<String>,
    pub audio_dir: PathBuf,
    pub player_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("ollama".to_string()),
            models: BTreeMap::new(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_URL.to_string(),
            gemini_api_key: None,
            system_prompt: None,
            translate_replies: false,
            translate_url: None,
            max_tokens: 256,
            context_messages: 6,
            repetition_penalty: 1.1,
            voice_enabled: true,
            language: "am".to_string(),
            speech_backend: Some("google".to_string()),
            speech_command: None,
            audio_dir: PathBuf::from("./audio_responses"),
            player_command: None,
        }
    }

    /// Loads the user config, falling back to defaults when none exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(provider: Provider, model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.set_model(provider, model);
        config.save()
    }

    pub fn set_model(&mut self, provider: Provider, model: &str) {
        self.models.insert(provider.to_string(), model.to_string());
    }

    /// Environment variables win over the file: `OPENAI_API_KEY`,
    /// `GEMINI_API_KEY` and `OLLAMA_HOST`.
    pub fn with_env(mut self) -> Self {
        self.apply_env_overrides(|key| std::env::var(key).ok());
        self
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.gemini_api_key = Some(key);
        }
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.is_empty()) {
            self.ollama_url = if host.starts_with("http://") || host.starts_with("https://") {
                host
            } else {
                format!("http://{}", host)
            };
        }
    }

    pub fn current_provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    /// The saved model for `provider`, or its built-in default.
    pub fn model_for(&self, provider: Provider) -> String {
        self.models
            .get(provider.as_str())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            max_tokens: self.max_tokens.clamp(ChatSettings::MIN_TOKENS, ChatSettings::MAX_TOKENS),
            context_messages: self.context_messages,
            repetition_penalty: self.repetition_penalty,
            voice_enabled: self.voice_enabled,
            language: self.language.clone(),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("amharic-chat").join("config.json"))
    }

    /// Where log files go; falls back to the working directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("amharic-chat"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.context_messages, 6);
        assert!((config.repetition_penalty - 1.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.set_model(Provider::Ollama, "gemma3:latest");
        config.voice_enabled = false;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"openai","max_tokens":512}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.current_provider(), Provider::OpenAI);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.language, "am");
        assert_eq!(config.model_for(Provider::OpenAI), "gpt-4o-mini");
    }

    #[test]
    fn test_saved_model_belongs_to_its_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"ollama","models":{"ollama":"gemma3:latest"}}"#).unwrap();

        let mut config = Config::load_from(&path).unwrap();
        assert_eq!(config.model_for(Provider::Ollama), "gemma3:latest");

        config.provider = Some("openai".to_string());
        assert_eq!(config.model_for(config.current_provider()), "gpt-4o-mini");

        config.set_model(Provider::OpenAI, "gpt-4.1");
        assert_eq!(config.model_for(Provider::OpenAI), "gpt-4.1");
        assert_eq!(config.model_for(Provider::Ollama), "gemma3:latest");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OLLAMA_HOST", "10.0.0.5:11434"),
            ("GEMINI_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.ollama_url, "http://10.0.0.5:11434");
        assert_eq!(config.gemini_api_key, None);
    }

    #[test]
    fn test_chat_settings_clamps_token_bound() {
        let mut config = Config::new();
        config.max_tokens = 5000;
        assert_eq!(config.chat_settings().max_tokens, ChatSettings::MAX_TOKENS);
    }
}
