//! Row shapes for Harmony-format (GPT-OSS) Amharic training data.

use serde::{Deserialize, Serialize};

use super::export::TextColumns;

pub const REASONING_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that reasons step-by-step in Amharic.";
pub const CORPUS_DEVELOPER_PROMPT: &str =
    "You are a helpful Amharic AI assistant. Reasoning: medium";
/// "Provide me more Amharic text"
pub const CORPUS_USER_PROMPT: &str = "ተጨማሪ የአማርኛ ጽሑፎችን አቅርብልኝ";

/// One generated reasoning task as the model returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub q: String,
    pub t: String,
    pub a: String,
}

/// A reasoning sample plus its Harmony wire rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningRow {
    pub instruction: String,
    pub thought: String,
    pub output: String,
    pub text: String,
}

impl From<ReasoningItem> for ReasoningRow {
    fn from(item: ReasoningItem) -> Self {
        let text = format_harmony_wire(&item.q, &item.t, &item.a);
        Self {
            instruction: item.q,
            thought: item.t,
            output: item.a,
            text,
        }
    }
}

impl TextColumns for ReasoningRow {
    const COLUMNS: &'static [&'static str] = &["instruction", "thought", "output", "text"];

    fn values(&self) -> Vec<&str> {
        vec![
            self.instruction.as_str(),
            self.thought.as_str(),
            self.output.as_str(),
            self.text.as_str(),
        ]
    }
}

/// Renders a system/user/analysis/final exchange in Harmony wire format.
pub fn format_harmony_wire(instruction: &str, thought: &str, final_output: &str) -> String {
    format!(
        "<|start|>system<|message|>{REASONING_SYSTEM_PROMPT}<|end|>\n\
         <|start|>user<|message|>{instruction}<|end|>\n\
         <|start|>assistant<|channel|>analysis<|message|>{thought}<|end|>\n\
         <|start|>assistant<|channel|>final<|message|>{final_output}<|end|>"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonyMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<String>,
}

/// A corpus chunk shaped like the Multilingual-Thinking dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRow {
    pub reasoning_language: String,
    pub developer: String,
    pub user: String,
    pub analysis: String,
    #[serde(rename = "final")]
    pub final_text: String,
    pub messages: Vec<HarmonyMessage>,
}

impl CorpusRow {
    pub fn from_chunk(chunk: &str) -> Self {
        Self {
            reasoning_language: "Amharic".to_string(),
            developer: CORPUS_DEVELOPER_PROMPT.to_string(),
            user: format!("{} (Provide me more Amharic text)", CORPUS_USER_PROMPT),
            analysis: String::new(),
            final_text: chunk.to_string(),
            messages: vec![
                HarmonyMessage {
                    role: "system".to_string(),
                    content: CORPUS_DEVELOPER_PROMPT.to_string(),
                    thinking: None,
                },
                HarmonyMessage {
                    role: "user".to_string(),
                    content: CORPUS_USER_PROMPT.to_string(),
                    thinking: None,
                },
                HarmonyMessage {
                    role: "assistant".to_string(),
                    content: chunk.to_string(),
                    thinking: Some(String::new()),
                },
            ],
        }
    }
}

/// Flat form of [`CorpusRow`] for CSV, with `messages` as a JSON string.
#[derive(Debug, Serialize)]
pub struct CorpusCsvRecord<'a> {
    pub reasoning_language: &'a str,
    pub developer: &'a str,
    pub user: &'a str,
    pub analysis: &'a str,
    #[serde(rename = "final")]
    pub final_text: &'a str,
    pub messages: String,
}

impl<'a> CorpusCsvRecord<'a> {
    pub fn new(row: &'a CorpusRow) -> serde_json::Result<Self> {
        Ok(Self {
            reasoning_language: &row.reasoning_language,
            developer: &row.developer,
            user: &row.user,
            analysis: &row.analysis,
            final_text: &row.final_text,
            messages: serde_json::to_string(&row.messages)?,
        })
    }
}

impl TextColumns for CorpusCsvRecord<'_> {
    const COLUMNS: &'static [&'static str] =
        &["reasoning_language", "developer", "user", "analysis", "final", "messages"];

    fn values(&self) -> Vec<&str> {
        vec![
            self.reasoning_language,
            self.developer,
            self.user,
            self.analysis,
            self.final_text,
            self.messages.as_str(),
        ]
    }
}
