use std::io::{BufRead, BufReader};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ControlTokenFilter, GenerationRequest, LanguageModel};
use crate::config::DEFAULT_OPENAI_URL;
use crate::error::GenerationError;

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    frequency_penalty: f32,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    /// Set when the service fails after the stream has started.
    #[serde(default)]
    error: Option<OpenAIStreamError>,
}

#[derive(Deserialize)]
struct OpenAIStreamError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
}

impl OpenAIClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_OPENAI_URL.to_string(),
            model: model.to_string(),
            system_prompt: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    /// Chat models known to handle Amharic; the API is not queried.
    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o-mini".to_string(),
            "gpt-4o".to_string(),
            "gpt-4.1-mini".to_string(),
            "gpt-4.1".to_string(),
        ]
    }

    fn build_request<'a>(&'a self, request: &'a GenerationRequest) -> OpenAIRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(OpenAIMessage { role: "system", content: prompt });
        }
        messages.extend(request.messages.iter().map(|m| OpenAIMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        OpenAIRequest {
            model: &self.model,
            messages,
            stream: true,
            max_tokens: request.max_tokens,
            // 1.1 repetition penalty -> 0.1 frequency penalty
            frequency_penalty: (request.repetition_penalty - 1.0).clamp(-2.0, 2.0),
        }
    }
}

/// Classifies one SSE line of a streamed completion.
fn parse_sse_line(line: &str) -> Result<SseLine, GenerationError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: OpenAIStreamChunk =
        serde_json::from_str(data).map_err(|e| GenerationError::Decode(e.to_string()))?;
    if let Some(error) = chunk.error {
        return Err(GenerationError::Service(error.message));
    }
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok(SseLine::Text(text))
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Text(String),
}

impl LanguageModel for OpenAIClient {
    fn stream_chat(
        &self,
        request: &GenerationRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = reqwest::blocking::Client::new()
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.build_request(request))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let mut filter = ControlTokenFilter::new();
        for line in BufReader::new(response).lines() {
            match parse_sse_line(&line?)? {
                SseLine::Skip => {}
                SseLine::Done => break,
                SseLine::Text(text) => {
                    let text = filter.push(&text);
                    if !text.is_empty() && !sink(text) {
                        debug!("consumer went away, abandoning openai stream");
                        return Ok(());
                    }
                }
            }
        }

        let rest = filter.finish();
        if !rest.is_empty() {
            sink(rest);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("OpenAI: {}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ChatMessage;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"ሰላም"}}]}"#).unwrap(),
            SseLine::Text("ሰላም".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Text(String::new())
        );
        assert!(parse_sse_line("data: {broken").is_err());
    }

    #[test]
    fn test_in_stream_error_is_reported() {
        let line = r#"data: {"error":{"message":"The server had an error","type":"server_error"}}"#;
        match parse_sse_line(line) {
            Err(GenerationError::Service(message)) => assert_eq!(message, "The server had an error"),
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_request_prepends_system_prompt() {
        let client = OpenAIClient::new("sk", "gpt-4o-mini").with_system_prompt("Answer in Amharic.");
        let request = GenerationRequest {
            messages: vec![ChatMessage::user("ሰላም")],
            max_tokens: 64,
            repetition_penalty: 1.1,
        };

        let body = serde_json::to_value(client.build_request(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "ሰላም");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
    }
}
