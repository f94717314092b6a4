use std::io::{BufRead, BufReader};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use tracing::debug;

use super::{ControlTokenFilter, GenerationRequest, LanguageModel};
use crate::error::GenerationError;
use crate::transcript::ChatMessage;

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    repeat_penalty: f32,
}

/// One NDJSON line of a streamed `/api/chat` response.
#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

impl LanguageModel for OllamaClient {
    fn stream_chat(
        &self,
        request: &GenerationRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: true,
            options: OllamaOptions {
                num_predict: request.max_tokens,
                repeat_penalty: request.repetition_penalty,
            },
        };

        // The blocking client lives and dies on the worker thread.
        let response = reqwest::blocking::Client::new()
            .post(&url)
            .json(&body)
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
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: OllamaChatChunk = serde_json::from_str(&line)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;

            if let Some(error) = chunk.error {
                return Err(GenerationError::Service(error));
            }

            if let Some(message) = chunk.message {
                let text = filter.push(&message.content);
                if !text.is_empty() && !sink(text) {
                    debug!("consumer went away, abandoning ollama stream");
                    return Ok(());
                }
            }

            if chunk.done {
                break;
            }
        }

        let rest = filter.finish();
        if !rest.is_empty() {
            sink(rest);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Ollama: {}", self.model)
    }
}
