//! Synthetic Amharic reasoning dataset, generated in batches by Gemini.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::export::{write_csv, write_jsonl, write_parquet};
use super::harmony::{ReasoningItem, ReasoningRow};
use crate::error::DatasetError;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-preview";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn batch_prompt(batch_size: usize) -> String {
    format!(
        "Generate {batch_size} unique and complex Amharic reasoning tasks.\n\
         Topics: Logic puzzles, Amharic grammar nuances, math word problems, or cultural ethics.\n\
         Return ONLY a JSON list:\n\
         [\n  {{\"q\": \"question in Amharic\", \"t\": \"step-by-step thinking in Amharic\", \"a\": \"answer\"}},\n  ...\n]"
    )
}

/// Anything that can produce a batch of reasoning items.
pub trait BatchSource {
    fn fetch_batch(
        &self,
        batch_size: usize,
    ) -> impl Future<Output = Result<Vec<ReasoningItem>, DatasetError>> + Send;
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl BatchSource for GeminiClient {
    async fn fetch_batch(&self, batch_size: usize) -> Result<Vec<ReasoningItem>, DatasetError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": batch_prompt(batch_size) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "thinkingConfig": { "thinkingLevel": "HIGH" }
            }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DatasetError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasetError::Status { status: status.as_u16(), body });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        parse_batch(&text)
    }
}

/// Parses the model's JSON list, tolerating a Markdown code fence around it.
pub fn parse_batch(text: &str) -> Result<Vec<ReasoningItem>, DatasetError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| DatasetError::Parse(format!("{} in {:.80}", e, unfenced)))
}

/// Pauses between requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub after_success: Duration,
    pub after_rate_limit: Duration,
    pub after_error: Duration,
    /// Stop after this many requests even if the target was not reached.
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            after_success: Duration::from_secs(2),
            after_rate_limit: Duration::from_secs(30),
            after_error: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Requests batches until `target` rows exist, then truncates to `target`.
pub async fn generate_dataset<S: BatchSource>(
    source: &S,
    target: usize,
    batch_size: usize,
    policy: &RetryPolicy,
) -> Vec<ReasoningRow> {
    let mut rows: Vec<ReasoningRow> = Vec::with_capacity(target);
    let mut attempts = 0usize;

    info!(target, batch_size, "starting dataset generation");

    while rows.len() < target {
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            warn!(attempts, collected = rows.len(), "giving up before reaching target");
            break;
        }
        attempts += 1;

        match source.fetch_batch(batch_size).await {
            Ok(items) => {
                rows.extend(items.into_iter().map(ReasoningRow::from));
                info!("Progress: {}/{}", rows.len().min(target), target);
                tokio::time::sleep(policy.after_success).await;
            }
            Err(e) if e.is_rate_limit() => {
                warn!("rate limit hit, sleeping {:?}", policy.after_rate_limit);
                tokio::time::sleep(policy.after_rate_limit).await;
            }
            Err(e) => {
                error!(error = %e, "batch failed");
                tokio::time::sleep(policy.after_error).await;
            }
        }
    }

    rows.truncate(target);
    rows
}

/// Writes `dataset.jsonl`, a BOM-prefixed `dataset.csv` and
/// `dataset.parquet` into `folder`.
pub fn save_dataset(rows: &[ReasoningRow], folder: &Path) -> Result<(), DatasetError> {
    fs::create_dir_all(folder)?;
    write_jsonl(&folder.join("dataset.jsonl"), rows)?;
    write_csv(&folder.join("dataset.csv"), rows, true)?;
    write_parquet(&folder.join("dataset.parquet"), rows)?;
    info!(rows = rows.len(), dir = %folder.display(), "dataset saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::export::read_parquet_columns;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays canned results, one per request.
    struct Replay(Mutex<VecDeque<Result<Vec<ReasoningItem>, DatasetError>>>);

    impl Replay {
        fn new(results: Vec<Result<Vec<ReasoningItem>, DatasetError>>) -> Self {
            Self(Mutex::new(results.into()))
        }
    }

    impl BatchSource for Replay {
        async fn fetch_batch(&self, _batch_size: usize) -> Result<Vec<ReasoningItem>, DatasetError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DatasetError::Parse("exhausted".to_string())))
        }
    }

    fn items(n: usize) -> Vec<ReasoningItem> {
        (0..n)
            .map(|i| ReasoningItem {
                q: format!("ጥያቄ {}", i),
                t: "ሀሳብ".to_string(),
                a: "መልስ".to_string(),
            })
            .collect()
    }

    fn instant() -> RetryPolicy {
        RetryPolicy {
            after_success: Duration::ZERO,
            after_rate_limit: Duration::ZERO,
            after_error: Duration::ZERO,
            max_attempts: Some(10),
        }
    }

    #[test]
    fn test_parse_batch_accepts_fenced_json() {
        let text = "```json\n[{\"q\":\"ሀ\",\"t\":\"ለ\",\"a\":\"ሐ\"}]\n```";
        let batch = parse_batch(text).unwrap();
        assert_eq!(batch[0].q, "ሀ");
    }

    #[test]
    fn test_parse_batch_rejects_prose() {
        assert!(matches!(parse_batch("Sure! Here you go"), Err(DatasetError::Parse(_))));
    }

    #[tokio::test]
    async fn test_generation_retries_and_truncates() {
        let source = Replay::new(vec![
            Ok(items(4)),
            Err(DatasetError::RateLimited),
            Err(DatasetError::Parse("bad".to_string())),
            Ok(items(4)),
        ]);

        let rows = generate_dataset(&source, 6, 4, &instant()).await;

        assert_eq!(rows.len(), 6);
        assert!(rows[0].text.contains("<|start|>user<|message|>ጥያቄ 0<|end|>"));
    }

    #[tokio::test]
    async fn test_generation_stops_at_max_attempts() {
        let source = Replay::new(vec![Ok(items(1))]);
        let policy = RetryPolicy { max_attempts: Some(3), ..instant() };

        let rows = generate_dataset(&source, 100, 4, &policy).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_gemini_client_parses_candidate_text() {
        let server = MockServer::start().await;
        let model_text = r#"[{"q":"ሰላም?","t":"ማሰብ","a":"አዎ"}]"#;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": model_text }] } }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("key", "gemini-test").with_base_url(&server.uri());
        let batch = client.fetch_batch(1).await.unwrap();
        assert_eq!(batch, vec![ReasoningItem { q: "ሰላም?".into(), t: "ማሰብ".into(), a: "አዎ".into() }]);
    }

    #[tokio::test]
    async fn test_gemini_client_maps_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = GeminiClient::new("key", "gemini-test").with_base_url(&server.uri());
        assert!(matches!(client.fetch_batch(4).await, Err(DatasetError::RateLimited)));
    }

    #[test]
    fn test_save_dataset_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Amharic_reasoning_dataset");
        let rows: Vec<ReasoningRow> = items(2).into_iter().map(ReasoningRow::from).collect();

        save_dataset(&rows, &folder).unwrap();

        let jsonl = fs::read_to_string(folder.join("dataset.jsonl")).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        let csv = fs::read(folder.join("dataset.csv")).unwrap();
        assert!(csv.starts_with(b"\xEF\xBB\xBFinstruction,thought,output,text"));

        let (columns, values) = read_parquet_columns(&folder.join("dataset.parquet"));
        assert_eq!(columns, vec!["instruction", "thought", "output", "text"]);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1][0], rows[1].instruction);
        assert_eq!(values[1][3], rows[1].text);
    }
}
