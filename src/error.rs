//! Error types for the library seams.
//!
//! Application edges (CLI commands, the TUI loop) use `anyhow`; these enums
//! describe what can go wrong inside a model call, a speech call, a translation,
//! the session controller and the dataset tools.

/// A language model call that could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport failure talking to the model service.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service reported an error inside the stream.
    #[error("model service error: {0}")]
    Service(String),

    /// A streamed chunk could not be decoded.
    #[error("could not decode stream chunk: {0}")]
    Decode(String),

    /// Reading the response body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hosted provider was selected without credentials.
    #[error("missing credentials: set {0}")]
    MissingApiKey(&'static str),
}

/// Speech synthesis failure. Always recoverable: the turn keeps its text.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech service returned {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{program}` exited with {status}")]
    Command { program: String, status: String },

    #[error("speech command template is empty")]
    EmptyTemplate,

    #[error("nothing to synthesize")]
    EmptyText,
}

/// Reply translation failure. The reply is then spoken untranslated.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation service returned {0}")]
    Status(u16),

    #[error("unexpected translation response: {0}")]
    Decode(String),
}

/// Session controller refusal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// A turn is still streaming or finalizing; submissions are single-flight.
    #[error("a reply is still being generated")]
    Busy,
}

/// Dataset generation and conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 429 from the hosted model.
    #[error("rate limited by the model service")]
    RateLimited,

    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The model answered but not with the requested JSON list.
    #[error("unexpected model output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A PDF or DOCX file whose text could not be extracted.
    #[error("could not extract document text: {0}")]
    Document(String),
}

impl DatasetError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, DatasetError::RateLimited)
    }
}
