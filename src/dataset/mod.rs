//! Dataset tooling: synthetic reasoning samples and document conversion,
//! both emitted in the Harmony format used to fine-tune GPT-OSS models.

pub mod convert;
pub mod export;
pub mod generate;
pub mod harmony;

pub use convert::{convert_directory, save_corpus};
pub use generate::{GeminiClient, RetryPolicy, generate_dataset, save_dataset};
pub use harmony::{CorpusRow, ReasoningItem, ReasoningRow, format_harmony_wire};
