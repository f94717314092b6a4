//! External text-to-speech command, e.g. `edge-tts`.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::SpeechSynthesizer;
use crate::error::SynthesisError;

/// Runs a program with `{text}`, `{output}` and `{lang}` substituted into its
/// arguments. No shell is involved, so the text needs no quoting.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated template such as
    /// `edge-tts --voice am-ET-MekdesNeural --text {text} --write-media {output}`.
    pub fn from_template(template: &str) -> Result<Self, SynthesisError> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SynthesisError::EmptyTemplate)?;
        Ok(Self::new(program, parts.collect()))
    }

    fn expand_args(&self, text: &str, language: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{lang}", language)
                    .replace("{text}", text)
            })
            .collect()
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str, language: &str, output: &Path) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let args = self.expand_args(text, language, output);
        debug!(program = %self.program, output = %output.display(), "running speech command");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            debug!(stderr = %stderr.trim(), "speech command failed");
            return Err(SynthesisError::Command {
                program: self.program.clone(),
                status: result.status.to_string(),
            });
        }

        if !output.exists() {
            return Err(SynthesisError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} produced no file at {}", self.program, output.display()),
            )));
        }

        Ok(())
    }
}
