//! Speech synthesis backends and audio artifact naming.

pub mod command;
pub mod google;

pub use command::CommandSynthesizer;
pub use google::GoogleTranslateTts;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};

use crate::config::{Config, DEFAULT_SPEECH_COMMAND};
use crate::error::SynthesisError;

/// Text-to-speech service. Blocking; callers run it off the event loop.
pub trait SpeechSynthesizer: Send + Sync {
    /// Writes speech for `text` in `language` (BCP-47 tag, e.g. `am`) to `output`.
    fn synthesize(&self, text: &str, language: &str, output: &Path) -> Result<(), SynthesisError>;
}

/// Process-wide artifact counter. Starts at zero; the first artifact is 1.
static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Names audio files `response_{n}.mp3` inside one output directory.
#[derive(Debug, Clone)]
pub struct AudioArtifacts {
    dir: PathBuf,
}

impl AudioArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves the next file name. Numbers are never reused within a process.
    pub fn next_path(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let n = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(self.dir.join(format!("response_{}.mp3", n)))
    }
}

pub fn build_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    match config.speech_backend.as_deref().unwrap_or("google") {
        "google" => Ok(Arc::new(GoogleTranslateTts::new())),
        "command" => {
            let template = config.speech_command.as_deref().unwrap_or(DEFAULT_SPEECH_COMMAND);
            Ok(Arc::new(CommandSynthesizer::from_template(template)?))
        }
        other => Err(anyhow!("unknown speech backend `{}` (expected google or command)", other)),
    }
}

/// Hands an audio file to the configured player without waiting for it.
pub fn play_audio(player_command: &str, path: &Path) -> Result<()> {
    let mut parts = player_command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("player command is empty"))?;

    Command::new(program)
        .args(parts)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_numbers_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = AudioArtifacts::new(dir.path().join("audio"));

        let numbers: Vec<u64> = (0..3)
            .map(|_| {
                let path = artifacts.next_path().unwrap();
                let name = path.file_stem().unwrap().to_string_lossy().into_owned();
                name.trim_start_matches("response_").parse().unwrap()
            })
            .collect();

        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        assert!(dir.path().join("audio").is_dir());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut config = Config::new();
        config.speech_backend = Some("festival".to_string());
        assert!(build_synthesizer(&config).is_err());

        config.speech_backend = Some("command".to_string());
        assert!(build_synthesizer(&config).is_ok());
    }

    #[test]
    fn test_empty_player_command_errors() {
        assert!(play_audio("   ", Path::new("x.mp3")).is_err());
    }
}
