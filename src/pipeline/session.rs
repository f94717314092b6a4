//! Session controller: owns the transcript, opens turns, applies streamed
//! fragments and runs speech synthesis once per finished turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::worker::{FragmentStream, spawn_generation};
use crate::ai::{GenerationRequest, LanguageModel, REPETITION_PENALTY};
use crate::error::SessionError;
use crate::speech::{AudioArtifacts, SpeechSynthesizer};
use crate::transcript::{ChatRole, Transcript};
use crate::translate::Translator;

/// Per-session knobs the user can change between turns.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub max_tokens: u32,
    /// Prior messages fed back to the model each turn.
    pub context_messages: usize,
    pub repetition_penalty: f32,
    pub voice_enabled: bool,
    /// Language tag handed to the speech service.
    pub language: String,
}

impl ChatSettings {
    pub const MIN_TOKENS: u32 = 32;
    pub const MAX_TOKENS: u32 = 1024;
    pub const TOKEN_STEP: u32 = 32;

    /// Moves the reply length bound by whole steps, staying within range.
    pub fn adjust_max_tokens(&mut self, steps: i32) {
        let next = self.max_tokens as i64 + steps as i64 * Self::TOKEN_STEP as i64;
        self.max_tokens = next.clamp(Self::MIN_TOKENS as i64, Self::MAX_TOKENS as i64) as u32;
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            context_messages: 6,
            repetition_penalty: REPETITION_PENALTY,
            voice_enabled: true,
            language: "am".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingSubmit,
    Streaming,
    Finalizing,
}

/// What the display shows after each pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayUpdate {
    pub transcript: Transcript,
    pub audio: Option<PathBuf>,
    pub audio_visible: bool,
    /// The last reply in the session language, when translation is on.
    pub translation: Option<String>,
}

/// Handle to one in-flight turn. Dropping it abandons the reply.
#[derive(Debug)]
pub struct Turn {
    id: u64,
    epoch: u64,
    fragments: FragmentStream,
}

impl Turn {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn next_fragment(&mut self) -> Option<String> {
        self.fragments.next().await
    }
}

pub struct Session {
    transcript: Transcript,
    audio: Option<PathBuf>,
    translation: Option<String>,
    state: TurnState,
    settings: ChatSettings,
    model: Arc<dyn LanguageModel>,
    speech: Arc<dyn SpeechSynthesizer>,
    translator: Option<Arc<dyn Translator>>,
    artifacts: AudioArtifacts,
    // Bumped by clear(); turns from an older epoch are ignored.
    epoch: u64,
    turns_started: u64,
}

impl Session {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        artifacts: AudioArtifacts,
        settings: ChatSettings,
    ) -> Self {
        Self {
            transcript: Transcript::new(),
            audio: None,
            translation: None,
            state: TurnState::AwaitingSubmit,
            settings,
            model,
            speech,
            translator: None,
            artifacts,
            epoch: 0,
            turns_started: 0,
        }
    }

    /// Translates each finished reply into the session language before it
    /// is spoken.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn audio(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    pub fn audio_visible(&self) -> bool {
        self.audio.is_some()
    }

    pub fn translation(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != TurnState::AwaitingSubmit
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ChatSettings {
        &mut self.settings
    }

    pub fn model_label(&self) -> String {
        self.model.describe()
    }

    pub fn snapshot(&self) -> DisplayUpdate {
        DisplayUpdate {
            transcript: self.transcript.clone(),
            audio: self.audio.clone(),
            audio_visible: self.audio_visible(),
            translation: self.translation.clone(),
        }
    }

    /// Opens a turn for `text` and starts generating the reply.
    ///
    /// Empty text is accepted and produces an empty user message. Refused with
    /// [`SessionError::Busy`] while the previous turn is still running.
    pub fn submit(&mut self, text: &str) -> Result<Turn, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }

        self.transcript.begin_turn(text);
        self.audio = None;
        self.translation = None;
        self.state = TurnState::Streaming;
        self.turns_started += 1;

        let request = GenerationRequest {
            messages: self.transcript.context_window(self.settings.context_messages),
            max_tokens: self.settings.max_tokens,
            repetition_penalty: self.settings.repetition_penalty,
        };
        info!(
            turn = self.turns_started,
            context = request.messages.len(),
            max_tokens = request.max_tokens,
            "turn submitted"
        );

        let fragments = spawn_generation(self.model.clone(), request, self.turns_started);
        Ok(Turn {
            id: self.turns_started,
            epoch: self.epoch,
            fragments,
        })
    }

    /// Appends one fragment to the reply being streamed.
    ///
    /// Returns `false` (and changes nothing) when the turn was cleared away.
    pub fn apply_fragment(&mut self, turn: &Turn, fragment: &str) -> bool {
        if turn.epoch != self.epoch || self.state != TurnState::Streaming {
            return false;
        }
        self.transcript.append_to_last(fragment)
    }

    /// Whether finishing `turn` will attempt speech synthesis.
    pub fn will_synthesize(&self, turn: &Turn) -> bool {
        turn.epoch == self.epoch && self.settings.voice_enabled && !self.final_reply().is_empty()
    }

    /// Closes the turn once its fragments are exhausted.
    ///
    /// Runs speech synthesis at most once, only when voice is enabled and the
    /// reply is not blank. With a translator attached the translated reply is
    /// spoken instead. Synthesis failures are logged and leave the audio
    /// absent, with no file on disk.
    pub async fn finish_turn(&mut self, turn: Turn) -> Option<PathBuf> {
        if turn.epoch != self.epoch {
            debug!(turn = turn.id, "discarding turn from a cleared conversation");
            return None;
        }

        self.state = TurnState::Finalizing;
        let reply = self.final_reply();

        if !reply.is_empty() && self.translator.is_some() {
            self.translation = self.translate(reply.clone()).await;
        }
        let spoken = self.translation.clone().unwrap_or_else(|| reply.clone());

        let audio = if self.settings.voice_enabled && !reply.is_empty() {
            self.synthesize(spoken).await
        } else {
            debug!(turn = turn.id, "no speech for this turn");
            None
        };

        info!(
            turn = turn.id,
            reply_chars = reply.chars().count(),
            audio = ?audio,
            "turn complete"
        );

        self.audio = audio.clone();
        self.state = TurnState::AwaitingSubmit;
        audio
    }

    /// Forgets the conversation and any audio. An in-flight turn becomes stale.
    pub fn clear(&mut self) {
        if self.is_busy() {
            info!("conversation cleared mid-turn");
        }
        self.transcript.clear();
        self.audio = None;
        self.translation = None;
        self.state = TurnState::AwaitingSubmit;
        self.epoch += 1;
    }

    /// Drives a whole turn, publishing a snapshot after every step.
    pub async fn run_turn<F>(&mut self, text: &str, mut publish: F) -> Result<Option<PathBuf>, SessionError>
    where
        F: FnMut(DisplayUpdate),
    {
        let mut turn = self.submit(text)?;
        publish(self.snapshot());

        while let Some(fragment) = turn.next_fragment().await {
            if self.apply_fragment(&turn, &fragment) {
                publish(self.snapshot());
            }
        }

        let audio = self.finish_turn(turn).await;
        publish(self.snapshot());
        Ok(audio)
    }

    fn final_reply(&self) -> String {
        self.transcript
            .last()
            .filter(|m| m.role == ChatRole::Assistant)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default()
    }

    async fn synthesize(&self, text: String) -> Option<PathBuf> {
        let path = match self.artifacts.next_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(dir = %self.artifacts.dir().display(), error = %e, "cannot prepare audio directory");
                return None;
            }
        };

        let speech = self.speech.clone();
        let language = self.settings.language.clone();
        let output = path.clone();
        let result =
            tokio::task::spawn_blocking(move || speech.synthesize(&text, &language, &output)).await;

        match result {
            Ok(Ok(())) => return Some(path),
            Ok(Err(e)) => warn!(error = %e, "speech synthesis failed"),
            Err(e) => error!(error = %e, "speech synthesis task panicked"),
        }

        // A failed attempt may have left a truncated file behind.
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove failed audio file");
            }
        }
        None
    }

    /// Translation failures fall back to speaking the reply as written.
    async fn translate(&self, text: String) -> Option<String> {
        let translator = self.translator.clone()?;
        let language = self.settings.language.clone();
        let result =
            tokio::task::spawn_blocking(move || translator.translate(&text, &language)).await;

        match result {
            Ok(Ok(translated)) if !translated.trim().is_empty() => Some(translated),
            Ok(Ok(_)) => {
                warn!("translation came back empty");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "reply translation failed");
                None
            }
            Err(e) => {
                error!(error = %e, "translation task panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_max_tokens_clamps() {
        let mut settings = ChatSettings::default();
        settings.adjust_max_tokens(1);
        assert_eq!(settings.max_tokens, 288);

        settings.adjust_max_tokens(-100);
        assert_eq!(settings.max_tokens, ChatSettings::MIN_TOKENS);

        settings.adjust_max_tokens(100);
        assert_eq!(settings.max_tokens, ChatSettings::MAX_TOKENS);
    }
}
