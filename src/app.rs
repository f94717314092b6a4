use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::SessionError;
use crate::pipeline::{Session, Turn};
use crate::speech::play_audio;

/// Starter prompts cycled into the input box with Tab.
pub const SAMPLE_PROMPTS: &[&str] = &[
    "ሰላም",
    "ሰላም፣ እንዴት ነህ?",
    "አንተ ማንህ?",
    "ስለ ኢትዮጵያ የዘመን አቆጣጠር ንገረኝ?",
    "የአባይ ወንዝ መነሻና መደረሻ የት ነው?",
    "ለእናቴ የሚሆን አጭር የፍቅር ግጥም ጻፍልኝ?",
    "ሰው ሰራሽ አስተውሎት (AI) ምንድን ነው?",
    "ጥሩ የጤና አጠባበቅ ምክሮችን ንገረኝ?",
    "አንድ ተረት አጫውተኝ",
    "ቀልድ ንገረኝ",
    "ዳግማዊ ምኒልክ ማን ነው?",
    "ቢትኮይን ምንድን ነው?",
];

pub struct App {
    pub should_quit: bool,
    pub session: Session,
    pub active_turn: Option<Turn>,

    // Input box
    pub input: String,
    pub input_cursor: usize, // in chars, not bytes

    // Chat pane
    pub scroll: u16,
    pub follow_output: bool,
    pub chat_height: u16, // updated during render
    pub chat_width: u16,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub status: Option<String>,
    pub player_command: Option<String>,
    sample_index: usize,
}

impl App {
    pub fn new(session: Session, player_command: Option<String>) -> Self {
        Self {
            should_quit: false,
            session,
            active_turn: None,
            input: String::new(),
            input_cursor: 0,
            scroll: 0,
            follow_output: true,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            status: None,
            player_command,
            sample_index: 0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active_turn.is_some()
    }

    /// Sends the input box as a new turn. Ignored while a reply is running.
    pub fn submit_input(&mut self) {
        if self.session.is_busy() {
            self.status = Some("Still answering, wait for the reply to finish".to_string());
            return;
        }

        let text = std::mem::take(&mut self.input);
        self.input_cursor = 0;

        match self.session.submit(&text) {
            Ok(turn) => {
                self.active_turn = Some(turn);
                self.status = None;
                self.follow_output = true;
                self.scroll_to_bottom();
            }
            Err(SessionError::Busy) => {
                self.input = text;
                self.input_cursor = self.input.chars().count();
            }
        }
    }

    pub fn apply_fragment(&mut self, fragment: &str) {
        let Some(turn) = &self.active_turn else {
            return;
        };
        if self.session.apply_fragment(turn, fragment) && self.follow_output {
            self.scroll_to_bottom();
        }
    }

    /// Called once the fragment stream ends. Returns true when speech will
    /// be synthesized, so the caller can repaint before waiting on it.
    pub fn prepare_finish(&mut self) -> bool {
        let synthesizing = self
            .active_turn
            .as_ref()
            .is_some_and(|turn| self.session.will_synthesize(turn));
        if synthesizing {
            self.status = Some("Synthesizing speech…".to_string());
        }
        synthesizing
    }

    pub async fn finish_turn(&mut self) {
        let Some(turn) = self.active_turn.take() else {
            return;
        };

        let voice = self.session.settings().voice_enabled;
        let audio = self.session.finish_turn(turn).await;

        self.status = match &audio {
            Some(path) => Some(format!("Audio saved to {}", path.display())),
            None if voice && self.session.transcript().last().is_some_and(|m| !m.content.trim().is_empty()) => {
                Some("Speech synthesis failed, see log".to_string())
            }
            None => None,
        };

        if let Some(path) = audio {
            self.autoplay(path);
        }
        if self.follow_output {
            self.scroll_to_bottom();
        }
    }

    /// Empties the conversation. A reply still streaming is abandoned.
    pub fn clear_conversation(&mut self) {
        // Dropping the turn closes the channel and stops its worker.
        self.active_turn = None;
        self.session.clear();
        self.scroll = 0;
        self.follow_output = true;
        self.status = Some("Conversation cleared".to_string());
    }

    pub fn toggle_voice(&mut self) {
        let settings = self.session.settings_mut();
        settings.voice_enabled = !settings.voice_enabled;
        let state = if settings.voice_enabled { "on" } else { "off" };
        info!(voice = state, "voice toggled");
        self.status = Some(format!("Voice {}", state));
    }

    pub fn adjust_max_tokens(&mut self, steps: i32) {
        let settings = self.session.settings_mut();
        settings.adjust_max_tokens(steps);
        self.status = Some(format!("Max tokens: {}", settings.max_tokens));
    }

    /// Replaces the input with the next starter prompt.
    pub fn next_sample(&mut self) {
        let sample = SAMPLE_PROMPTS[self.sample_index % SAMPLE_PROMPTS.len()];
        self.sample_index += 1;
        self.input = sample.to_string();
        self.input_cursor = self.input.chars().count();
    }

    pub fn play_last_audio(&mut self) {
        match self.session.audio().map(|p| p.to_path_buf()) {
            Some(path) => self.play(path),
            None => self.status = Some("No audio for the last reply".to_string()),
        }
    }

    fn autoplay(&mut self, path: PathBuf) {
        if self.player_command.is_some() {
            self.play(path);
        }
    }

    fn play(&mut self, path: PathBuf) {
        let Some(player) = self.player_command.as_deref() else {
            self.status = Some(format!("Audio at {} (no player configured)", path.display()));
            return;
        };
        if let Err(e) = play_audio(player, &path) {
            warn!(error = %e, player, "audio player failed to start");
            self.status = Some(format!("Could not start player: {}", e));
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow_output = self.scroll >= max;
    }

    pub fn page_size(&self) -> u16 {
        self.chat_height.max(2) / 2
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_lines().saturating_sub(visible)
    }

    /// Rendered height of the chat pane, counting wrapped lines.
    pub fn chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total: usize = 0;
        for msg in self.session.transcript().messages() {
            total += 1; // role label
            if msg.content.is_empty() {
                total += 1; // placeholder or "Thinking..."
            }
            for line in msg.content.lines() {
                let chars = line.chars().count();
                total += chars.max(1).div_ceil(wrap_width);
            }
            total += 1; // gap after message
        }
        if let Some(translation) = self.session.translation() {
            total += 1; // language label
            for line in translation.lines() {
                total += line.chars().count().max(1).div_ceil(wrap_width);
            }
        }
        total.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GenerationRequest, LanguageModel};
    use crate::error::{GenerationError, SynthesisError};
    use crate::pipeline::ChatSettings;
    use crate::speech::{AudioArtifacts, SpeechSynthesizer};
    use std::path::Path;
    use std::sync::Arc;

    struct Echo;

    impl LanguageModel for Echo {
        fn stream_chat(
            &self,
            request: &GenerationRequest,
            sink: &mut dyn FnMut(String) -> bool,
        ) -> Result<(), GenerationError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            for word in ["እርስዎ ", "አሉ፦ ", last.as_str()] {
                if !sink(word.to_string()) {
                    break;
                }
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "Echo".to_string()
        }
    }

    struct Silent;

    impl SpeechSynthesizer for Silent {
        fn synthesize(&self, _text: &str, _language: &str, output: &Path) -> Result<(), SynthesisError> {
            std::fs::write(output, b"ID3")?;
            Ok(())
        }
    }

    fn app(dir: &Path, voice: bool) -> App {
        let settings = ChatSettings { voice_enabled: voice, ..ChatSettings::default() };
        let session = Session::new(Arc::new(Echo), Arc::new(Silent), AudioArtifacts::new(dir), settings);
        App::new(session, None)
    }

    async fn drain(app: &mut App) {
        while let Some(fragment) = app.active_turn.as_mut().unwrap().next_fragment().await {
            app.apply_fragment(&fragment);
        }
        app.prepare_finish();
        app.finish_turn().await;
    }

    #[tokio::test]
    async fn test_submit_streams_into_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), false);
        app.input = "ሰላም".to_string();
        app.input_cursor = 4;

        app.submit_input();
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert!(app.is_streaming());

        drain(&mut app).await;

        let messages = app.session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "እርስዎ አሉ፦ ሰላም");
        assert!(app.session.audio().is_none());
        assert!(!app.is_streaming());
    }

    #[tokio::test]
    async fn test_submit_while_streaming_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), false);
        app.input = "አንድ".to_string();
        app.submit_input();

        app.input = "ሁለት".to_string();
        app.submit_input();

        assert_eq!(app.input, "ሁለት");
        assert_eq!(app.session.transcript().len(), 2);
        assert!(app.status.is_some());
    }

    #[tokio::test]
    async fn test_voice_turn_reports_audio() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), true);
        app.input = "ሰላም".to_string();
        app.submit_input();

        drain(&mut app).await;

        let audio = app.session.audio().unwrap();
        assert!(audio.exists());
        assert!(app.status.as_deref().unwrap().starts_with("Audio saved to"));
    }

    #[tokio::test]
    async fn test_clear_abandons_active_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), true);
        app.input = "ሰላም".to_string();
        app.submit_input();

        app.clear_conversation();

        assert!(app.active_turn.is_none());
        assert!(app.session.transcript().is_empty());
        assert!(!app.session.is_busy());
    }

    #[test]
    fn test_next_sample_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), false);
        app.next_sample();
        assert_eq!(app.input, SAMPLE_PROMPTS[0]);
        app.next_sample();
        assert_eq!(app.input, SAMPLE_PROMPTS[1]);
        assert_eq!(app.input_cursor, SAMPLE_PROMPTS[1].chars().count());
    }

    #[test]
    fn test_max_tokens_adjustment_shows_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), false);
        app.adjust_max_tokens(-1);
        assert_eq!(app.session.settings().max_tokens, 224);
        assert_eq!(app.status.as_deref(), Some("Max tokens: 224"));
    }
}
