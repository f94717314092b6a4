//! Line-mode chat for terminals where the full-screen UI is unwanted.

use std::io::Write;

use anyhow::Result;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::pipeline::Session;
use crate::speech::play_audio;

enum Command<'a> {
    Quit,
    Clear,
    ToggleVoice,
    Say(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "quit" | "exit" | "/quit" => Command::Quit,
        "/clear" => Command::Clear,
        "/voice" => Command::ToggleVoice,
        _ => Command::Say(line.trim_end_matches(['\r', '\n'])),
    }
}

pub async fn run(mut session: Session, player_command: Option<String>) -> Result<()> {
    println!("{}", format!("🗣  {}", session.model_label()).bold().blue());
    println!(
        "{}",
        "Type a message. /clear resets, /voice toggles speech, quit exits.".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", "You:".bold().cyan());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Quit => break,
            Command::Clear => {
                session.clear();
                println!("{}", "Conversation cleared".yellow());
            }
            Command::ToggleVoice => {
                let settings = session.settings_mut();
                settings.voice_enabled = !settings.voice_enabled;
                let state = if settings.voice_enabled { "on" } else { "off" };
                println!("{}", format!("Voice {}", state).yellow());
            }
            Command::Say(text) => chat_turn(&mut session, text, player_command.as_deref()).await?,
        }
    }

    Ok(())
}

async fn chat_turn(session: &mut Session, text: &str, player: Option<&str>) -> Result<()> {
    let mut turn = session.submit(text)?;

    print!("{} ", "Assistant:".bold().yellow());
    std::io::stdout().flush()?;

    while let Some(fragment) = turn.next_fragment().await {
        if session.apply_fragment(&turn, &fragment) {
            print!("{}", fragment);
            std::io::stdout().flush()?;
        }
    }
    println!();

    if session.will_synthesize(&turn) {
        println!("{}", "Synthesizing speech…".dimmed());
    }

    let audio = session.finish_turn(turn).await;
    if let Some(translation) = session.translation() {
        println!("{} {}", format!("Assistant ({}):", session.settings().language).bold().yellow(), translation);
    }

    if let Some(path) = audio {
        println!("{} {}", "♪".green(), path.display().to_string().green());
        if let Some(player) = player {
            if let Err(e) = play_audio(player, &path) {
                println!("{}: {}", "Could not start player".red(), e);
            }
        }
    }

    Ok(())
}
