use std::io::{self, Stderr};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::App;
use crate::handler;
use crate::pipeline::Turn;
use crate::ui;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

/// Drives the streaming-indicator animation.
const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize,
    Tick,
}

/// Terminal input and animation ticks, merged onto one channel.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let tx_events = tx.clone();
        tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            while let Some(evt) = reader.next().await {
                let app_event = match evt {
                    // Release/repeat events would double-type on some terminals
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => AppEvent::Key(key),
                    Ok(Event::Mouse(mouse)) => AppEvent::Mouse(mouse),
                    Ok(Event::Resize(_, _)) => AppEvent::Resize,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "terminal event error");
                        continue;
                    }
                };

                if tx_events.send(app_event).is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_rate);
            loop {
                interval.tick().await;
                if tx.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(io::stderr());
    let terminal = Terminal::new(backend)?;

    Ok(terminal)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), DisableMouseCapture, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Install panic hook to restore terminal on panic
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}

/// Runs the chat UI until the user quits, restoring the terminal either way.
pub async fn run(app: &mut App) -> Result<()> {
    install_panic_hook();
    let mut terminal = init()?;
    let mut events = EventHandler::new(TICK_RATE);

    let result = event_loop(&mut terminal, app, &mut events).await;
    restore()?;
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    info!("chat ui started");

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;
        if app.should_quit {
            break;
        }

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event)?,
                None => break,
            },
            fragment = next_fragment(&mut app.active_turn), if app.active_turn.is_some() => {
                match fragment {
                    Some(fragment) => app.apply_fragment(&fragment),
                    None => {
                        // Paint the "synthesizing" status before blocking on speech.
                        if app.prepare_finish() {
                            terminal.draw(|frame| ui::render(app, frame))?;
                        }
                        app.finish_turn().await;
                    }
                }
            }
        }
    }

    info!("chat ui stopped");
    Ok(())
}

async fn next_fragment(turn: &mut Option<Turn>) -> Option<String> {
    match turn {
        Some(turn) => turn.next_fragment().await,
        None => std::future::pending().await,
    }
}
