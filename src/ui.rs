use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::app::App;
use crate::pipeline::TurnState;
use crate::transcript::ChatRole;

/// Styles `**bold**` runs. An unmatched `**` is kept as literal text.
fn styled_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // An even number of parts means the last delimiter never closed.
    let unclosed = parts.len() % 2 == 0;

    let mut spans: Vec<Span<'static>> = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let is_last = i + 1 == parts.len();
        if i % 2 == 1 && !(unclosed && is_last) && !part.is_empty() {
            spans.push(Span::styled(part.to_string(), Style::default().add_modifier(Modifier::BOLD)));
        } else if i % 2 == 1 {
            spans.push(Span::raw(format!("**{}", part)));
        } else if !part.is_empty() {
            spans.push(Span::raw(part.to_string()));
        }
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, input_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_status(app, frame, status_area);
    render_footer(frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let settings = app.session.settings();
    let voice = if settings.voice_enabled { "voice on" } else { "voice off" };

    let title = Line::from(vec![
        Span::styled(" የአማርኛ ውይይት ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} | max {} tokens ", voice, settings.max_tokens),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", app.session.model_label()));

    let messages = app.session.transcript().messages();
    let text = if messages.is_empty() {
        Text::from(Span::styled(
            "ጥያቄዎን ይጻፉ... (Tab for an example)",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let last = messages.len() - 1;

        for (i, msg) in messages.iter().enumerate() {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.clone()));
                }
                ChatRole::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "Assistant:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    if msg.content.is_empty() {
                        let streaming = i == last && app.is_streaming();
                        lines.push(placeholder_line(streaming, app.animation_frame));
                    }
                    lines.extend(msg.content.lines().map(styled_line));
                    if i == last {
                        if let Some(translation) = app.session.translation() {
                            lines.extend(translation_lines(translation, &app.session.settings().language));
                        }
                    }
                }
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn translation_lines(translation: &str, language: &str) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!("({})", language),
        Style::default().fg(Color::DarkGray),
    ))];
    lines.extend(translation.lines().map(|line| {
        Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC),
        ))
    }));
    lines
}

fn placeholder_line(streaming: bool, frame: u8) -> Line<'static> {
    let label = if streaming {
        // Cycles ".", "..", "..."
        format!("Thinking{}", ".".repeat(frame as usize + 1))
    } else {
        "(no reply)".to_string()
    };
    Line::from(Span::styled(
        label,
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let busy = app.session.is_busy();
    let border_color = if busy { Color::DarkGray } else { Color::Yellow };
    let title = if busy { " Waiting for reply " } else { " Message (Enter to send) " };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor = app.input_cursor;
    let offset = if inner_width > 0 && cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible: String = app.input.chars().skip(offset).take(inner_width).collect();
    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    frame.set_cursor_position((area.x + (cursor - offset) as u16 + 1, area.y + 1));
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = Vec::new();

    if let Some(path) = app.session.audio() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        spans.push(Span::styled(" ♪ ", Style::default().fg(Color::Black).bg(Color::Green)));
        spans.push(Span::styled(format!(" {} ", name), Style::default().fg(Color::Green)));
    }

    if app.session.state() == TurnState::Finalizing || app.status.is_some() {
        let text = app.status.clone().unwrap_or_else(|| "Finishing…".to_string());
        spans.push(Span::styled(format!(" {}", text), Style::default().fg(Color::Gray)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = [
        ("Enter", "send"),
        ("Tab", "example"),
        ("^L", "clear"),
        ("^V", "voice"),
        ("^P", "play"),
        ("^↑/^↓", "tokens"),
        ("PgUp/PgDn", "scroll"),
        ("Esc", "quit"),
    ];

    let spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(format!(" {} ", key), key_style),
                Span::styled(format!(" {} ", label), label_style),
            ]
        })
        .collect();

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}
