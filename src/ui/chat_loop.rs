//! The interactive chat loop: rendering, keyboard handling, stream pumping.
//!
//! This layer never mutates the transcript directly. User input and stream
//! events are both routed through the orchestrator from this single loop, so
//! no render ever observes a half-applied delta.

use std::error::Error;
use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind,
        KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::core::chat_stream::{ChatStreamService, StreamParams};
use crate::core::config::SessionSettings;
use crate::core::history::HistoryStore;
use crate::core::orchestrator::Orchestrator;
use crate::core::transcript::Transcript;

struct ChatUi {
    input: String,
    scroll_offset: u16,
    auto_scroll: bool,
    confirm_reset: bool,
}

impl ChatUi {
    fn new() -> Self {
        Self {
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            confirm_reset: false,
        }
    }
}

fn build_display_lines(transcript: &Transcript) -> Vec<Line<'_>> {
    let mut lines = Vec::new();

    for msg in transcript.messages() {
        if msg.is_user() {
            lines.push(Line::from(vec![
                Span::styled(
                    "You: ",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(&msg.content, Style::default().fg(Color::Cyan)),
            ]));
            lines.push(Line::from(""));
        } else if !msg.content.is_empty() {
            for content_line in msg.content.lines() {
                if content_line.trim().is_empty() {
                    lines.push(Line::from(""));
                } else {
                    lines.push(Line::from(Span::styled(
                        content_line,
                        Style::default().fg(Color::White),
                    )));
                }
            }
            lines.push(Line::from(""));
        }
    }

    lines
}

fn max_scroll_offset(total_lines: u16, available_height: u16) -> u16 {
    total_lines.saturating_sub(available_height)
}

/// Centers the confirmation modal over the transcript pane.
fn confirm_rect(area: Rect) -> Rect {
    let width = 44.min(area.width);
    let height = 3.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

fn draw(f: &mut Frame, orchestrator: &Orchestrator, ui: &ChatUi) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let lines = build_display_lines(orchestrator.transcript());
    let available_height = chunks[0].height.saturating_sub(1);
    let scroll_offset = ui
        .scroll_offset
        .min(max_scroll_offset(lines.len() as u16, available_height));

    let title = if orchestrator.is_awaiting_response() {
        "Chat - Causette (streaming...)"
    } else {
        "Chat - Causette"
    };

    let messages_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(messages_paragraph, chunks[0]);

    let input_style = if orchestrator.is_awaiting_response() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let input_title = if orchestrator.is_awaiting_response() {
        "Waiting for the reply to finish..."
    } else {
        "Type your message (Enter to send, Ctrl+X to clear, Ctrl+C to quit)"
    };

    let input = Paragraph::new(ui.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[1]);

    if ui.confirm_reset {
        let rect = confirm_rect(chunks[0]);
        let prompt = Paragraph::new("Clear all messages? (y/n)")
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Confirm"));
        f.render_widget(Clear, rect);
        f.render_widget(prompt, rect);
    } else if !orchestrator.is_awaiting_response() {
        f.set_cursor_position((chunks[1].x + ui.input.len() as u16 + 1, chunks[1].y + 1));
    }
}

/// Runs the full-screen chat session until the user quits.
pub async fn run_chat(settings: SessionSettings) -> Result<(), Box<dyn Error>> {
    let history = HistoryStore::new(settings.greeting.clone());
    let mut orchestrator = Orchestrator::new(history);
    let (service, mut rx) = ChatStreamService::new();
    let client = reqwest::Client::new();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut ui = ChatUi::new();

    let result = loop {
        terminal.draw(|f| draw(f, &orchestrator, &ui))?;

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        break Ok(());
                    }

                    if ui.confirm_reset {
                        match key.code {
                            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                                orchestrator.reset_transcript();
                                ui.scroll_offset = 0;
                                ui.auto_scroll = true;
                                ui.confirm_reset = false;
                            }
                            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                                ui.confirm_reset = false;
                            }
                            _ => {}
                        }
                        continue;
                    }

                    match key.code {
                        KeyCode::Char('x') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            ui.confirm_reset = true;
                        }
                        KeyCode::Enter => {
                            if let Some(exchange) = orchestrator.begin_send(&ui.input) {
                                ui.input.clear();
                                ui.auto_scroll = true;
                                service.spawn_stream(StreamParams {
                                    client: client.clone(),
                                    base_url: settings.base_url.clone(),
                                    api_key: settings.api_key.clone(),
                                    model: settings.model.clone(),
                                    api_messages: exchange.api_messages,
                                    cancel_token: exchange.cancel_token,
                                    stream_id: exchange.stream_id,
                                });
                            }
                        }
                        KeyCode::Char(c) => {
                            ui.input.push(c);
                        }
                        KeyCode::Backspace => {
                            ui.input.pop();
                        }
                        KeyCode::Up => {
                            ui.auto_scroll = false;
                            ui.scroll_offset = ui.scroll_offset.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            ui.scroll_offset = ui.scroll_offset.saturating_add(1);
                        }
                        _ => {}
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        ui.auto_scroll = false;
                        ui.scroll_offset = ui.scroll_offset.saturating_sub(3);
                    }
                    MouseEventKind::ScrollDown => {
                        ui.scroll_offset = ui.scroll_offset.saturating_add(3);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Drain all pending stream events before the next frame.
        let mut received_any = false;
        while let Ok((message, stream_id)) = rx.try_recv() {
            orchestrator.handle_stream_message(message, stream_id);
            received_any = true;
        }
        if received_any && ui.auto_scroll {
            let size = terminal.size().unwrap_or_default();
            let available_height = size.height.saturating_sub(3).saturating_sub(1);
            let total_lines = build_display_lines(orchestrator.transcript()).len() as u16;
            ui.scroll_offset = max_scroll_offset(total_lines, available_height);
        }
    };

    orchestrator.shutdown();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_and_assistant_lines_are_rendered_with_spacing() {
        let mut transcript = Transcript::seeded("Hello!");
        transcript.push_user("hi");

        let lines = build_display_lines(&transcript);
        // greeting + blank, then "You: hi" + blank
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn empty_open_assistant_message_is_not_rendered() {
        let mut transcript = Transcript::seeded("Hello!");
        transcript.push_user("hi");
        transcript.push_assistant("");

        let with_placeholder = build_display_lines(&transcript).len();
        let open_id = transcript.last().unwrap().id;
        transcript.apply_delta(open_id, "partial");
        let with_content = build_display_lines(&transcript).len();

        assert_eq!(with_placeholder, 4);
        assert_eq!(with_content, 6);
    }

    #[test]
    fn scroll_offset_is_clamped_to_content() {
        assert_eq!(max_scroll_offset(10, 4), 6);
        assert_eq!(max_scroll_offset(3, 4), 0);
    }

    #[test]
    fn confirm_rect_fits_inside_the_pane() {
        let area = Rect {
            x: 0,
            y: 0,
            width: 80,
            height: 20,
        };
        let rect = confirm_rect(area);
        assert!(rect.x + rect.width <= area.width);
        assert!(rect.y + rect.height <= area.height);
    }
}
