use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use nodex_core::{ChatMessage, ChatRole, KeySource, KeyStatus, ProviderId};

use crate::app::{App, InputMode};

const MARKERS: [&str; 2] = ["**", "`"];

fn marker_style(marker: &str) -> Style {
    match marker {
        "`" => Style::default().fg(Color::Green),
        _ => Style::default().add_modifier(Modifier::BOLD),
    }
}

/// Style `**bold**` and `` `code` `` spans. Unclosed markers stay literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let next = MARKERS
            .iter()
            .filter_map(|marker| {
                let start = rest.find(marker)?;
                let inner = start + marker.len();
                let end = inner + rest[inner..].find(marker)?;
                (end > inner).then_some((start, inner, end, *marker))
            })
            .min_by_key(|(start, ..)| *start);

        match next {
            Some((start, inner, end, marker)) => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(rest[inner..end].to_string(), marker_style(marker)));
                rest = &rest[end + marker.len()..];
            }
            None => {
                spans.push(Span::raw(rest.to_string()));
                break;
            }
        }
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let key_indicator = match app.key_source(app.current_provider) {
        Some(_) => Span::styled(" connected ", Style::default().fg(Color::Green)),
        None => Span::styled(" no API key ", Style::default().fg(Color::Yellow)),
    };

    let title = Line::from(vec![
        Span::styled(" NodeXstation ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} / {} ", app.current_provider.display_name(), app.selected_model),
            Style::default().fg(Color::White),
        ),
        key_indicator,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn message_header(msg: &ChatMessage) -> Line<'static> {
    let time = msg.timestamp.with_timezone(&Local).format("%H:%M");
    match msg.role {
        ChatRole::User => Line::from(vec![
            Span::styled("You", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)),
        ]),
        ChatRole::Assistant => {
            let model = msg
                .model
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default();
            Line::from(vec![
                Span::styled("AI", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled(format!("{} {}", model, time), Style::default().fg(Color::DarkGray)),
            ])
        }
        ChatRole::System => Line::from(Span::styled(
            format!("System {}", time),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
        )),
    }
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.chat_area = Some(area);
    app.query_chat_height = area.height.saturating_sub(2);
    app.query_chat_width = area.width.saturating_sub(2);

    let border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chat ({} messages) ", app.conversation.len()));

    let chat_text = if app.conversation.is_empty() && !app.query_loading {
        let hint = match app.key_source(app.current_provider) {
            Some(_) => format!("Start a conversation with {}...", app.selected_model),
            None => format!(
                "Add your {} API key with K to start chatting.",
                app.current_provider.display_name()
            ),
        };
        Text::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in app.conversation.messages() {
            lines.push(message_header(msg));
            match msg.role {
                ChatRole::Assistant => {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                _ => {
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.query_loading {
            lines.push(Line::from(Span::styled(
                "AI",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.query_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let title = if app.query_loading {
        " Waiting for reply... "
    } else {
        " Message (Enter to send) "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else {
        (app.query_cursor + 1).saturating_sub(inner_width)
    };

    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    let popup_open = app.show_api_key_input || app.show_provider_picker || app.show_model_picker;
    if editing && !popup_open {
        let cursor_x = (app.query_cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = if app.show_api_key_input {
        &[(" Enter ", " save "), (" Ctrl+D ", " clear key "), (" Esc ", " cancel ")]
    } else if app.show_provider_picker {
        &[(" j/k ", " nav "), (" Enter ", " select "), (" K ", " edit key "), (" Esc ", " close ")]
    } else if app.show_model_picker {
        &[(" j/k ", " nav "), (" Enter ", " select "), (" Esc ", " close ")]
    } else {
        match app.input_mode {
            InputMode::Editing => &[(" Enter ", " send "), (" Esc ", " commands "), (" Ctrl+C ", " quit ")],
            InputMode::Normal => &[
                (" i ", " type "),
                (" j/k ", " scroll "),
                (" P ", " provider "),
                (" M ", " model "),
                (" K ", " API key "),
                (" y ", " copy reply "),
                (" C ", " clear "),
                (" q ", " quit "),
            ],
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }
    if let Some(status) = &app.status_message {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Centered popup rect clamped to the frame
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 44, app.available_models.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} models ", app.current_provider.display_name()));

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn key_status_label(source: Option<KeySource>) -> String {
    match source {
        Some(source) => format!("({})", source.label()),
        None => "(needs key)".to_string(),
    }
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = ProviderId::all();
    // Two lines per provider: name + description
    let popup_area = popup_rect(area, 56, providers.len() as u16 * 2 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Provider ");

    let items: Vec<ListItem> = providers
        .iter()
        .map(|provider| {
            let config = app.provider_config(*provider);
            let key_source = app.key_source(*provider);
            let is_current = *provider == app.current_provider;
            let prefix = if is_current { "* " } else { "  " };

            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if key_source.is_some() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(Text::from(vec![
                Line::from(format!(
                    "{}{} {}",
                    prefix,
                    config.display_name,
                    key_status_label(key_source)
                )),
                Line::from(Span::styled(
                    format!("    {}", config.description),
                    Style::default().fg(Color::DarkGray),
                )),
            ]))
            .style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

/// Mask all but the last four characters; one output char per input char
fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    key.chars()
        .enumerate()
        .map(|(i, c)| if i + 4 >= count && count > 4 { c } else { '*' })
        .collect()
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let Some(provider) = app.api_key_target_provider else {
        return;
    };
    let config = app.provider_config(provider);

    let popup_area = popup_rect(area, 64, 11);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} API Key ", config.display_name));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [notice_area, description_area, help_area, _, input_area, _, status_area, hint_area] =
        Layout::vertical([Constraint::Length(1); 8]).areas(inner);

    if let Some(notice) = &app.api_key_notice {
        frame.render_widget(
            Paragraph::new(notice.as_str()).style(Style::default().fg(Color::Yellow).bold()),
            notice_area,
        );
    }
    frame.render_widget(
        Paragraph::new(config.description).style(Style::default().fg(Color::White)),
        description_area,
    );
    frame.render_widget(
        Paragraph::new(format!("Get a key: {}", config.help_url))
            .style(Style::default().fg(Color::DarkGray)),
        help_area,
    );

    // Input field with horizontal scroll, masked
    let width = input_area.width as usize;
    let cursor = app.api_key_input_cursor;
    let scroll_offset = if width == 0 { 0 } else { (cursor + 1).saturating_sub(width) };
    let visible: String = mask_key(&app.api_key_input)
        .chars()
        .skip(scroll_offset)
        .take(width)
        .collect();
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    frame.set_cursor_position((input_area.x + (cursor - scroll_offset) as u16, input_area.y));

    // Status line: length, plus a warning when the key doesn't match the provider's pattern
    let char_count = app.api_key_input.chars().count();
    let mut status = vec![Span::styled(
        format!("{} characters", char_count),
        Style::default().fg(Color::DarkGray),
    )];
    if config.validate_key(&app.api_key_input) == KeyStatus::UnexpectedFormat {
        status.push(Span::styled(
            format!("  doesn't look like a {} key", config.display_name),
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(status)), status_area);

    let hint = match app.key_source(provider) {
        Some(KeySource::Env) => format!("Using {} from the environment", provider.env_var()),
        Some(KeySource::Stored) => "A key is saved. Ctrl+D removes it.".to_string(),
        None => "Keys are stored locally and only sent to this provider.".to_string(),
    };
    frame.render_widget(
        Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
        hint_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_texts(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_markdown_bold_and_code() {
        let line = parse_markdown_line("Use **cargo** or `rustc` here");
        assert_eq!(span_texts(&line), vec!["Use ", "cargo", " or ", "rustc", " here"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[3].style.fg, Some(Color::Green));
    }

    #[test]
    fn test_markdown_unclosed_marker_is_literal() {
        let line = parse_markdown_line("2 ** 3 is `pow");
        assert_eq!(span_texts(&line), vec!["2 ** 3 is `pow"]);
    }

    #[test]
    fn test_markdown_multibyte() {
        let line = parse_markdown_line("é **ü** ñ");
        assert_eq!(span_texts(&line), vec!["é ", "ü", " ñ"]);
    }

    #[test]
    fn test_mask_key_keeps_last_four() {
        assert_eq!(mask_key("sk-abcdef1234"), "*********1234");
        assert_eq!(mask_key("abcd"), "****");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn test_popup_rect_is_centered_and_clamped() {
        let area = Rect::new(0, 0, 100, 40);
        assert_eq!(popup_rect(area, 60, 10), Rect::new(20, 15, 60, 10));
        let small = Rect::new(0, 0, 30, 8);
        assert_eq!(popup_rect(small, 60, 10), Rect::new(2, 2, 26, 4));
    }
}
