use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app::{App, InputMode};
use crate::notification::Severity;

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

    if app.show_upload_input {
        render_upload_popup(app, frame, area);
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Blue,
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let training_indicator = if app.training {
        " [actualizando conocimientos…]".to_string()
    } else {
        String::new()
    };

    let file_indicator = match &app.pending_upload {
        Some(path) => {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            format!(" [historia: {}]", name)
        }
        None => String::new(),
    };

    let title = Line::from(vec![
        Span::styled(" FarmaChat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(training_indicator, Style::default().fg(Color::Yellow)),
        Span::styled(file_indicator, Style::default().fg(Color::Green)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" FarmaAsis ({}) ", app.client.base_url()));

    let chat_text = if app.messages.is_empty() && !app.sending_message {
        Text::from(Span::styled(
            "Escribe tu pregunta...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.messages {
            if msg.is_user {
                lines.push(Line::from(Span::styled(
                    "Tú:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
            } else {
                lines.push(Line::from(Span::styled(
                    "FarmaAsis:",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
            }
            for line in msg.text.lines() {
                lines.push(Line::from(line.to_string()));
            }
            lines.push(Line::default());
        }

        if app.sending_message {
            lines.push(Line::from(Span::styled(
                "FarmaAsis:",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Pensando{}", dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Pregunta (Enter envía) ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input_text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.show_upload_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // The toast takes over the footer line while it is visible.
    if let Some(notification) = app.notification.current() {
        let toast = Line::from(vec![
            Span::styled(
                format!(" {} ", notification.text),
                Style::default()
                    .fg(severity_color(notification.severity))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(" x ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::styled(" cerrar ", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(toast), area);
        return;
    }

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" enviar ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" comandos ", label_style),
        ],
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" i ", key_style),
                Span::styled(" escribir ", label_style),
            ];
            if app.features.training {
                hints.extend(vec![
                    Span::styled(" t ", key_style),
                    Span::styled(" entrenar ", label_style),
                ]);
            }
            if app.features.upload {
                hints.extend(vec![
                    Span::styled(" u ", key_style),
                    Span::styled(" historia ", label_style),
                    Span::styled(" U ", key_style),
                    Span::styled(" subir ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" desplazar ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" salir ", label_style),
            ]);
            hints
        }
    };

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_upload_popup(app: &App, frame: &mut Frame, area: Rect) {
    // Centered popup in front of everything else
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Seleccionar historia clínica ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions =
        Paragraph::new("Escribe la ruta del archivo. Enter confirma, Esc cancela.")
            .style(Style::default().fg(Color::DarkGray));
    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(instructions, instructions_area);

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);

    // Keep the cursor visible on long paths
    let inner_width = input_area.width as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.upload_cursor >= inner_width {
        app.upload_cursor - inner_width + 1
    } else {
        0
    };
    let visible_text: String = app
        .upload_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = (app.upload_cursor - scroll_offset).min(inner_width) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let accepted = Paragraph::new(format!(
        "Tipos aceptados: {}",
        crate::api::ACCEPTED_EXTENSIONS.join(", ")
    ))
    .style(Style::default().fg(Color::DarkGray));
    let accepted_area = Rect::new(inner.x, inner.y + 4, inner.width, 1);
    frame.render_widget(accepted, accepted_area);
}
