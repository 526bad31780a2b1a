use chrono::Local;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, Focus};
use crt_chat_core::{Message, Phase, Role};

// Phosphor palette
const PHOSPHOR: Color = Color::Rgb(51, 255, 51);
const PHOSPHOR_DIM: Color = Color::Rgb(26, 140, 26);
const AMBER: Color = Color::Rgb(255, 176, 0);
const ALERT: Color = Color::Rgb(255, 85, 85);
const SCREEN: Color = Color::Black;

/// Input grows up to this many text rows
const MAX_INPUT_ROWS: u16 = 5;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(SCREEN)), area);

    if !app.booted {
        render_boot_screen(app, frame, area);
        return;
    }

    let input_rows = (app.input_line_count() as u16).clamp(1, MAX_INPUT_ROWS);

    // Main layout: header, transcript, status line, input, help line
    let [header_area, chat_area, status_area, input_area, help_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(input_rows + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_status_line(app, frame, status_area);
    render_input(app, frame, input_area);
    render_help(app, frame, help_area);
}

fn render_boot_screen(app: &App, frame: &mut Frame, area: Rect) {
    let cursor = if app.animation_frame % 2 == 0 { "█" } else { " " };
    let text_style = Style::default().fg(PHOSPHOR).add_modifier(Modifier::BOLD);

    let lines = vec![
        Line::from(Span::styled("▣", text_style)),
        Line::default(),
        Line::from(Span::styled("INITIALIZING AI SYSTEM...", text_style)),
        Line::from(Span::styled("LOADING NEURAL NETWORKS...", text_style)),
        Line::from(Span::styled("CALIBRATING RESPONSE MATRIX...", text_style)),
        Line::from(Span::styled(cursor, text_style)),
    ];

    let height = lines.len() as u16;
    let [_, middle, _] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(height),
        Constraint::Min(0),
    ])
    .areas(area);

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), middle);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let panel = Style::default().fg(AMBER);
    let led = if app.animation_frame % 2 == 0 { "●" } else { "○" };

    let title = Line::from(vec![
        Span::styled(" ▣ 70s AI ", Style::default().fg(PHOSPHOR).bold()),
        Span::styled(
            format!(" ARTIFICIAL INTELLIGENCE TERMINAL v{} ", env!("CARGO_PKG_VERSION")),
            panel,
        ),
    ]);

    let panels = Line::from(vec![
        Span::styled(" [CPU: ONLINE] ", panel),
        Span::styled(" [MEM: 64KB] ", panel),
        Span::styled(format!(" [MODEL: {}] ", app.model.to_uppercase()), panel),
        Span::styled(format!(" PWR {} ", led), Style::default().fg(ALERT)),
    ])
    .alignment(Alignment::Right);

    let clock = Local::now().format("%m/%d/%Y, %I:%M:%S %p").to_string();
    let status = Line::from(vec![
        Span::styled(" SYSTEM STATUS: OPERATIONAL", Style::default().fg(PHOSPHOR)),
    ]);
    let clock = Line::from(Span::styled(format!("{} ", clock.to_uppercase()), panel))
        .alignment(Alignment::Right);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(PHOSPHOR));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [top, bottom, _] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    // Right-hand panels get their full width, the title takes what is left
    let [title_area, panels_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(panels.width() as u16),
    ])
    .areas(top);
    let [status_area, clock_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(clock.width() as u16),
    ])
    .areas(bottom);

    frame.render_widget(Paragraph::new(title), title_area);
    frame.render_widget(Paragraph::new(panels), panels_area);
    frame.render_widget(Paragraph::new(status), status_area);
    frame.render_widget(Paragraph::new(clock), clock_area);
}

fn message_lines(app: &App, index: usize, message: &Message) -> Vec<Line<'static>> {
    let (label, color) = match message.role {
        Role::User => ("USER ▸", AMBER),
        Role::Assistant => ("AI ▸", PHOSPHOR),
    };
    let selected = app.selected_reply == Some(index) && app.focus == Focus::Transcript;

    let mut label_spans = vec![Span::styled(
        label.to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if app.is_copied(&message.id) {
        label_spans.push(Span::styled(" [COPIED]", Style::default().fg(PHOSPHOR)));
    } else if selected {
        label_spans.push(Span::styled(" [C] COPY", Style::default().fg(PHOSPHOR_DIM)));
    }

    let content_style = if selected {
        Style::default().fg(color).bg(Color::Rgb(0, 48, 0))
    } else {
        Style::default().fg(color)
    };

    let mut lines = vec![Line::from(label_spans)];
    for line in message.content.split('\n') {
        lines.push(Line::from(Span::styled(format!("  {}", line), content_style)));
    }

    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    lines.push(Line::from(Span::styled(
        format!("  ● {}", time),
        Style::default().fg(PHOSPHOR_DIM),
    )));
    lines.push(Line::default());
    lines
}

fn processing_lines(app: &App) -> Vec<Line<'static>> {
    let dots = "▪".repeat((app.animation_frame as usize % 3) + 1);
    vec![
        Line::from(Span::styled(
            "AI ▸",
            Style::default().fg(PHOSPHOR).add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("  PROCESSING ", Style::default().fg(AMBER)),
            Span::styled(format!("{:<3} ", dots), Style::default().fg(PHOSPHOR)),
            Span::styled("█", Style::default().fg(PHOSPHOR).add_modifier(Modifier::SLOW_BLINK)),
        ]),
        Line::from(Span::styled(
            "  NEURAL NETWORK ACTIVE...",
            Style::default().fg(PHOSPHOR_DIM),
        )),
        Line::default(),
    ]
}

fn error_lines(message: &str) -> Vec<Line<'static>> {
    let alert = Style::default().fg(ALERT);
    let mut lines = vec![
        Line::from(Span::styled("ERR ▲", alert.add_modifier(Modifier::BOLD))),
        Line::from(Span::styled("  ⚡ SYSTEM ERROR", alert.add_modifier(Modifier::BOLD))),
    ];
    for line in message.to_uppercase().split('\n') {
        lines.push(Line::from(Span::styled(format!("  {}", line), alert)));
    }
    lines.push(Line::from(vec![
        Span::styled("  [CTRL+R] ", Style::default().fg(SCREEN).bg(ALERT)),
        Span::styled(" RETRY", alert),
    ]));
    lines.push(Line::default());
    lines
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    let focused = app.focus == Focus::Transcript;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { PHOSPHOR } else { PHOSPHOR_DIM }))
        .title(Span::styled(" TRANSCRIPT ", Style::default().fg(PHOSPHOR)));
    let inner = block.inner(area);

    let conversation = &app.conversation;
    if conversation.messages().is_empty() && conversation.phase() == Phase::Idle {
        app.set_transcript_size(0, inner.height);
        let lines = vec![
            Line::from(Span::styled("⚡", Style::default().fg(PHOSPHOR))),
            Line::default(),
            Line::from(Span::styled("AWAITING INPUT", Style::default().fg(PHOSPHOR).bold())),
            Line::from(Span::styled("ENTER QUERY TO BEGIN SESSION", Style::default().fg(AMBER))),
        ];
        let [_, middle, _] = Layout::vertical([
            Constraint::Min(0),
            Constraint::Length(lines.len() as u16),
            Constraint::Min(0),
        ])
        .areas(inner);
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), middle);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for (i, message) in conversation.messages().iter().enumerate() {
        lines.extend(message_lines(app, i, message));
    }
    if conversation.is_loading() {
        lines.extend(processing_lines(app));
    }
    if let Some(error) = conversation.error() {
        lines.extend(error_lines(error));
    }

    let chat = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });

    // Height as the paragraph itself wraps it, so the last row stays reachable
    let total = chat.line_count(inner.width);
    app.set_transcript_size(total.min(u16::MAX as usize) as u16, inner.height);

    let chat = chat.block(block).scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_status_line(app: &App, frame: &mut Frame, area: Rect) {
    let (mode, state, state_color) = match app.conversation.phase() {
        Phase::Idle => ("ACTIVE", "READY", PHOSPHOR),
        Phase::AwaitingResponse => ("INERT", "PROC", AMBER),
        Phase::Errored => ("INERT", "HALT", ALERT),
    };

    let left = Line::from(vec![
        Span::styled(format!(" INPUT MODE: {} ", mode), Style::default().fg(PHOSPHOR).bold()),
        Span::styled(" ● ", Style::default().fg(state_color)),
        Span::styled(state, Style::default().fg(PHOSPHOR_DIM)),
    ]);
    let right = Line::from(Span::styled("⚡ PWR: ON ", Style::default().fg(AMBER)))
        .alignment(Alignment::Right);

    frame.render_widget(Paragraph::new(left), area);
    frame.render_widget(Paragraph::new(right), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let active = app.focus == Focus::Input && app.conversation.accepts_input();
    let border_color = if active { PHOSPHOR } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(" > ", Style::default().fg(PHOSPHOR).bold()));

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let (row, col) = app.cursor_position();

    // Scroll offsets to keep the cursor visible
    let row_offset = if inner_height == 0 { 0 } else { row.saturating_sub(inner_height - 1) };
    let col_offset = if inner_width == 0 || col < inner_width { 0 } else { col - inner_width + 1 };

    let input = if app.input.is_empty() {
        Paragraph::new(Span::styled(
            "ENTER COMMAND...",
            Style::default().fg(PHOSPHOR_DIM),
        ))
    } else {
        Paragraph::new(app.input.as_str())
            .style(Style::default().fg(PHOSPHOR))
            .scroll((row_offset as u16, col_offset as u16))
    };

    frame.render_widget(input.block(input_block), area);

    // Show cursor when the input is live
    if active {
        frame.set_cursor_position((
            area.x + 1 + (col - col_offset) as u16,
            area.y + 1 + (row - row_offset) as u16,
        ));
    }
}

fn render_help(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(PHOSPHOR).bg(Color::Rgb(0, 40, 0));
    let label_style = Style::default().fg(PHOSPHOR_DIM);

    let hints: Vec<(&str, &str)> = match app.focus {
        Focus::Input => vec![
            ("ENTER", "TO EXECUTE"),
            ("SHIFT+ENTER", "FOR NEW LINE"),
            ("TAB", "TRANSCRIPT"),
            ("CTRL+R", "RETRY"),
            ("CTRL+Y", "COPY REPLY"),
            ("CTRL+C", "QUIT"),
        ],
        Focus::Transcript => vec![
            ("J/K", "SELECT"),
            ("C", "COPY"),
            ("↑/↓", "SCROLL"),
            ("R", "RETRY"),
            ("TAB", "INPUT"),
            ("Q", "QUIT"),
        ],
    };

    let mut spans = vec![Span::styled("PRESS ", label_style)];
    for (i, (key, label)) in hints.into_iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" • ", label_style));
        }
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {}", label), label_style));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        area,
    );
}
