pub mod conversation;
mod help;
pub mod sidebar;
pub mod state;

use ratatui::{
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

use crate::app::{Mode, UiApp};
use crate::selection::Phase;

pub use conversation::render_transcript;

/// Screen regions of one frame; the event loop recomputes them to route
/// mouse events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiLayout {
    pub sidebar: Rect,
    pub transcript: Rect,
    pub compose: Option<Rect>,
    pub help: Rect,
}

/// Inside of a bordered block.
pub fn inner(r: Rect) -> Rect {
    if r.width < 2 || r.height < 2 {
        Rect::default()
    } else {
        Rect::new(r.x + 1, r.y + 1, r.width - 2, r.height - 2)
    }
}

pub fn compute_layout(area: Rect, mode: Mode, compose_lines: usize) -> UiLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(chunks[0]);

    let right = panels[1];
    let (transcript, compose) = if mode == Mode::Browse {
        (right, None)
    } else {
        let lines = compose_lines.min(u16::MAX as usize) as u16;
        let height = lines
            .saturating_add(3) // border + hint row
            .min(right.height / 3)
            .max(4);
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(height)])
            .split(right);
        (split[0], Some(split[1]))
    };

    UiLayout {
        sidebar: panels[0],
        transcript,
        compose,
        help: chunks[1],
    }
}

pub fn draw(frame: &mut Frame, app: &UiApp) {
    let layout = app.layout_for(frame.area());

    sidebar::draw_sidebar(frame, &app.controller, layout.sidebar);
    draw_transcript(frame, app, layout.transcript);
    if let Some(area) = layout.compose {
        draw_compose_input(frame, app, area);
    }
    help::draw_help_bar(frame, app, layout.help);
}

/// Truncate a string to at most `max` characters (Unicode-safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn transcript_title(app: &UiApp) -> String {
    let mut title = match app.controller.phase() {
        Phase::Selected(id) => format!(" {id} "),
        Phase::Drafting { workspace_path } => format!(" New session in {workspace_path} "),
        Phase::NoSelection => " Transcript ".to_string(),
    };
    if !app.view.is_near_bottom() {
        title.push_str("[scrolled] ");
    }
    title
}

fn draw_transcript(frame: &mut Frame, app: &UiApp, area: Rect) {
    let border_style = if app.mode == Mode::Browse {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
            .fg(Color::LightGreen)
            .add_modifier(Modifier::BOLD)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(if app.mode == Mode::Browse {
            BorderType::Plain
        } else {
            BorderType::Thick
        })
        .title(transcript_title(app))
        .border_style(border_style);

    let inner_height = area.height.saturating_sub(2);
    let scroll_y = app.view.scroll_y(inner_height);

    let paragraph = Paragraph::new(app.view.text.clone())
        .block(block)
        .scroll((scroll_y, 0));
    frame.render_widget(paragraph, area);
}

fn compose_labels(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Draft => (" New session prompt ", "Enter: start | Esc: discard"),
        Mode::Workspace => (" Workspace path ", "Enter: switch | Esc: cancel"),
        Mode::Compose | Mode::Browse => (" Reply ", "Enter: send | Esc: cancel"),
    }
}

fn draw_compose_input(frame: &mut Frame, app: &UiApp, area: Rect) {
    let (title, hint) = compose_labels(app.mode);
    let compose_style = Style::default()
        .fg(Color::LightGreen)
        .add_modifier(Modifier::BOLD);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .title(title)
        .border_style(compose_style);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Last row is the hint.
    let text_height = inner.height.saturating_sub(1);
    let text_area = Rect::new(inner.x, inner.y, inner.width, text_height);
    let hint_area = Rect::new(inner.x, inner.y + text_height, inner.width, 1);

    let row = app.compose.row.min(u16::MAX as usize) as u16;
    let first_row = row.saturating_sub(text_height.saturating_sub(1));
    let compose_lines: Vec<Line> = app
        .compose
        .lines
        .iter()
        .map(|l| Line::from(l.clone()))
        .collect();
    frame.render_widget(
        Paragraph::new(compose_lines).scroll((first_row, 0)),
        text_area,
    );

    let busy = app.controller.is_submitting() || app.controller.is_replying();
    let hint = if busy { "Sending..." } else { hint };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hint,
            Style::default().add_modifier(Modifier::DIM),
        ))),
        hint_area,
    );

    let col = app.compose.col.min(u16::MAX as usize) as u16;
    let cursor_x = inner.x.saturating_add(col);
    let cursor_y = inner.y + (row - first_row);
    if cursor_x < inner.x + inner.width && cursor_y < inner.y + text_height {
        frame.set_cursor_position(Position::new(cursor_x, cursor_y));
    }
}
