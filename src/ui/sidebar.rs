use std::time::Duration;

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

use crate::controller::TranscriptController;
use crate::session::{format_duration, SessionId};
use crate::ui::truncate_chars;

/// Every sidebar row is a header line plus a title line.
pub const ROW_HEIGHT: u16 = 2;

/// One visible row of the session list.
#[derive(Debug, Clone, PartialEq)]
pub enum SidebarRow {
    /// The session being drafted; it has no id yet.
    Draft,
    Session {
        id: SessionId,
        title: Option<String>,
        age: Option<Duration>,
        /// Created here and not yet confirmed by a poll.
        pending: bool,
    },
}

/// Rows in display order, plus the index of the highlighted row.
///
/// A pending session the store has not listed yet is shown at the top so the
/// selection never points at an invisible row.
pub fn sidebar_rows(
    controller: &TranscriptController,
    now: chrono::DateTime<chrono::Utc>,
) -> (Vec<SidebarRow>, Option<usize>) {
    let selection = controller.selection();
    let sessions = controller.sessions();
    let pending = selection.pending();
    let mut rows = Vec::with_capacity(sessions.len() + 2);

    if selection.is_drafting() {
        rows.push(SidebarRow::Draft);
    }
    if let Some(id) = pending.filter(|id| !sessions.iter().any(|s| &s.id == *id)) {
        rows.push(SidebarRow::Session {
            id: id.clone(),
            title: None,
            age: None,
            pending: true,
        });
    }
    for session in sessions {
        rows.push(SidebarRow::Session {
            id: session.id.clone(),
            title: session.title(),
            age: session.age(now),
            pending: pending == Some(&session.id),
        });
    }

    let highlighted = if selection.is_drafting() {
        Some(0)
    } else {
        selection.selected().and_then(|selected| {
            rows.iter().position(
                |row| matches!(row, SidebarRow::Session { id, .. } if id == selected),
            )
        })
    };
    (rows, highlighted)
}

fn row_item(row: &SidebarRow, highlighted: bool, width: usize) -> ListItem<'static> {
    let marker = if highlighted { ">> " } else { "   " };
    let name_style = if highlighted {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let dim = Style::default().add_modifier(Modifier::DIM);

    let (header, detail) = match row {
        SidebarRow::Draft => (
            vec![
                Span::styled(marker, name_style),
                Span::styled("+ new session", name_style.fg(Color::LightGreen)),
            ],
            "     (draft)".to_string(),
        ),
        SidebarRow::Session {
            id,
            title,
            age,
            pending,
        } => {
            let mut spans = vec![Span::styled(marker, name_style)];
            if *pending {
                spans.push(Span::styled("* ", Style::default().fg(Color::Magenta)));
            }
            spans.push(Span::styled(
                truncate_chars(id.as_str(), width.saturating_sub(5)),
                name_style,
            ));
            if let Some(age) = age {
                spans.push(Span::styled(format!(" {}", format_duration(*age)), dim));
            }
            let detail = match title {
                Some(title) => {
                    let max_chars = width.saturating_sub(5);
                    if title.chars().count() > max_chars {
                        let cut = truncate_chars(title, max_chars.saturating_sub(3));
                        format!("     {cut}...")
                    } else {
                        format!("     {title}")
                    }
                }
                None if *pending => "     (starting...)".to_string(),
                None => "     (no messages)".to_string(),
            };
            (spans, detail)
        }
    };

    ListItem::new(vec![Line::from(header), Line::from(Span::styled(detail, dim))])
}

pub fn draw_sidebar(frame: &mut Frame, controller: &TranscriptController, area: Rect) {
    let inner_width = area.width.saturating_sub(2) as usize;
    let (rows, highlighted) = sidebar_rows(controller, chrono::Utc::now());

    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| row_item(row, highlighted == Some(i), inner_width))
        .collect();

    let title = format!(" Sessions ({}) ", controller.sessions().len());
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default()) // highlight drawn via ">>"
        .highlight_symbol("");

    let mut list_state = ListState::default();
    list_state.select(highlighted);
    frame.render_stateful_widget(list, area, &mut list_state);
}
