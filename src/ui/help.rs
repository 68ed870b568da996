use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::{Mode, UiApp};

pub fn help_text(mode: Mode) -> &'static str {
    match mode {
        Mode::Browse => {
            "j/k: nav  PgUp/Dn: scroll  End: follow  Enter: reply  n: new  w: workspace  q: quit"
        }
        Mode::Compose => "Enter: send  Alt+Enter: newline  PgUp/Dn: scroll  Esc: cancel",
        Mode::Draft => "Enter: start session  Alt+Enter: newline  Esc: discard draft",
        Mode::Workspace => "Enter: switch workspace  Esc: cancel",
    }
}

pub fn draw_help_bar(frame: &mut Frame, app: &UiApp, area: Rect) {
    let help = help_text(app.mode);

    // Errors win over status so a failed send is never hidden.
    let line = if let Some(err) = app.controller.last_error() {
        Line::from(vec![
            Span::styled(
                format!(" {err} "),
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" {help}"),
                Style::default().fg(Color::Black).bg(Color::Cyan),
            ),
        ])
    } else {
        let text = format!(" {} | {help}", app.status_line());
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
    };

    frame.render_widget(Paragraph::new(line), area);
}
