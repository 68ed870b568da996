use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};
use tokio::sync::{broadcast, mpsc};

use crate::backend::{BackendCommand, BackendEvent};
use crate::controller::TranscriptController;
use crate::persist::SelectionEvent;
use crate::session::SessionId;
use crate::transcript::{empty_transcript, Transcript};
use crate::ui::sidebar::{sidebar_rows, SidebarRow, ROW_HEIGHT};
use crate::ui::state::{ComposeState, TranscriptView};
use crate::ui::{compute_layout, inner, render_transcript, UiLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    /// Writing a reply to the displayed session.
    Compose,
    /// Writing the first prompt of a new session.
    Draft,
    /// Editing the workspace path.
    Workspace,
}

/// UI-side state of the console. All network I/O happens in the backend
/// actor; this type only reacts to events and queues commands.
pub struct UiApp {
    pub controller: TranscriptController,
    pub mode: Mode,
    pub compose: ComposeState,
    pub view: TranscriptView,
    pub should_quit: bool,
    pub needs_redraw: bool,
    pub status_message: Option<String>,
    pub poll_error: Option<String>,

    /// Transcript the view was last rendered from.
    rendered: Transcript,
    /// Last scroll signal the view acted on.
    seen_signal: u64,

    cmd_tx: mpsc::Sender<BackendCommand>,
    event_rx: mpsc::Receiver<BackendEvent>,
    sync_rx: broadcast::Receiver<SelectionEvent>,
}

impl UiApp {
    pub fn new(
        controller: TranscriptController,
        cmd_tx: mpsc::Sender<BackendCommand>,
        event_rx: mpsc::Receiver<BackendEvent>,
    ) -> Self {
        let sync_rx = controller.subscribe();
        let mut app = Self {
            controller,
            mode: Mode::Browse,
            compose: ComposeState::new(),
            view: TranscriptView::new(),
            should_quit: false,
            needs_redraw: true,
            status_message: None,
            poll_error: None,
            rendered: empty_transcript(),
            seen_signal: 0,
            cmd_tx,
            event_rx,
            sync_rx,
        };
        app.rerender();
        app
    }

    /// Test constructor with an in-memory selection store.
    #[cfg(test)]
    pub fn new_test(workspace: Option<&str>) -> (Self, mpsc::Receiver<BackendCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (_event_tx, event_rx) = mpsc::channel(8);
        let controller = TranscriptController::new(
            workspace.map(String::from),
            crate::persist::SelectionSync::in_memory(),
        );
        (Self::new(controller, cmd_tx, event_rx), cmd_rx)
    }

    pub fn layout_for(&self, area: Rect) -> UiLayout {
        compute_layout(area, self.mode, self.compose.lines.len())
    }

    /// One-line status for the help bar.
    pub fn status_line(&self) -> String {
        if let Some(msg) = &self.status_message {
            return msg.clone();
        }
        if let Some(err) = &self.poll_error {
            return format!("poll failed: {err}");
        }
        if self.controller.is_submitting() {
            return "starting session...".to_string();
        }
        if self.controller.is_replying() {
            return "sending...".to_string();
        }
        format!("workspace {}", self.controller.workspace_key())
    }

    /// Drain backend results and selection changes from sibling handles.
    /// Call once per tick.
    pub fn poll_state(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply_backend_event(event);
        }

        loop {
            match self.sync_rx.try_recv() {
                Ok(event) => {
                    if self.controller.on_sync_event(&event) {
                        self.needs_redraw = true;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "selection bus lagged");
                }
                Err(_) => break,
            }
        }

        self.rerender();
    }

    pub fn apply_backend_event(&mut self, event: BackendEvent) {
        if event.workspace_key() != self.controller.workspace_key() {
            tracing::debug!(stale = event.workspace_key(), "dropping event for previous workspace");
            return;
        }
        self.needs_redraw = true;

        match event {
            BackendEvent::PollResult {
                workspace_key,
                sessions,
            } => {
                self.poll_error = None;
                self.apply_poll(&workspace_key, sessions);
            }
            BackendEvent::PollFailed { error, .. } => {
                self.poll_error = Some(error.to_string());
            }
            BackendEvent::SessionStarted { session, .. } => {
                if self.controller.finish_submit(Ok(session)).is_ok() {
                    self.compose.reset();
                }
            }
            BackendEvent::StartFailed { error, .. } => {
                // Still drafting; the prompt stays in the box for a retry.
                if let Err(err) = self.controller.finish_submit(Err(error)) {
                    tracing::warn!(error = %err, "session start failed");
                }
            }
            BackendEvent::MessagePosted { session, .. } => {
                if self.controller.finish_reply(Ok(session)).is_ok() && self.mode == Mode::Compose
                {
                    self.compose.reset();
                    self.mode = Mode::Browse;
                }
            }
            BackendEvent::PostFailed { error, .. } => {
                if let Err(err) = self.controller.finish_reply(Err(error)) {
                    tracing::warn!(error = %err, "reply failed");
                }
            }
        }
        self.rerender();
    }

    pub fn apply_poll(&mut self, workspace_key: &str, sessions: Vec<crate::session::Session>) {
        if self.controller.on_poll_result(workspace_key, sessions) {
            self.rerender();
        }
    }

    /// Bring the view in line with the controller: re-render the transcript
    /// only when it is a different value, and snap to the bottom when the
    /// scroll controller asked for it.
    fn rerender(&mut self) {
        if !Arc::ptr_eq(&self.rendered, self.controller.transcript()) {
            self.rendered = Arc::clone(self.controller.transcript());
            let following = self.controller.scroll().auto_scroll_enabled();
            self.view.set_text(render_transcript(&self.rendered), following);
            self.needs_redraw = true;
        }

        let signal = self.controller.scroll().scroll_signal();
        if signal != self.seen_signal {
            self.seen_signal = signal;
            self.view.snap_to_bottom();
            self.needs_redraw = true;
        }

        if self.mode == Mode::Draft && !self.controller.selection().is_drafting() {
            self.mode = Mode::Browse;
            self.compose.reset();
        }
    }

    fn queue_command(&mut self, command: BackendCommand) {
        match self.cmd_tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                let tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(command).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.status_message = Some("Backend disconnected".to_string());
                self.should_quit = true;
            }
        }
    }

    // ── keys ─────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.needs_redraw = true;
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            match self.mode {
                Mode::Browse => self.quit(),
                _ => self.leave_input(),
            }
            return;
        }
        match self.mode {
            Mode::Browse => self.handle_browse_key(key),
            Mode::Compose | Mode::Draft | Mode::Workspace => self.handle_input_key(key),
        }
        self.rerender();
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char('j') | KeyCode::Down => self.select_step(1),
            KeyCode::Char('k') | KeyCode::Up => self.select_step(-1),
            KeyCode::Enter => self.enter_compose(),
            KeyCode::Char('n') => self.start_draft(),
            KeyCode::Char('w') => self.enter_workspace(),
            KeyCode::Esc => {
                self.controller.clear_error();
                self.status_message = None;
            }
            KeyCode::PageUp | KeyCode::PageDown | KeyCode::End | KeyCode::Char('G') => {
                self.scroll_key(key.code)
            }
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let newline = key
            .modifiers
            .intersects(KeyModifiers::ALT | KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Esc => self.leave_input(),
            KeyCode::Enter if newline && self.mode != Mode::Workspace => {
                self.compose.insert_newline()
            }
            KeyCode::Enter => self.submit_input(),
            KeyCode::Backspace => self.compose.backspace(),
            KeyCode::Delete => self.compose.delete_forward(),
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Up => self.compose.move_up(),
            KeyCode::Down => self.compose.move_down(),
            KeyCode::Home => self.compose.move_home(),
            KeyCode::End => self.compose.move_end(),
            KeyCode::PageUp | KeyCode::PageDown => self.scroll_key(key.code),
            KeyCode::Char(ch) => self.compose.insert_char(ch),
            _ => {}
        }
    }

    pub fn handle_paste(&mut self, text: String) {
        if self.mode != Mode::Browse {
            self.compose.insert_text(&text);
            self.needs_redraw = true;
        }
    }

    fn quit(&mut self) {
        self.queue_command(BackendCommand::Quit);
        self.should_quit = true;
    }

    fn scroll_key(&mut self, code: KeyCode) {
        let page = self.page_height();
        match code {
            KeyCode::PageUp => self.view.scroll_up(page),
            KeyCode::PageDown => self.view.scroll_down(page),
            _ => self.view.snap_to_bottom(),
        }
        self.after_user_scroll();
    }

    fn page_height(&self) -> u16 {
        // Half the transcript pane.
        crossterm::terminal::size()
            .map(|(_, rows)| rows.saturating_sub(4) / 2)
            .unwrap_or(10)
            .max(1)
    }

    fn after_user_scroll(&mut self) {
        self.controller
            .handle_auto_scroll_change(self.view.is_near_bottom());
    }

    // ── selection ────────────────────────────────────────────────────

    fn select_step(&mut self, step: isize) {
        let (rows, highlighted) = sidebar_rows(&self.controller, chrono::Utc::now());
        let ids: Vec<&SessionId> = rows
            .iter()
            .filter_map(|row| match row {
                SidebarRow::Session { id, .. } => Some(id),
                SidebarRow::Draft => None,
            })
            .collect();
        if ids.is_empty() {
            return;
        }
        let current = highlighted
            .and_then(|i| match &rows[i] {
                SidebarRow::Session { id, .. } => ids.iter().position(|candidate| *candidate == id),
                SidebarRow::Draft => None,
            })
            .unwrap_or(0) as isize;
        let len = ids.len() as isize;
        let next = (current + step).rem_euclid(len) as usize;
        let id = ids[next].clone();
        self.select(id);
    }

    fn select(&mut self, id: SessionId) {
        if self.controller.selection().displayed() == Some(&id) {
            return;
        }
        self.controller.on_user_select(id);
        self.rerender();
    }

    fn enter_compose(&mut self) {
        if self.controller.selection().displayed().is_some() {
            self.compose.reset();
            self.mode = Mode::Compose;
        } else {
            self.status_message = Some("No session selected".to_string());
        }
    }

    pub fn start_draft(&mut self) {
        if self.controller.start_draft().is_ok() {
            self.compose.reset();
            self.mode = Mode::Draft;
        }
        self.rerender();
    }

    fn enter_workspace(&mut self) {
        self.compose.reset();
        if let Some(path) = self.controller.workspace_path() {
            self.compose.insert_text(path);
        }
        self.mode = Mode::Workspace;
    }

    fn leave_input(&mut self) {
        if self.mode == Mode::Draft {
            self.controller.cancel_draft();
        }
        self.compose.reset();
        self.mode = Mode::Browse;
        self.rerender();
    }

    fn submit_input(&mut self) {
        if self.controller.is_submitting() || self.controller.is_replying() {
            return;
        }
        let text = self.compose.text();
        match self.mode {
            Mode::Compose => {
                if let Ok(request) = self.controller.begin_reply(&text) {
                    self.queue_command(BackendCommand::PostMessage {
                        workspace_key: request.workspace_key,
                        workspace_path: request.workspace_path,
                        session_id: request.session_id,
                        text: request.text,
                    });
                }
            }
            Mode::Draft => {
                if let Ok(request) = self.controller.begin_submit(&text) {
                    let workspace_key = self.controller.workspace_key().to_string();
                    self.queue_command(BackendCommand::StartSession {
                        workspace_key,
                        request,
                    });
                }
            }
            Mode::Workspace => {
                let path = Some(text.trim().to_string()).filter(|p| !p.is_empty());
                self.switch_workspace(path);
            }
            Mode::Browse => {}
        }
    }

    pub fn switch_workspace(&mut self, path: Option<String>) {
        self.controller.switch_workspace(path.clone());
        self.queue_command(BackendCommand::SetWorkspace(path));
        self.poll_error = None;
        self.compose.reset();
        self.mode = Mode::Browse;
        self.rerender();
    }

    // ── mouse ────────────────────────────────────────────────────────

    pub fn handle_mouse(&mut self, mouse: MouseEvent, layout: &UiLayout) {
        let pos = Position::new(mouse.column, mouse.row);
        let in_transcript = layout.transcript.contains(pos);
        let in_sidebar = layout.sidebar.contains(pos);

        match mouse.kind {
            MouseEventKind::ScrollUp if in_transcript => {
                self.view.wheel_up();
                self.after_user_scroll();
            }
            MouseEventKind::ScrollDown if in_transcript => {
                self.view.wheel_down();
                self.after_user_scroll();
            }
            MouseEventKind::ScrollUp if in_sidebar && self.mode == Mode::Browse => {
                self.select_step(-1)
            }
            MouseEventKind::ScrollDown if in_sidebar && self.mode == Mode::Browse => {
                self.select_step(1)
            }
            MouseEventKind::Down(MouseButton::Left) if self.mode == Mode::Browse => {
                let list = inner(layout.sidebar);
                if list.contains(pos) {
                    let index = ((mouse.row - list.y) / ROW_HEIGHT) as usize;
                    let (rows, _) = sidebar_rows(&self.controller, chrono::Utc::now());
                    if let Some(SidebarRow::Session { id, .. }) = rows.get(index) {
                        let id = id.clone();
                        self.select(id);
                    }
                } else if inner(layout.transcript).contains(pos) {
                    self.enter_compose();
                }
            }
            _ => return,
        }
        self.needs_redraw = true;
        self.rerender();
    }
}
