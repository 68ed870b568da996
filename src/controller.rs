//! Event-driven composition of selection, reconciliation, scrolling and
//! persistence for one console instance.

use crate::api::{SessionApi, StartSessionRequest};
use crate::error::{ConsoleError, ConsoleResult};
use crate::persist::{SelectionEvent, SelectionSync, EXTERNAL_ORIGIN};
use crate::scroll::ScrollController;
use crate::selection::{Phase, SelectionMachine};
use crate::session::{workspace_key, Session, SessionId};
use crate::transcript::{empty_transcript, latest_key, reconcile, Transcript};

/// Inputs the controller reacts to, in the order they arrive.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    PollResult {
        workspace_key: String,
        sessions: Vec<Session>,
    },
    UserSelect(SessionId),
    StartDraft,
    CancelDraft,
    Sync(SelectionEvent),
    SwitchWorkspace(Option<String>),
}

/// A validated reply, ready to hand to the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub workspace_key: String,
    pub workspace_path: String,
    pub session_id: SessionId,
    pub text: String,
}

pub struct TranscriptController {
    workspace_path: Option<String>,
    selection: SelectionMachine,
    sync: SelectionSync,
    sessions: Vec<Session>,
    transcript: Transcript,
    scroll: ScrollController,
    last_error: Option<String>,
    submitting: bool,
    replying: bool,
}

impl TranscriptController {
    /// Mount a controller for `workspace_path`, restoring its persisted
    /// selection.
    pub fn new(workspace_path: Option<String>, sync: SelectionSync) -> Self {
        let mut controller = Self {
            workspace_path: None,
            selection: SelectionMachine::new(workspace_key(None)),
            sync,
            sessions: Vec::new(),
            transcript: empty_transcript(),
            scroll: ScrollController::new(),
            last_error: None,
            submitting: false,
            replying: false,
        };
        controller.mount(workspace_path);
        controller
    }

    pub fn handle(&mut self, event: ControllerEvent) -> ConsoleResult<()> {
        match event {
            ControllerEvent::PollResult {
                workspace_key,
                sessions,
            } => {
                self.on_poll_result(&workspace_key, sessions);
            }
            ControllerEvent::UserSelect(id) => self.on_user_select(id),
            ControllerEvent::StartDraft => self.start_draft()?,
            ControllerEvent::CancelDraft => self.cancel_draft(),
            ControllerEvent::Sync(event) => {
                self.on_sync_event(&event);
            }
            ControllerEvent::SwitchWorkspace(path) => self.switch_workspace(path),
        }
        Ok(())
    }

    // ── accessors ────────────────────────────────────────────────────

    pub fn workspace_key(&self) -> &str {
        self.selection.workspace_key()
    }

    pub fn workspace_path(&self) -> Option<&str> {
        self.workspace_path.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn selection(&self) -> &SelectionMachine {
        &self.selection
    }

    pub fn phase(&self) -> Phase {
        self.selection.phase()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    /// Called by the view when the user scrolls towards or away from the
    /// bottom of the transcript.
    pub fn handle_auto_scroll_change(&mut self, enabled: bool) {
        self.scroll.handle_auto_scroll_change(enabled);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_replying(&self) -> bool {
        self.replying
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SelectionEvent> {
        self.sync.subscribe()
    }

    // ── events ───────────────────────────────────────────────────────

    /// Apply a polled session list. Lists for another workspace are stale
    /// and dropped; returns whether the list was applied.
    pub fn on_poll_result(&mut self, key: &str, sessions: Vec<Session>) -> bool {
        if key != self.workspace_key() {
            tracing::debug!(stale = key, current = self.workspace_key(), "discarding stale poll");
            return false;
        }
        self.selection.on_poll_result(&sessions);
        self.sessions = sessions;
        self.refresh();
        true
    }

    pub fn on_user_select(&mut self, id: SessionId) {
        self.selection.select(id);
        self.refresh();
    }

    pub fn start_draft(&mut self) -> ConsoleResult<()> {
        let started = self.selection.start_draft(self.workspace_path.as_deref());
        self.surface(started)?;
        self.refresh();
        Ok(())
    }

    pub fn cancel_draft(&mut self) {
        self.selection.cancel_draft();
        self.refresh();
    }

    /// Apply a selection persisted by a sibling handle. Returns whether the
    /// local selection changed.
    pub fn on_sync_event(&mut self, event: &SelectionEvent) -> bool {
        if event.origin == self.sync.origin() || event.workspace_key != self.workspace_key() {
            return false;
        }
        // Watched-file events may be queued behind newer local writes, so
        // the store is the authority for them.
        let selected = if event.origin == EXTERNAL_ORIGIN {
            self.sync.read(self.workspace_key()).selected_session_id
        } else {
            event.state.selected_session_id.clone()
        };
        if !self.selection.apply_remote(selected) {
            return false;
        }
        let key = self.workspace_key().to_string();
        self.sync.remember(&key, self.selection.selected());
        self.refresh();
        true
    }

    /// Re-key the controller on a different workspace. Polls still in flight
    /// for the old key are discarded when they land.
    pub fn switch_workspace(&mut self, workspace_path: Option<String>) {
        if workspace_key(workspace_path.as_deref()) == self.workspace_key() {
            self.workspace_path = workspace_path;
            return;
        }
        self.mount(workspace_path);
    }

    // ── draft submission ─────────────────────────────────────────────

    /// Validate a draft prompt and mark a submission in flight.
    pub fn begin_submit(&mut self, prompt: &str) -> ConsoleResult<StartSessionRequest> {
        let validated = self.validate_submit(prompt);
        let request = self.surface(validated)?;
        self.submitting = true;
        Ok(request)
    }

    /// Apply the store's answer to a draft submission. On failure the
    /// machine stays in drafting so the user can retry.
    pub fn finish_submit(&mut self, result: ConsoleResult<Session>) -> ConsoleResult<SessionId> {
        self.submitting = false;
        let session = self.surface(result)?;
        let id = session.id.clone();
        self.upsert_session(session);
        self.selection.draft_submitted(id.clone());
        self.last_error = None;
        self.refresh();
        Ok(id)
    }

    pub async fn submit_draft(
        &mut self,
        api: &dyn SessionApi,
        prompt: &str,
    ) -> ConsoleResult<SessionId> {
        let request = self.begin_submit(prompt)?;
        let result = api.start_session(&request).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "starting session failed");
        }
        self.finish_submit(result)
    }

    fn validate_submit(&self, prompt: &str) -> ConsoleResult<StartSessionRequest> {
        let workspace_path = match self.selection.phase() {
            Phase::Drafting { workspace_path } => workspace_path,
            _ => non_blank(self.workspace_path.as_deref())
                .ok_or(ConsoleError::MissingWorkspacePath)?
                .to_string(),
        };
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }
        Ok(StartSessionRequest::new(workspace_path, prompt))
    }

    // ── replies ──────────────────────────────────────────────────────

    /// Validate a reply to the displayed session and mark it in flight.
    pub fn begin_reply(&mut self, text: &str) -> ConsoleResult<ReplyRequest> {
        let validated = self.validate_reply(text);
        let request = self.surface(validated)?;
        self.replying = true;
        Ok(request)
    }

    /// Merge the store's answer immediately rather than waiting for the
    /// next poll, then follow the new content if auto-scrolling.
    pub fn finish_reply(&mut self, result: ConsoleResult<Option<Session>>) -> ConsoleResult<()> {
        self.replying = false;
        let updated = self.surface(result)?;
        if let Some(session) = updated {
            self.upsert_session(session);
        }
        self.last_error = None;
        self.refresh();
        self.scroll.request_scroll_if_auto();
        Ok(())
    }

    pub async fn send_reply(&mut self, api: &dyn SessionApi, text: &str) -> ConsoleResult<()> {
        let request = self.begin_reply(text)?;
        let result = api
            .post_message(&request.workspace_path, &request.session_id, &request.text)
            .await;
        if let Err(err) = &result {
            tracing::warn!(session = %request.session_id, error = %err, "posting reply failed");
        }
        self.finish_reply(result)
    }

    fn validate_reply(&self, text: &str) -> ConsoleResult<ReplyRequest> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }
        let workspace_path = non_blank(self.workspace_path.as_deref())
            .ok_or(ConsoleError::MissingWorkspacePath)?;
        let session_id = self
            .selection
            .displayed()
            .ok_or(ConsoleError::NoSessionSelected)?;
        Ok(ReplyRequest {
            workspace_key: self.workspace_key().to_string(),
            workspace_path: workspace_path.to_string(),
            session_id: session_id.clone(),
            text: text.to_string(),
        })
    }

    // ── internals ────────────────────────────────────────────────────

    fn mount(&mut self, workspace_path: Option<String>) {
        let key = workspace_key(workspace_path.as_deref());
        let persisted = self.sync.read(&key).selected_session_id;
        self.sync.remember(&key, persisted.as_ref());
        tracing::debug!(workspace = %key, restored = ?persisted, "workspace mounted");

        self.workspace_path = workspace_path;
        self.selection = SelectionMachine::restore(key, persisted);
        self.sessions.clear();
        self.submitting = false;
        self.replying = false;
        self.last_error = None;
        self.refresh();
    }

    /// Record an error for display and hand it back to the caller.
    fn surface<T>(&mut self, result: ConsoleResult<T>) -> ConsoleResult<T> {
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }

    fn upsert_session(&mut self, session: Session) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.insert(0, session),
        }
    }

    /// Re-derive everything that depends on the selection and session list.
    fn refresh(&mut self) {
        let incoming = self
            .selection
            .displayed()
            .and_then(|id| self.sessions.iter().find(|s| &s.id == id))
            .map(|s| s.log.as_slice())
            .unwrap_or_default();
        self.transcript = reconcile(&self.transcript, incoming);

        match self.selection.phase() {
            Phase::Selected(id) => self.scroll.set_context(id.as_str()),
            Phase::Drafting { .. } => {
                let key = format!("draft:{}", self.workspace_key());
                self.scroll.set_context(&key);
            }
            Phase::NoSelection => {
                let key = format!("none:{}", self.workspace_key());
                self.scroll.set_context(&key);
            }
        }
        self.scroll.notify_latest_key(latest_key(&self.transcript).as_deref());

        let key = self.workspace_key().to_string();
        self.sync.persist(&key, self.selection.selected());
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
