//! Which session is current for a workspace: none, a selected session, or a
//! draft being composed before the server has assigned it an id.

use crate::error::{ConsoleError, ConsoleResult};
use crate::session::{Session, SessionId};

/// Observable phase of the selection machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    NoSelection,
    Selected(SessionId),
    Drafting { workspace_path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Draft {
    workspace_path: String,
}

/// Pure selection state for a single workspace key. Every input is an
/// explicit method call; nothing here performs I/O.
///
/// While drafting, the underlying selection is still tracked (and still
/// follows poll results) so cancelling a draft returns to a sensible session.
#[derive(Debug, Clone)]
pub struct SelectionMachine {
    workspace_key: String,
    selected: Option<SessionId>,
    draft: Option<Draft>,
    pending: Option<SessionId>,
}

impl SelectionMachine {
    pub fn new(workspace_key: impl Into<String>) -> Self {
        Self {
            workspace_key: workspace_key.into(),
            selected: None,
            draft: None,
            pending: None,
        }
    }

    /// Machine for a freshly mounted workspace, seeded from persisted state.
    pub fn restore(workspace_key: impl Into<String>, persisted: Option<SessionId>) -> Self {
        let mut machine = Self::new(workspace_key);
        machine.selected = persisted;
        machine
    }

    pub fn workspace_key(&self) -> &str {
        &self.workspace_key
    }

    pub fn phase(&self) -> Phase {
        match (&self.draft, &self.selected) {
            (Some(draft), _) => Phase::Drafting {
                workspace_path: draft.workspace_path.clone(),
            },
            (None, Some(id)) => Phase::Selected(id.clone()),
            (None, None) => Phase::NoSelection,
        }
    }

    pub fn selected(&self) -> Option<&SessionId> {
        self.selected.as_ref()
    }

    pub fn pending(&self) -> Option<&SessionId> {
        self.pending.as_ref()
    }

    pub fn is_drafting(&self) -> bool {
        self.draft.is_some()
    }

    /// The session whose transcript should be shown, `None` while drafting.
    pub fn displayed(&self) -> Option<&SessionId> {
        if self.draft.is_some() {
            None
        } else {
            self.selected.as_ref()
        }
    }

    /// Enter drafting from any phase. A blank workspace path is a validation
    /// error and leaves the machine untouched.
    pub fn start_draft(&mut self, workspace_path: Option<&str>) -> ConsoleResult<()> {
        let path = workspace_path.map(str::trim).unwrap_or_default();
        if path.is_empty() {
            return Err(ConsoleError::MissingWorkspacePath);
        }
        tracing::debug!(workspace = %self.workspace_key, "draft started");
        self.draft = Some(Draft {
            workspace_path: path.to_string(),
        });
        Ok(())
    }

    pub fn cancel_draft(&mut self) {
        if self.draft.take().is_some() {
            tracing::debug!(workspace = %self.workspace_key, "draft cancelled");
        }
    }

    /// The server acknowledged a draft with a new session id.
    pub fn draft_submitted(&mut self, id: SessionId) {
        tracing::debug!(workspace = %self.workspace_key, session = %id, "draft submitted, awaiting poll");
        self.draft = None;
        self.clear_pending("superseded by new draft");
        self.pending = Some(id.clone());
        self.selected = Some(id);
    }

    /// Explicit user choice of a session row.
    pub fn select(&mut self, id: SessionId) {
        tracing::debug!(workspace = %self.workspace_key, session = %id, "session selected");
        self.draft = None;
        self.clear_pending("superseded by user selection");
        self.selected = Some(id);
    }

    /// Apply a session list from a poll. The list order is authoritative:
    /// the first entry is the most recent session.
    pub fn on_poll_result(&mut self, sessions: &[Session]) {
        let Some(first) = sessions.first() else {
            // An empty list may be a transient partial response, so the
            // selection survives. An unresolved pending id does not.
            self.clear_pending("empty poll result");
            return;
        };

        let contains = |id: &SessionId| sessions.iter().any(|s| &s.id == id);

        if self.pending.as_ref().is_some_and(contains) {
            self.clear_pending("confirmed by poll");
        }

        let keep = match &self.selected {
            None => false,
            Some(id) => contains(id) || self.pending.as_ref() == Some(id),
        };
        if !keep {
            tracing::debug!(
                workspace = %self.workspace_key,
                previous = ?self.selected,
                session = %first.id,
                "falling back to most recent session"
            );
            self.selected = Some(first.id.clone());
        }
    }

    /// Apply a selection made elsewhere (another handle on the same store).
    /// Returns whether anything changed.
    pub fn apply_remote(&mut self, selected: Option<SessionId>) -> bool {
        if self.selected == selected {
            return false;
        }
        tracing::debug!(workspace = %self.workspace_key, session = ?selected, "remote selection applied");
        self.selected = selected;
        self.clear_pending("superseded by remote selection");
        true
    }

    fn clear_pending(&mut self, reason: &'static str) {
        if let Some(id) = self.pending.take() {
            tracing::debug!(workspace = %self.workspace_key, session = %id, reason, "pending session cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions(ids: &[&str]) -> Vec<Session> {
        ids.iter().map(|id| Session::new(*id)).collect()
    }

    fn id(value: &str) -> SessionId {
        SessionId::new(value)
    }

    #[test]
    fn starts_without_selection() {
        let machine = SelectionMachine::new("ws");
        assert_eq!(machine.phase(), Phase::NoSelection);
        assert!(machine.pending().is_none());
    }

    #[test]
    fn restore_with_persisted_id_is_selected() {
        let machine = SelectionMachine::restore("ws", Some(id("s1")));
        assert_eq!(machine.phase(), Phase::Selected(id("s1")));
    }

    #[test]
    fn restore_without_persisted_id_has_no_selection() {
        let machine = SelectionMachine::restore("ws", None);
        assert_eq!(machine.phase(), Phase::NoSelection);
    }

    #[test]
    fn first_poll_selects_most_recent() {
        let mut machine = SelectionMachine::new("ws");
        machine.on_poll_result(&sessions(&["s2", "s1"]));
        assert_eq!(machine.selected(), Some(&id("s2")));
    }

    #[test]
    fn poll_keeps_existing_selection() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        machine.on_poll_result(&sessions(&["s2", "s1"]));
        assert_eq!(machine.selected(), Some(&id("s1")));
    }

    #[test]
    fn vanished_selection_falls_back_to_first() {
        let mut machine = SelectionMachine::restore("ws", Some(id("gone")));
        machine.on_poll_result(&sessions(&["s2", "s1"]));
        assert_eq!(machine.selected(), Some(&id("s2")));
    }

    #[test]
    fn empty_poll_keeps_selection() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        machine.on_poll_result(&[]);
        assert_eq!(machine.selected(), Some(&id("s1")));
    }

    #[test]
    fn empty_poll_clears_pending_but_keeps_selection() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.draft_submitted(id("new"));
        assert_eq!(machine.pending(), Some(&id("new")));

        machine.on_poll_result(&[]);
        assert!(machine.pending().is_none());
        assert_eq!(machine.selected(), Some(&id("new")));
    }

    #[test]
    fn pending_id_survives_poll_that_predates_it() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.draft_submitted(id("new"));

        machine.on_poll_result(&sessions(&["old"]));
        assert_eq!(machine.selected(), Some(&id("new")));
        assert_eq!(machine.pending(), Some(&id("new")));
    }

    #[test]
    fn pending_id_confirmed_when_it_appears() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.draft_submitted(id("new"));

        machine.on_poll_result(&sessions(&["new", "old"]));
        assert!(machine.pending().is_none());
        assert_eq!(machine.selected(), Some(&id("new")));

        // Once confirmed the id is an ordinary selection again.
        machine.on_poll_result(&sessions(&["old"]));
        assert_eq!(machine.selected(), Some(&id("old")));
    }

    #[test]
    fn start_draft_requires_workspace_path() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        assert_eq!(
            machine.start_draft(None),
            Err(ConsoleError::MissingWorkspacePath)
        );
        assert_eq!(
            machine.start_draft(Some("  ")),
            Err(ConsoleError::MissingWorkspacePath)
        );
        assert_eq!(machine.phase(), Phase::Selected(id("s1")));
    }

    #[test]
    fn start_draft_from_selected() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        machine.start_draft(Some("/repo")).unwrap();
        assert_eq!(
            machine.phase(),
            Phase::Drafting {
                workspace_path: "/repo".into()
            }
        );
        assert!(machine.displayed().is_none());
    }

    #[test]
    fn drafting_survives_polls() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.on_poll_result(&sessions(&["s1"]));
        assert!(machine.is_drafting());
        assert_eq!(machine.selected(), Some(&id("s1")));
    }

    #[test]
    fn submit_success_exits_drafting() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.draft_submitted(id("new"));
        assert_eq!(machine.phase(), Phase::Selected(id("new")));
    }

    #[test]
    fn cancel_draft_returns_to_selection() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        machine.start_draft(Some("/repo")).unwrap();
        machine.cancel_draft();
        assert_eq!(machine.phase(), Phase::Selected(id("s1")));
    }

    #[test]
    fn user_select_exits_drafting_and_clears_pending() {
        let mut machine = SelectionMachine::new("ws");
        machine.start_draft(Some("/repo")).unwrap();
        machine.draft_submitted(id("new"));
        machine.start_draft(Some("/repo")).unwrap();

        machine.select(id("s1"));
        assert_eq!(machine.phase(), Phase::Selected(id("s1")));
        assert!(machine.pending().is_none());
    }

    #[test]
    fn remote_selection_is_idempotent() {
        let mut machine = SelectionMachine::restore("ws", Some(id("s1")));
        assert!(!machine.apply_remote(Some(id("s1"))));
        assert!(machine.apply_remote(Some(id("s2"))));
        assert_eq!(machine.selected(), Some(&id("s2")));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Input {
            Poll(Vec<u8>),
            Select(u8),
            Draft,
            Submit(u8),
        }

        fn arb_input() -> impl Strategy<Value = Input> {
            prop_oneof![
                proptest::collection::vec(0u8..6, 0..4).prop_map(Input::Poll),
                (0u8..6).prop_map(Input::Select),
                Just(Input::Draft),
                (0u8..6).prop_map(Input::Submit),
            ]
        }

        proptest! {
            #[test]
            fn non_empty_poll_always_leaves_a_selection(
                inputs in proptest::collection::vec(arb_input(), 0..20),
                last in proptest::collection::vec(0u8..6, 1..4),
            ) {
                let mut machine = SelectionMachine::new("ws");
                for input in inputs {
                    match input {
                        Input::Poll(ids) => {
                            let list: Vec<Session> =
                                ids.iter().map(|i| Session::new(format!("s{i}"))).collect();
                            machine.on_poll_result(&list);
                        }
                        Input::Select(i) => machine.select(id(&format!("s{i}"))),
                        Input::Draft => machine.start_draft(Some("/repo")).unwrap(),
                        Input::Submit(i) => machine.draft_submitted(id(&format!("s{i}"))),
                    }
                }
                let list: Vec<Session> =
                    last.iter().map(|i| Session::new(format!("s{i}"))).collect();
                machine.on_poll_result(&list);
                let selected = machine.selected().cloned();
                prop_assert!(selected.is_some());
                let selected = selected.unwrap();
                prop_assert!(
                    list.iter().any(|s| s.id == selected) || machine.pending() == Some(&selected)
                );
            }
        }
    }
}
