use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{SessionApi, StartSessionRequest};
use crate::error::ConsoleError;
use crate::session::{workspace_key, Session, SessionId};

/// Command from UI → Backend.
#[derive(Debug, Clone)]
pub enum BackendCommand {
    StartSession {
        workspace_key: String,
        request: StartSessionRequest,
    },
    PostMessage {
        workspace_key: String,
        workspace_path: String,
        session_id: SessionId,
        text: String,
    },
    SetWorkspace(Option<String>),
    Quit,
}

/// Result from Backend → UI. Every variant carries the workspace key it was
/// produced for so late answers for a previous workspace can be dropped.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    PollResult {
        workspace_key: String,
        sessions: Vec<Session>,
    },
    PollFailed {
        workspace_key: String,
        error: ConsoleError,
    },
    SessionStarted {
        workspace_key: String,
        session: Session,
    },
    StartFailed {
        workspace_key: String,
        error: ConsoleError,
    },
    MessagePosted {
        workspace_key: String,
        session: Option<Session>,
    },
    PostFailed {
        workspace_key: String,
        error: ConsoleError,
    },
}

impl BackendEvent {
    pub fn workspace_key(&self) -> &str {
        match self {
            BackendEvent::PollResult { workspace_key, .. }
            | BackendEvent::PollFailed { workspace_key, .. }
            | BackendEvent::SessionStarted { workspace_key, .. }
            | BackendEvent::StartFailed { workspace_key, .. }
            | BackendEvent::MessagePosted { workspace_key, .. }
            | BackendEvent::PostFailed { workspace_key, .. } => workspace_key,
        }
    }
}

// ── Backend actor ──────────────────────────────────────────────────

enum Flow {
    Continue,
    Repoll,
    Stop,
}

/// The backend actor runs in `tokio::spawn` and owns all network I/O.
/// It polls the session list on a fixed interval and executes commands
/// from the UI, reporting every outcome as a [`BackendEvent`].
pub struct Backend {
    api: Arc<dyn SessionApi>,
    workspace_path: Option<String>,
    workspace_key: String,
    poll_interval: Duration,
    event_tx: mpsc::Sender<BackendEvent>,
}

impl Backend {
    pub fn new(
        api: Arc<dyn SessionApi>,
        workspace_path: Option<String>,
        poll_interval: Duration,
        event_tx: mpsc::Sender<BackendEvent>,
    ) -> Self {
        let workspace_key = workspace_key(workspace_path.as_deref());
        Self {
            api,
            workspace_path,
            workspace_key,
            poll_interval,
            event_tx,
        }
    }

    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<BackendCommand>) {
        // The first tick completes immediately.
        let mut poll_tick = tokio::time::interval(self.poll_interval);
        poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match self.handle_command(cmd).await {
                        Flow::Continue => {}
                        Flow::Repoll => poll_tick.reset_immediately(),
                        Flow::Stop => break,
                    }
                }
                _ = poll_tick.tick() => {
                    if !self.poll().await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("backend stopped");
    }

    fn set_workspace(&mut self, path: Option<String>) {
        self.workspace_key = workspace_key(path.as_deref());
        self.workspace_path = path;
        tracing::debug!(workspace = %self.workspace_key, "backend re-keyed");
    }

    async fn handle_command(&mut self, cmd: BackendCommand) -> Flow {
        let event = match cmd {
            BackendCommand::Quit => return Flow::Stop,
            BackendCommand::SetWorkspace(path) => {
                self.set_workspace(path);
                return Flow::Repoll;
            }
            BackendCommand::StartSession {
                workspace_key,
                request,
            } => match self.api.start_session(&request).await {
                Ok(session) => BackendEvent::SessionStarted {
                    workspace_key,
                    session,
                },
                Err(error) => {
                    tracing::warn!(error = %error, "starting session failed");
                    BackendEvent::StartFailed {
                        workspace_key,
                        error,
                    }
                }
            },
            BackendCommand::PostMessage {
                workspace_key,
                workspace_path,
                session_id,
                text,
            } => match self
                .api
                .post_message(&workspace_path, &session_id, &text)
                .await
            {
                Ok(session) => BackendEvent::MessagePosted {
                    workspace_key,
                    session,
                },
                Err(error) => {
                    tracing::warn!(session = %session_id, error = %error, "posting reply failed");
                    BackendEvent::PostFailed {
                        workspace_key,
                        error,
                    }
                }
            },
        };
        if self.emit(event).await {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }

    async fn poll(&mut self) -> bool {
        let workspace_key = self.workspace_key.clone();
        let event = match self.api.list_sessions(self.workspace_path.as_deref()).await {
            Ok(sessions) => BackendEvent::PollResult {
                workspace_key,
                sessions,
            },
            Err(error) => {
                tracing::warn!(workspace = %workspace_key, error = %error, "poll failed");
                BackendEvent::PollFailed {
                    workspace_key,
                    error,
                }
            }
        };
        self.emit(event).await
    }

    async fn emit(&self, event: BackendEvent) -> bool {
        self.event_tx.send(event).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsoleResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        polls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SessionApi for FakeApi {
        async fn list_sessions(&self, workspace: Option<&str>) -> ConsoleResult<Vec<Session>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConsoleError::Transport("HTTP 503".into()));
            }
            Ok(vec![Session::new(format!(
                "run-for-{}",
                workspace.unwrap_or("none")
            ))])
        }

        async fn start_session(&self, request: &StartSessionRequest) -> ConsoleResult<Session> {
            if self.fail {
                return Err(ConsoleError::Transport("HTTP 503".into()));
            }
            Ok(Session::new(format!("started-{}", request.prompt)))
        }

        async fn post_message(
            &self,
            _workspace_path: &str,
            session_id: &SessionId,
            _text: &str,
        ) -> ConsoleResult<Option<Session>> {
            if self.fail {
                return Err(ConsoleError::Transport("HTTP 503".into()));
            }
            Ok(Some(Session::new(session_id.as_str())))
        }
    }

    fn spawn(
        api: Arc<FakeApi>,
        workspace: Option<&str>,
    ) -> (
        mpsc::Sender<BackendCommand>,
        mpsc::Receiver<BackendEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let backend = Backend::new(
            api,
            workspace.map(String::from),
            Duration::from_secs(3600),
            event_tx,
        );
        let task = tokio::spawn(backend.run(cmd_rx));
        (cmd_tx, event_rx, task)
    }

    #[tokio::test]
    async fn first_poll_is_immediate() {
        let api = Arc::new(FakeApi::default());
        let (_cmd_tx, mut events, _task) = spawn(Arc::clone(&api), Some("/repo"));

        match events.recv().await.unwrap() {
            BackendEvent::PollResult {
                workspace_key,
                sessions,
            } => {
                assert_eq!(workspace_key, "/repo");
                assert_eq!(sessions[0].id.as_str(), "run-for-/repo");
            }
            other => panic!("expected PollResult, got {other:?}"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_failure_is_reported() {
        let api = Arc::new(FakeApi {
            fail: true,
            ..FakeApi::default()
        });
        let (_cmd_tx, mut events, _task) = spawn(api, Some("/repo"));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, BackendEvent::PollFailed { .. }));
        assert_eq!(event.workspace_key(), "/repo");
    }

    #[tokio::test]
    async fn set_workspace_repolls_with_new_key() {
        let api = Arc::new(FakeApi::default());
        let (cmd_tx, mut events, _task) = spawn(api, Some("/repo"));
        let _ = events.recv().await.unwrap();

        cmd_tx
            .send(BackendCommand::SetWorkspace(Some("/other/".into())))
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            BackendEvent::PollResult {
                workspace_key,
                sessions,
            } => {
                assert_eq!(workspace_key, "/other");
                assert_eq!(sessions[0].id.as_str(), "run-for-/other/");
            }
            other => panic!("expected PollResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_session_reports_outcome() {
        let api = Arc::new(FakeApi::default());
        let (cmd_tx, mut events, _task) = spawn(api, Some("/repo"));
        let _ = events.recv().await.unwrap();

        cmd_tx
            .send(BackendCommand::StartSession {
                workspace_key: "/repo".into(),
                request: StartSessionRequest::new("/repo", "hello"),
            })
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            BackendEvent::SessionStarted { session, .. } => {
                assert_eq!(session.id.as_str(), "started-hello");
            }
            other => panic!("expected SessionStarted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_post_reports_error() {
        let api = Arc::new(FakeApi {
            fail: true,
            ..FakeApi::default()
        });
        let (cmd_tx, mut events, _task) = spawn(api, Some("/repo"));
        let _ = events.recv().await.unwrap();

        cmd_tx
            .send(BackendCommand::PostMessage {
                workspace_key: "/repo".into(),
                workspace_path: "/repo".into(),
                session_id: SessionId::new("s1"),
                text: "hi".into(),
            })
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            BackendEvent::PostFailed { error, .. } => {
                assert_eq!(error.to_string(), "HTTP 503");
            }
            other => panic!("expected PostFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quit_stops_the_actor() {
        let api = Arc::new(FakeApi::default());
        let (cmd_tx, mut events, task) = spawn(api, None);
        let _ = events.recv().await.unwrap();

        cmd_tx.send(BackendCommand::Quit).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("backend should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_actor() {
        let api = Arc::new(FakeApi::default());
        let (_cmd_tx, events, task) = spawn(api, None);
        drop(events);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("backend should stop")
            .unwrap();
    }
}
