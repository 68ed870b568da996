use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tether::api::{HttpSessionApi, SessionApi};
use tether::app::UiApp;
use tether::backend::Backend;
use tether::config::{Config, Overrides};
use tether::controller::TranscriptController;
use tether::event::{Event, EventHandler};
use tether::persist::{FileStore, SelectionSync};
use tether::selection::SelectionMachine;
use tether::session::{format_duration, workspace_key, SessionId};
use tether::{logging, ui};

const EVENT_TICK_RATE: Duration = Duration::from_millis(50);

/// Ticks between redraws when nothing changed, so session ages stay fresh.
const IDLE_REDRAW_TICKS: u32 = 20;

#[derive(Parser)]
#[command(name = "tether", version, about = "Console for agent session transcripts")]
struct Cli {
    /// Base URL of the session store
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Workspace path (defaults to the current directory)
    #[arg(long, short = 'w', global = true)]
    workspace: Option<String>,
    /// Directory for persisted selection and logs
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sessions for the workspace
    Ls,
    /// Start a new session and select it
    New {
        /// First message of the session
        prompt: String,
        /// Model to run the session with
        #[arg(long)]
        model: Option<String>,
    },
    /// Reply to a session
    Reply {
        /// Message text
        text: String,
        /// Session id (defaults to the selected session)
        #[arg(long)]
        session: Option<String>,
    },
    /// Persist the selected session for the workspace
    Select {
        /// Session id
        id: String,
    },
    /// Print the persisted selection for the workspace
    State,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::from_env()
        .with_overrides(Overrides {
            api_url: cli.api_url,
            workspace: cli.workspace,
            state_dir: cli.state_dir,
        })
        .with_default_workspace(&cwd);

    let Some(command) = cli.command else {
        return run_tui(config).await;
    };

    logging::init_stderr(config.log_filter.as_deref());
    match command {
        Commands::Ls => cmd_ls(&config).await,
        Commands::New { prompt, model } => cmd_new(&config, &prompt, model).await,
        Commands::Reply { text, session } => cmd_reply(&config, &text, session).await,
        Commands::Select { id } => cmd_select(&config, id),
        Commands::State => cmd_state(&config),
    }
}

fn file_sync(config: &Config) -> SelectionSync {
    SelectionSync::new(Arc::new(FileStore::in_state_dir(&config.state_dir)))
}

fn controller(config: &Config) -> TranscriptController {
    TranscriptController::new(config.workspace_path.clone(), file_sync(config))
}

async fn cmd_ls(config: &Config) -> Result<()> {
    let api = HttpSessionApi::new(&config.api_url);
    let sessions = api
        .list_sessions(config.workspace_path.as_deref())
        .await
        .context("Failed to list sessions")?;

    // Resolve the selection the console would show, without persisting it.
    let key = workspace_key(config.workspace_path.as_deref());
    let persisted = file_sync(config).read(&key).selected_session_id;
    let mut selection = SelectionMachine::restore(key, persisted);
    selection.on_poll_result(&sessions);

    if sessions.is_empty() {
        println!("No sessions for this workspace.");
        return Ok(());
    }
    let now = chrono::Utc::now();
    for session in &sessions {
        let marker = if selection.selected() == Some(&session.id) {
            ">"
        } else {
            " "
        };
        let age = session
            .age(now)
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        let title = session.title().unwrap_or_default();
        println!("{marker} {}  {age}  {title}", session.id);
    }
    Ok(())
}

async fn cmd_new(config: &Config, prompt: &str, model: Option<String>) -> Result<()> {
    let api = HttpSessionApi::new(&config.api_url);
    let mut controller = controller(config);
    controller.start_draft()?;

    let mut request = controller.begin_submit(prompt)?;
    request.model = model;
    let result = api.start_session(&request).await;
    let id = controller.finish_submit(result)?;
    println!("Started session: {id}");
    Ok(())
}

async fn cmd_reply(config: &Config, text: &str, session: Option<String>) -> Result<()> {
    let api = HttpSessionApi::new(&config.api_url);
    let mut controller = controller(config);
    if let Some(id) = session {
        controller.on_user_select(SessionId::new(id));
    }
    controller.send_reply(&api, text).await?;
    if let Some(id) = controller.selection().displayed() {
        println!("Replied to {id}");
    }
    Ok(())
}

fn cmd_select(config: &Config, id: String) -> Result<()> {
    let mut controller = controller(config);
    controller.on_user_select(SessionId::new(id));
    if let Some(id) = controller.selection().selected() {
        println!("Selected {id} for {}", controller.workspace_key());
    }
    Ok(())
}

fn cmd_state(config: &Config) -> Result<()> {
    let key = workspace_key(config.workspace_path.as_deref());
    let state = file_sync(config).read(&key);
    let json = serde_json::to_string_pretty(&state).context("Failed to encode state")?;
    println!("{json}");
    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    // The console owns the terminal, so logs go to a file.
    let log_path = config.log_path();
    logging::init_file(config.log_filter.as_deref(), &log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    tracing::info!(workspace = ?config.workspace_path, api = %config.api_url, "console starting");

    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(&config.api_url));
    let store = FileStore::in_state_dir(&config.state_dir);
    let sync = SelectionSync::new(Arc::new(store.clone()));
    // Selections written by other `tether` processes arrive through the watch.
    let _watch = sync
        .watch_files(&store)
        .inspect_err(|err| tracing::warn!(error = %err, "selection sync across processes disabled"))
        .ok();
    let controller = TranscriptController::new(config.workspace_path.clone(), sync);

    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(64);
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
    let backend = Backend::new(
        api,
        config.workspace_path.clone(),
        config.poll_interval,
        event_tx,
    );
    tokio::spawn(backend.run(cmd_rx));

    let mut app = UiApp::new(controller, cmd_tx, event_rx);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut UiApp,
) -> Result<()> {
    let mut events = EventHandler::new(EVENT_TICK_RATE);
    let mut idle_ticks = 0u32;

    terminal.draw(|frame| ui::draw(frame, app))?;

    // No network awaits in here; the backend actor does all I/O.
    loop {
        if app.should_quit {
            break;
        }

        match events.next().await {
            Some(Event::Key(key)) => app.handle_key(key),
            Some(Event::Paste(text)) => app.handle_paste(text),
            Some(Event::Mouse(mouse)) => {
                let size = terminal.size()?;
                let layout = app.layout_for(Rect::new(0, 0, size.width, size.height));
                app.handle_mouse(mouse, &layout);
            }
            Some(Event::Tick) => {
                app.poll_state();
                idle_ticks += 1;
                if idle_ticks >= IDLE_REDRAW_TICKS {
                    idle_ticks = 0;
                    app.needs_redraw = true;
                }
            }
            Some(Event::Resize) => app.needs_redraw = true,
            None => break,
        }

        if app.needs_redraw {
            terminal.draw(|frame| ui::draw(frame, app))?;
            app.needs_redraw = false;
        }
    }
    Ok(())
}
