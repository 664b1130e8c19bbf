use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod actions;
mod app;

use actions::{Action, ResumeTarget};
use app::App;
use asmgr::agents::transcripts;
use asmgr::cli::{self, Cli, Commands};
use asmgr::core::{CreateOutcome, Direction};
use asmgr::store::Store;
use asmgr::ticker::{TickScope, Ticker};
use asmgr::tmux::TmuxClient;
use asmgr::{Config, CoreError, SessionCore};

type Core = SessionCore<TmuxClient>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.root.as_deref(), cli.config.as_deref())?;
    init_logging(&config);

    let mux = TmuxClient::new(config.tmux_path.clone(), config.mux_timeout())
        .with_hook_root(config.root.clone());
    let store = Store::new(&config.root);

    match cli.command {
        Some(Commands::RefreshStatus { session }) => {
            cli::refresh_status(&mux, &store, &config.session_prefix, &session)
                .await
                .with_context(|| format!("Failed to refresh status of {}", session))?;
            Ok(())
        }
        Some(Commands::Projects) => {
            for line in cli::project_lines(&store)? {
                println!("{}", line);
            }
            Ok(())
        }
        Some(Commands::List) => {
            for (inst, running) in cli::list_instances(&mux, &store, &config.session_prefix).await? {
                println!("{}", cli::instance_line(&inst, running));
            }
            Ok(())
        }
        None => run_tui(mux, config).await,
    }
}

/// Log to `<root>/asmgr.log`; the TUI owns the terminal.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file = std::fs::create_dir_all(&config.root).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_path())
    });
    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn run_tui(mux: TmuxClient, config: Config) -> Result<()> {
    if !mux.is_server_running().await {
        info!("tmux server not running yet; it starts with the first session");
    }
    let mut core = match SessionCore::open(mux, config.clone()) {
        Ok(core) => core,
        Err(CoreError::LockHeld(pid)) => bail!("This project is already open in process {}", pid),
        Err(e) => return Err(e).context("Failed to open project"),
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();
    let mut ticker = Ticker::new(config.tick_period(), config.slow_every);
    let clock = ticker.spawn_clock(tx.clone(), || Action::Tick);

    // Input is read on a plain thread; it stops polling while tmux owns the tty
    let input_paused = Arc::new(AtomicBool::new(false));
    let input_tx = tx.clone();
    let paused = input_paused.clone();
    std::thread::spawn(move || loop {
        if paused.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        if !event::poll(Duration::from_millis(100)).unwrap_or(false) || paused.load(Ordering::SeqCst) {
            continue;
        }
        if let Ok(Event::Key(key)) = event::read() {
            if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                break;
            }
        }
    });

    let mut terminal = ratatui::init();
    let mut app = App::new(core.settings().cursor);
    app.project_name = project_name(&core);

    let result: Result<()> = loop {
        for action in app.take_pending_actions() {
            let action = match action {
                Action::Attach(id) => {
                    terminal = attach(&mut core, &mut app, &input_paused, &id, terminal).await;
                    continue;
                }
                other => other,
            };
            if let Err(e) = dispatch(&mut core, &mut app, &mut ticker, &tx, action).await {
                error!("{}", e);
                app.error(e.to_string());
            }
        }

        let selected = app.selected_id();
        app.set_view(core.view(selected.as_deref()));
        terminal.draw(|f| app.render(f))?;
        if app.preview_size.0 > 0 {
            core.set_preview_geometry(app.preview_size.0, app.preview_size.1);
        }

        match rx.recv().await {
            Some(action) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            None => break Ok(()),
        }
    };

    clock.abort();
    ratatui::restore();
    let cursor = app.cursor();
    if let Err(e) = core.update_settings(|s| s.cursor = cursor) {
        error!("failed to save settings: {}", e);
    }
    core.quiesce()?;
    result
}

/// Hand the terminal to tmux until the user detaches, then take it back.
async fn attach(
    core: &mut Core,
    app: &mut App,
    input_paused: &AtomicBool,
    id: &str,
    terminal: DefaultTerminal,
) -> DefaultTerminal {
    let target = match core.prepare_attach(id).await {
        Ok(target) => target,
        Err(e) => {
            app.error(format!("Failed to attach: {}", e));
            return terminal;
        }
    };

    input_paused.store(true, Ordering::SeqCst);
    drop(terminal);
    ratatui::restore();
    let attached = core.attach(&target);
    let terminal = ratatui::init();
    input_paused.store(false, Ordering::SeqCst);

    core.after_detach(&target).await;
    if let Err(e) = attached {
        app.error(format!("Failed to attach: {}", e));
    }
    terminal
}

fn project_name(core: &Core) -> String {
    let Some(id) = core.active_project() else {
        return "default".to_string();
    };
    core.projects()
        .ok()
        .and_then(|catalog| catalog.get(id).map(|p| p.name.clone()))
        .unwrap_or_else(|| id.to_string())
}

async fn dispatch(
    core: &mut Core,
    app: &mut App,
    ticker: &mut Ticker,
    tx: &UnboundedSender<Action>,
    action: Action,
) -> Result<(), CoreError> {
    match action {
        Action::Tick => {
            let scope = ticker.next_scope();
            core.tick(scope, app.selected_id().as_deref()).await;
        }
        Action::Create(request) => match core.create(request).await? {
            CreateOutcome::Started(_) => app.info("Instance started"),
            CreateOutcome::NeedsResumeChoice {
                instance_id,
                candidates,
            } => app.choose_resume(instance_id, ResumeTarget::Create, candidates),
        },
        Action::ToggleRunning(id) => {
            let running = core.instance(&id).is_some_and(|i| i.is_running());
            if running {
                core.stop(&id).await?;
                app.info("Stopped");
            } else {
                core.start(&id).await?;
                app.info("Started");
            }
        }
        Action::Delete(id) => {
            core.delete(&id).await?;
            app.info("Instance deleted");
        }
        Action::ParallelStart(id) => {
            core.parallel_start(&id).await?;
            app.info("Parallel copy started");
        }
        Action::ToggleFavorite(id) => {
            core.toggle_favorite(&id)?;
        }
        Action::Reorder(id, dir) => {
            if core.reorder_instance(&id, dir)? {
                let cursor = app.cursor();
                let next = match dir {
                    Direction::Up => cursor.saturating_sub(1),
                    Direction::Down => cursor + 1,
                };
                app.list_state.select(Some(next));
            }
        }
        Action::Rename(id, name) => core.rename_instance(&id, &name).await?,
        Action::NewTab(id, kind) => {
            let index = core.new_tab(&id, "", kind, None).await?;
            app.info(format!("Opened tab {}", index));
        }
        Action::CloseTab(id, index) => core.close_tab(&id, index).await?,
        Action::SelectWindow(id, index) => {
            core.select_window(&id, index)?;
            core.tick(TickScope::Selected, Some(&id)).await;
        }
        Action::ToggleAutoApprove(id, window) => {
            let enabled = core.toggle_auto_approve(&id, window).await?;
            app.info(if enabled { "Auto-approve on" } else { "Auto-approve off" });
        }
        Action::SendPrompt(id, text) => core.send_prompt(&id, &text).await?,
        Action::FindResume(id, target) => find_resume(core, tx, id, target)?,
        Action::ResumeCandidates {
            instance_id,
            target,
            candidates,
        } => {
            // Stale when the instance went away or another dialog is open
            if core.instance(&instance_id).is_none() || app.input_mode != app::InputMode::Normal {
                return Ok(());
            }
            if candidates.is_empty() {
                app.info("No earlier conversations for this directory");
            } else {
                app.choose_resume(instance_id, target, candidates);
            }
        }
        Action::Resume {
            instance_id,
            target,
            token,
        } => match (target, token) {
            (ResumeTarget::Create, Some(token)) => core.start_with_resume(&instance_id, &token).await?,
            (ResumeTarget::Create, None) => core.start(&instance_id).await?,
            (ResumeTarget::Window(window), Some(token)) => {
                core.resume_window(&instance_id, window, &token).await?
            }
            (ResumeTarget::Fork, Some(token)) => {
                core.new_forked_tab(&instance_id, "fork", &token).await?;
            }
            (_, None) => {}
        },
        Action::AddGroup(name) => {
            core.add_group(&name)?;
        }
        Action::ToggleGroup(group_id) => {
            core.toggle_group_collapsed(&group_id)?;
        }
        Action::CycleGroup(id) => {
            let current = core.instance(&id).and_then(|i| i.group_id.clone());
            let groups: Vec<String> = core.groups().iter().map(|g| g.id.clone()).collect();
            let next = match current.and_then(|c| groups.iter().position(|g| *g == c)) {
                Some(pos) => groups.get(pos + 1).cloned(),
                None => groups.first().cloned(),
            };
            core.assign_to_group(&id, next.as_deref())?;
        }
        Action::CycleProject => {
            let catalog = core.projects()?;
            let ids: Vec<Option<String>> = std::iter::once(None)
                .chain(catalog.projects.into_iter().map(|p| Some(p.id)))
                .collect();
            let current = core.active_project().map(ToOwned::to_owned);
            let pos = ids.iter().position(|id| *id == current).unwrap_or(0);
            let next = ids[(pos + 1) % ids.len()].clone();
            core.switch_project(next.as_deref())?;
            app.project_name = project_name(core);
            app.list_state.select(Some(core.settings().cursor));
            app.info(format!("Switched to {}", app.project_name));
        }
        Action::KeyPress(_) | Action::Attach(_) => {}
    }
    Ok(())
}

/// Scan transcripts off the main loop; the result comes back as an action.
fn find_resume(core: &Core, tx: &UnboundedSender<Action>, id: String, target: ResumeTarget) -> Result<(), CoreError> {
    let inst = core
        .instance(&id)
        .ok_or_else(|| CoreError::UnknownInstance(id.clone()))?;
    let kind = match target {
        ResumeTarget::Window(window) => inst.window_agent(window),
        _ => inst.agent,
    };
    if !kind.profile().supports_resume() {
        return Err(CoreError::InvariantViolation(format!("{} cannot resume", kind.label())));
    }

    let home = core.home().to_path_buf();
    let cwd = inst.path.clone();
    let tx = tx.clone();
    tokio::task::spawn_blocking(move || {
        let candidates = transcripts::discover(kind, &home, &cwd);
        let _ = tx.send(Action::ResumeCandidates {
            instance_id: id,
            target,
            candidates,
        });
    });
    Ok(())
}
