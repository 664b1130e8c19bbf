use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::status_bar;
use crate::domain::{instance_id_from_session, Instance};
use crate::store::Store;
use crate::tmux::Multiplexer;

#[derive(Parser, Debug)]
#[command(name = "asmgr")]
#[command(about = "Run and supervise AI coding agents inside tmux")]
pub struct Cli {
    /// State directory (defaults to $ASMGR_HOME or the user config dir)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (defaults to <root>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Re-render the status bar of one session (run by tmux hooks)
    RefreshStatus {
        /// tmux session name
        session: String,
    },
    /// List projects
    Projects,
    /// List instances of the active project
    List,
}

/// Find the instance behind `session` in any project and reinstall its
/// status bar. Reads without taking a project lock. Returns `false` for
/// sessions this tool does not own.
pub async fn refresh_status<M: Multiplexer>(
    mux: &M,
    store: &Store,
    prefix: &str,
    session: &str,
) -> Result<bool> {
    let Some(id) = instance_id_from_session(prefix, session) else {
        debug!(session, "not a managed session");
        return Ok(false);
    };

    let catalog = store.load_catalog()?;
    let projects = std::iter::once(None).chain(catalog.projects.iter().map(|p| Some(p.id.as_str())));
    for project in projects {
        let instances = store.load_instances(project)?;
        if let Some(inst) = instances.iter().find(|i| i.id == id) {
            mux.configure_status(session, &status_bar(inst)).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// One line per project, the active one marked with `*`.
pub fn project_lines(store: &Store) -> Result<Vec<String>> {
    let catalog = store.load_catalog()?;
    let mut lines = vec![format!(
        "{} default",
        if catalog.active_id.is_none() { "*" } else { " " }
    )];
    for project in &catalog.projects {
        let marker = if catalog.active_id.as_deref() == Some(project.id.as_str()) {
            "*"
        } else {
            " "
        };
        lines.push(format!("{} {}  {}", marker, project.name, project.id));
    }
    Ok(lines)
}

/// Instances of the active project paired with whether their session is live.
pub async fn list_instances<M: Multiplexer>(
    mux: &M,
    store: &Store,
    prefix: &str,
) -> Result<Vec<(Instance, bool)>> {
    let active = store.load_catalog()?.active_id;
    let instances = store.load_instances(active.as_deref())?;
    let live: HashSet<String> = mux.list_sessions(prefix).await.unwrap_or_default().into_iter().collect();
    Ok(instances
        .into_iter()
        .map(|inst| {
            let running = live.contains(&inst.session_name(prefix));
            (inst, running)
        })
        .collect())
}

pub fn instance_line(inst: &Instance, running: bool) -> String {
    format!(
        "{} {:<24} {:<8} {}",
        if running { "●" } else { "○" },
        inst.name,
        inst.agent.label(),
        inst.path.display()
    )
}
