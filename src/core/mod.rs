//! Session core: owns the project's instances and groups, drives tmux to
//! realize them, and reconciles with tmux on every tick.
//!
//! Operations are either pure model mutations followed by a save, or
//! effectful operations that call tmux first and persist only after the
//! tmux side succeeded.

mod catalog;
mod lifecycle;
mod projects;
mod reconcile;
mod view;

pub use catalog::{display_order, reorder, structural_rows, Direction, Row};
pub use lifecycle::{AttachTarget, CreateOutcome, CreateRequest};
pub use view::{InstanceView, RowView, TabView, ViewModel};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::agents::{binary_on_path, AgentKind, LaunchCommand};
use crate::config::Config;
use crate::domain::{Group, Instance, Settings};
use crate::error::CoreError;
use crate::store::{ProjectLock, Store};
use crate::tmux::{ActivityClassifier, Multiplexer, SessionSpec, StatusBar};

/// Environment variable exported into every session's window 0.
pub const INSTANCE_ENV: &str = "ASMGR_INSTANCE";

pub struct SessionCore<M: Multiplexer> {
    mux: M,
    store: Store,
    config: Config,
    classifier: ActivityClassifier,
    /// Home directory searched for agent transcripts
    home: PathBuf,
    binary_check: fn(&str) -> bool,
    /// Active project; `None` is the default project
    project: Option<String>,
    lock: Option<ProjectLock>,
    instances: Vec<Instance>,
    groups: Vec<Group>,
    settings: Settings,
    /// Prefixed tmux sessions no known instance claims
    orphans: Vec<String>,
    /// Instance ids belonging to other projects
    foreign_ids: HashSet<String>,
    preview_size: (u16, u16),
}

impl<M: Multiplexer> SessionCore<M> {
    /// Lock and load the catalog's active project.
    pub fn open(mux: M, config: Config) -> Result<Self, CoreError> {
        let store = Store::new(&config.root);
        let catalog = store.load_catalog()?;
        let project = catalog
            .active_id
            .filter(|id| catalog.projects.iter().any(|p| &p.id == id));

        let lock = store.lock_project(project.as_deref())?;
        let state = store.load_all(project.as_deref())?;
        info!(
            project = ?project,
            instances = state.instances.len(),
            "opened session core"
        );

        let classifier = ActivityClassifier::new(config.classify_tail_lines, config.last_line_width);
        let preview_size = (config.preview_width, config.preview_height);
        let mut core = Self {
            mux,
            store,
            classifier,
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            binary_check: binary_on_path,
            project,
            lock: Some(lock),
            instances: state.instances,
            groups: state.groups,
            settings: state.settings,
            orphans: Vec::new(),
            foreign_ids: HashSet::new(),
            preview_size,
            config,
        };
        core.load_foreign_ids();
        Ok(core)
    }

    /// Search `home` for agent transcripts instead of the user's home.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Replace the `PATH` lookup used before launching an agent.
    pub fn with_binary_check(mut self, check: fn(&str) -> bool) -> Self {
        self.binary_check = check;
        self
    }

    pub fn mux(&self) -> &M {
        &self.mux
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn orphans(&self) -> &[String] {
        &self.orphans
    }

    /// Geometry the pane is resized to on detach, matching the preview area.
    pub fn set_preview_geometry(&mut self, width: u16, height: u16) {
        self.preview_size = (width.max(20), height.max(5));
    }

    pub fn preview_geometry(&self) -> (u16, u16) {
        self.preview_size
    }

    pub fn session_name(&self, inst: &Instance) -> String {
        inst.session_name(&self.config.session_prefix)
    }

    /// Apply a settings change and persist it.
    pub fn update_settings(&mut self, f: impl FnOnce(&mut Settings)) -> Result<(), CoreError> {
        f(&mut self.settings);
        self.store
            .save_settings(self.project.as_deref(), &self.settings)?;
        Ok(())
    }

    /// Save settings and release the project lock before exit or exec.
    pub fn quiesce(&mut self) -> Result<(), CoreError> {
        self.store
            .save_settings(self.project.as_deref(), &self.settings)?;
        if let Some(lock) = self.lock.take() {
            lock.release()?;
        }
        info!(project = ?self.project, "session core quiesced");
        Ok(())
    }

    fn index_of(&self, id: &str) -> Result<usize, CoreError> {
        self.instances
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| CoreError::UnknownInstance(id.to_string()))
    }

    fn persist(&self) -> Result<(), CoreError> {
        self.store
            .save(self.project.as_deref(), &self.instances, &self.groups)?;
        Ok(())
    }

    fn check_binary(&self, kind: AgentKind, custom_command: Option<&str>) -> Result<(), CoreError> {
        match kind.profile().required_binary(custom_command) {
            Some(binary) if !(self.binary_check)(&binary) => Err(CoreError::MissingBinary(binary)),
            _ => Ok(()),
        }
    }

    /// Launch command for window `index` of an instance.
    fn window_command(&self, inst: &Instance, index: u32) -> Result<LaunchCommand, CoreError> {
        let command = if index == 0 {
            inst.agent.profile().build_command(
                inst.custom_command.as_deref(),
                inst.auto_yes,
                &inst.resume_session_id,
                &inst.path,
            )?
        } else {
            let window = inst.followed(index).ok_or_else(|| {
                CoreError::invariant(format!("window {} is not tracked by {}", index, inst.name))
            })?;
            window.agent.profile().build_command(
                window.custom_command.as_deref(),
                window.auto_yes,
                &window.resume_session_id,
                &inst.path,
            )?
        };
        Ok(command)
    }

    fn session_spec(&self, inst: &Instance) -> Result<SessionSpec, CoreError> {
        let command = self.window_command(inst, 0)?;
        Ok(SessionSpec {
            name: self.session_name(inst),
            cwd: command.cwd.clone(),
            command: command.shell_line(),
            env: vec![(INSTANCE_ENV.to_string(), inst.id.clone())],
            width: self.preview_size.0,
            height: self.preview_size.1,
        })
    }

    /// Reinstall the status bar for an instance. Advisory.
    async fn refresh_status_bar(&self, idx: usize) {
        let inst = &self.instances[idx];
        let name = self.session_name(inst);
        if let Err(e) = self.mux.configure_status(&name, &status_bar(inst)).await {
            warn!(session = %name, "failed to configure status bar: {}", e);
        }
    }
}

/// Status bar for an instance: its name, then one tab per window flagged
/// with auto-approve.
pub fn status_bar(inst: &Instance) -> StatusBar {
    let mut windows = vec![(0, inst.auto_yes)];
    windows.extend(inst.followed_windows.iter().map(|w| (w.index, w.auto_yes)));
    StatusBar {
        left: format!("#[bold] {} #[nobold]", inst.name.replace('#', "##")),
        windows,
    }
}
