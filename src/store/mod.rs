//! On-disk state: a project catalog plus one directory per project holding
//! sessions, groups, UI settings and the project lock.
//!
//! Every write goes to a temp file that is synced and renamed over the
//! target, so readers only ever see a complete file.

mod lock;

pub use lock::{holder as lock_holder, pid_alive, ProjectLock};

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Group, Instance, Project, ProjectCatalog, Settings};

pub const DEFAULT_PROJECT_DIR: &str = "default";
const PROJECTS_FILE: &str = "projects.json";
const SESSIONS_FILE: &str = "sessions.json";
const GROUPS_FILE: &str = "groups.json";
const SETTINGS_FILE: &str = "settings.json";
const LOCK_FILE: &str = "project.lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("project lock held by process {0}")]
    LockHeld(u32),
    #[error("no such project: {0}")]
    UnknownProject(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Everything persisted for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectState {
    pub instances: Vec<Instance>,
    pub groups: Vec<Group>,
    pub settings: Settings,
}

/// File-backed store rooted at the per-user config directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a project; `None` is the implicit default project.
    pub fn project_dir(&self, project: Option<&str>) -> PathBuf {
        self.root.join(project.unwrap_or(DEFAULT_PROJECT_DIR))
    }

    pub fn lock_path(&self, project: Option<&str>) -> PathBuf {
        self.project_dir(project).join(LOCK_FILE)
    }

    pub fn load_catalog(&self) -> Result<ProjectCatalog> {
        read_json(&self.root.join(PROJECTS_FILE))
    }

    pub fn save_catalog(&self, catalog: &ProjectCatalog) -> Result<()> {
        write_json_atomic(&self.root.join(PROJECTS_FILE), catalog)
    }

    pub fn load_all(&self, project: Option<&str>) -> Result<ProjectState> {
        let dir = self.project_dir(project);
        let mut instances: Vec<Instance> = read_json(&dir.join(SESSIONS_FILE))?;
        for inst in &mut instances {
            inst.normalize();
        }
        let groups = read_json(&dir.join(GROUPS_FILE))?;
        let settings = read_json(&dir.join(SETTINGS_FILE))?;
        debug!(project = ?project, instances = instances.len(), "loaded project state");
        Ok(ProjectState {
            instances,
            groups,
            settings,
        })
    }

    pub fn load_instances(&self, project: Option<&str>) -> Result<Vec<Instance>> {
        Ok(self.load_all(project)?.instances)
    }

    /// Persist instances and groups of a project.
    pub fn save(&self, project: Option<&str>, instances: &[Instance], groups: &[Group]) -> Result<()> {
        let dir = self.project_dir(project);
        let normalized: Vec<Instance> = instances
            .iter()
            .cloned()
            .map(|mut inst| {
                inst.normalize();
                inst
            })
            .collect();
        write_json_atomic(&dir.join(SESSIONS_FILE), &normalized)?;
        write_json_atomic(&dir.join(GROUPS_FILE), &groups)
    }

    pub fn save_settings(&self, project: Option<&str>, settings: &Settings) -> Result<()> {
        write_json_atomic(&self.project_dir(project).join(SETTINGS_FILE), settings)
    }

    pub fn add_project(&self, name: &str) -> Result<Project> {
        let mut catalog = self.load_catalog()?;
        let project = Project::new(name);
        fs::create_dir_all(self.project_dir(Some(&project.id)))
            .map_err(|e| StoreError::io(&self.project_dir(Some(&project.id)), e))?;
        catalog.projects.push(project.clone());
        self.save_catalog(&catalog)?;
        info!(id = %project.id, name, "added project");
        Ok(project)
    }

    pub fn rename_project(&self, id: &str, name: &str) -> Result<()> {
        let mut catalog = self.load_catalog()?;
        let project = catalog
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::UnknownProject(id.to_string()))?;
        project.name = name.to_string();
        self.save_catalog(&catalog)
    }

    /// Drop a project from the catalog and delete its directory. Callers
    /// must ensure none of its sessions are running.
    pub fn remove_project(&self, id: &str) -> Result<()> {
        let mut catalog = self.load_catalog()?;
        let before = catalog.projects.len();
        catalog.projects.retain(|p| p.id != id);
        if catalog.projects.len() == before {
            return Err(StoreError::UnknownProject(id.to_string()));
        }
        if catalog.active_id.as_deref() == Some(id) {
            catalog.active_id = None;
        }
        self.save_catalog(&catalog)?;

        let dir = self.project_dir(Some(id));
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    pub fn set_active(&self, id: Option<&str>) -> Result<()> {
        let mut catalog = self.load_catalog()?;
        if let Some(id) = id {
            if catalog.get(id).is_none() {
                return Err(StoreError::UnknownProject(id.to_string()));
            }
        }
        catalog.active_id = id.map(ToOwned::to_owned);
        self.save_catalog(&catalog)
    }

    /// Move every session and group of the default project into `id`.
    /// The target is written before the default is cleared, so a crash in
    /// between duplicates rather than loses records.
    pub fn import_default_into(&self, id: &str) -> Result<usize> {
        if self.load_catalog()?.get(id).is_none() {
            return Err(StoreError::UnknownProject(id.to_string()));
        }
        let source = self.load_all(None)?;
        if source.instances.is_empty() && source.groups.is_empty() {
            return Ok(0);
        }
        let mut target = self.load_all(Some(id))?;
        let moved = source.instances.len();
        target.instances.extend(source.instances);
        target.groups.extend(source.groups);
        self.save(Some(id), &target.instances, &target.groups)?;
        self.save(None, &[], &[])?;
        info!(id, moved, "imported default sessions into project");
        Ok(moved)
    }

    /// Apply `f` to one persisted instance. Returns `false` if absent.
    pub fn update_instance(
        &self,
        project: Option<&str>,
        id: &str,
        f: impl FnOnce(&mut Instance),
    ) -> Result<bool> {
        let mut state = self.load_all(project)?;
        let Some(inst) = state.instances.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        f(inst);
        self.save(project, &state.instances, &state.groups)?;
        Ok(true)
    }

    pub fn add_group(&self, project: Option<&str>, name: &str) -> Result<Group> {
        let mut state = self.load_all(project)?;
        let group = Group::new(name);
        state.groups.push(group.clone());
        self.save(project, &state.instances, &state.groups)?;
        Ok(group)
    }

    /// Flip a group's collapsed flag, returning the new value.
    pub fn toggle_group_collapsed(&self, project: Option<&str>, group_id: &str) -> Result<Option<bool>> {
        let mut state = self.load_all(project)?;
        let Some(group) = state.groups.iter_mut().find(|g| g.id == group_id) else {
            return Ok(None);
        };
        group.collapsed = !group.collapsed;
        let collapsed = group.collapsed;
        self.save(project, &state.instances, &state.groups)?;
        Ok(Some(collapsed))
    }

    pub fn lock_project(&self, project: Option<&str>) -> Result<ProjectLock> {
        ProjectLock::acquire(self.lock_path(project))
    }
}

/// Read JSON, treating a missing or empty file as the default value.
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).map_err(|e| StoreError::json(path, e))
}

/// Write JSON via temp file + fsync + rename.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut content = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    content.push(b'\n');

    let temp_path = path.with_extension("json.tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| StoreError::io(&temp_path, e))?;
    temp_file
        .write_all(&content)
        .and_then(|_| temp_file.sync_all())
        .map_err(|e| StoreError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))?;

    // Make the rename itself durable
    #[cfg(unix)]
    {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
