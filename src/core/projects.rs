use tracing::{info, warn};

use super::SessionCore;
use crate::domain::{canonical_session_name, Project, ProjectCatalog};
use crate::error::CoreError;
use crate::store::StoreError;
use crate::tmux::Multiplexer;

impl<M: Multiplexer> SessionCore<M> {
    /// Active project id; `None` is the default project.
    pub fn active_project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn projects(&self) -> Result<ProjectCatalog, CoreError> {
        Ok(self.store.load_catalog()?)
    }

    pub fn add_project(&mut self, name: &str) -> Result<Project, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("project name cannot be empty"));
        }
        Ok(self.store.add_project(name)?)
    }

    pub fn rename_project(&mut self, id: &str, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("project name cannot be empty"));
        }
        Ok(self.store.rename_project(id, name)?)
    }

    /// Delete a project that is not active, not locked by another manager
    /// and has no live sessions.
    pub async fn remove_project(&mut self, id: &str) -> Result<(), CoreError> {
        if self.project.as_deref() == Some(id) {
            return Err(CoreError::invariant("cannot remove the active project"));
        }
        self.ensure_project(id)?;
        let lock = self.store.lock_project(Some(id))?;
        for inst in self.store.load_instances(Some(id))? {
            let name = canonical_session_name(&self.config.session_prefix, &inst.id);
            if self.mux.session_exists(&name).await? {
                return Err(CoreError::invariant(format!(
                    "project still has a running session: {}",
                    inst.name
                )));
            }
        }
        self.store.remove_project(id)?;
        // The directory is gone along with the lock file
        if let Err(e) = lock.release() {
            warn!(id, "failed to release lock of removed project: {}", e);
        }
        self.load_foreign_ids();
        info!(id, "removed project");
        Ok(())
    }

    /// Release the current project's lock and enter `target`. If the new
    /// lock cannot be taken the previous project is re-entered.
    pub fn switch_project(&mut self, target: Option<&str>) -> Result<(), CoreError> {
        if self.project.as_deref() == target {
            return Ok(());
        }
        if let Some(id) = target {
            self.ensure_project(id)?;
        }

        self.store
            .save_settings(self.project.as_deref(), &self.settings)?;
        if let Some(lock) = self.lock.take() {
            lock.release()?;
        }

        let entered = self
            .store
            .lock_project(target)
            .map_err(CoreError::from)
            .and_then(|lock| match self.store.load_all(target) {
                Ok(state) => Ok((lock, state)),
                Err(e) => Err(e.into()),
            });
        let (lock, state) = match entered {
            Ok(entered) => entered,
            Err(e) => {
                match self.store.lock_project(self.project.as_deref()) {
                    Ok(lock) => self.lock = Some(lock),
                    Err(relock) => warn!("failed to re-lock previous project: {}", relock),
                }
                return Err(e);
            }
        };

        if let Err(e) = self.store.set_active(target) {
            warn!("failed to record active project: {}", e);
        }
        self.lock = Some(lock);
        self.project = target.map(ToOwned::to_owned);
        self.instances = state.instances;
        self.groups = state.groups;
        self.settings = state.settings;
        self.orphans.clear();
        self.load_foreign_ids();
        info!(project = ?self.project, instances = self.instances.len(), "switched project");
        Ok(())
    }

    /// Move the default project's sessions into `id`, reloading the model
    /// if either side is the one on screen.
    pub fn import_default_into(&mut self, id: &str) -> Result<usize, CoreError> {
        self.ensure_project(id)?;
        // Both sides are rewritten; lock whichever one is not ours already
        let mut borrowed = Vec::new();
        for side in [Some(id), None] {
            if self.project.as_deref() != side {
                borrowed.push(self.store.lock_project(side)?);
            }
        }
        let moved = self.store.import_default_into(id);
        for lock in borrowed {
            if let Err(e) = lock.release() {
                warn!("failed to release borrowed project lock: {}", e);
            }
        }
        let moved = moved?;
        let active = self.project.as_deref();
        if moved > 0 && (active.is_none() || active == Some(id)) {
            let state = self.store.load_all(active)?;
            self.instances = state.instances;
            self.groups = state.groups;
        }
        self.load_foreign_ids();
        Ok(moved)
    }

    fn ensure_project(&self, id: &str) -> Result<(), CoreError> {
        match self.store.load_catalog()?.get(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownProject(id.to_string()).into()),
        }
    }
}
