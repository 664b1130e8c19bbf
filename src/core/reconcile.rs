use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::catalog::display_order;
use super::SessionCore;
use crate::domain::{instance_id_from_session, Status};
use crate::tmux::{MuxError, Multiplexer};
use crate::ticker::TickScope;

impl<M: Multiplexer> SessionCore<M> {
    /// Bring cached runtime state in line with tmux.
    ///
    /// One session listing per pass; then, for every instance in scope whose
    /// session is live, one window listing and one capture of the selected
    /// window. A failed listing leaves the cached state untouched.
    pub async fn tick(&mut self, scope: TickScope, selected: Option<&str>) {
        let live: HashSet<String> = match self.mux.list_sessions(&self.config.session_prefix).await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                debug!("session listing failed: {}", e);
                return;
            }
        };

        for idx in display_order(&self.instances, &self.groups) {
            let in_scope = match scope {
                TickScope::All => true,
                TickScope::Selected => selected == Some(self.instances[idx].id.as_str()),
            };
            if in_scope {
                self.reconcile_one(idx, &live).await;
            }
        }

        if scope == TickScope::All {
            self.collect_orphans(&live);
        }
    }

    async fn reconcile_one(&mut self, idx: usize, live: &HashSet<String>) {
        let name = self.session_name(&self.instances[idx]);
        if !live.contains(&name) {
            self.mark_stopped(idx);
            return;
        }

        let windows = match self.mux.list_windows(&name).await {
            Ok(windows) => windows,
            Err(MuxError::Absent(_)) => {
                self.mark_stopped(idx);
                return;
            }
            Err(e) => {
                debug!(session = %name, "window listing failed: {}", e);
                return;
            }
        };
        // Dead panes stay listed until Attach or Start respawns them
        if windows.is_empty() {
            self.mark_stopped(idx);
            return;
        }

        let inst = &mut self.instances[idx];
        if inst.runtime.status != Status::Running {
            info!(id = %inst.id, session = %name, "instance is running");
        }
        inst.runtime.status = Status::Running;

        let before = inst.followed_windows.len();
        inst.followed_windows
            .retain(|fw| windows.iter().any(|w| w.index == fw.index));
        let dropped = before - inst.followed_windows.len();

        if !windows.iter().any(|w| w.index == inst.runtime.selected_window) {
            inst.runtime.selected_window = 0;
        }
        let window = inst.runtime.selected_window;
        let kind = inst.window_agent(window);
        inst.runtime.windows = windows;

        if dropped > 0 {
            info!(session = %name, dropped, "forgetting closed windows");
            if let Err(e) = self.persist() {
                warn!("failed to save after dropping windows: {}", e);
            }
            self.refresh_status_bar(idx).await;
        }

        match self
            .mux
            .capture_pane(&name, window, self.config.capture_lines)
            .await
        {
            Ok(text) => {
                let class = self.classifier.classify(&text, kind);
                let runtime = &mut self.instances[idx].runtime;
                runtime.activity = class.activity;
                runtime.last_line = class.last_line;
                runtime.preview = text;
            }
            Err(e) => debug!(session = %name, window, "capture failed: {}", e),
        }
    }

    fn mark_stopped(&mut self, idx: usize) {
        let inst = &mut self.instances[idx];
        if inst.runtime.status == Status::Running {
            info!(id = %inst.id, "instance stopped outside the manager");
        }
        inst.runtime.clear();
        inst.runtime.status = Status::Stopped;
    }

    /// Record prefixed sessions that no instance of any project claims.
    fn collect_orphans(&mut self, live: &HashSet<String>) {
        let prefix = self.config.session_prefix.as_str();
        let known: HashSet<&str> = self.instances.iter().map(|i| i.id.as_str()).collect();
        let mut orphans: Vec<String> = live
            .iter()
            .filter(|name| {
                instance_id_from_session(prefix, name)
                    .is_some_and(|id| !known.contains(id) && !self.foreign_ids.contains(id))
            })
            .cloned()
            .collect();
        orphans.sort();
        if orphans != self.orphans {
            debug!(count = orphans.len(), "orphaned sessions changed");
        }
        self.orphans = orphans;
    }

    /// Refresh the ids owned by other projects, used to tell their sessions
    /// apart from orphans.
    pub(super) fn load_foreign_ids(&mut self) {
        let mut ids = HashSet::new();
        let mut projects: Vec<Option<String>> = vec![None];
        match self.store.load_catalog() {
            Ok(catalog) => projects.extend(catalog.projects.into_iter().map(|p| Some(p.id))),
            Err(e) => warn!("failed to read project catalog: {}", e),
        }
        for project in projects.into_iter().filter(|p| *p != self.project) {
            match self.store.load_instances(project.as_deref()) {
                Ok(instances) => ids.extend(instances.into_iter().map(|i| i.id)),
                Err(e) => warn!(project = ?project, "failed to read instances: {}", e),
            }
        }
        self.foreign_ids = ids;
    }
}
