//! Effectful operations. tmux is driven first; the store is written only
//! once tmux succeeded, and tmux work is undone when the write fails.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::SessionCore;
use crate::agents::{transcripts, AgentKind, ResumeCandidate};
use crate::domain::{FollowedWindow, Instance, Status};
use crate::error::CoreError;
use crate::tmux::{Activity, MuxError, Multiplexer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub path: PathBuf,
    pub agent: AgentKind,
    pub custom_command: Option<String>,
    pub group_id: Option<String>,
    pub auto_yes: bool,
    /// Start directly into this conversation, skipping discovery.
    pub resume_token: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, agent: AgentKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            agent,
            custom_command: None,
            group_id: None,
            auto_yes: false,
            resume_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Started(String),
    /// The instance is saved but stopped until the user picks a prior
    /// conversation or starts fresh.
    NeedsResumeChoice {
        instance_id: String,
        candidates: Vec<ResumeCandidate>,
    },
}

/// Session and window to hand the terminal to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTarget {
    pub session: String,
    pub window: u32,
}

impl<M: Multiplexer> SessionCore<M> {
    pub async fn create(&mut self, req: CreateRequest) -> Result<CreateOutcome, CoreError> {
        self.check_binary(req.agent, req.custom_command.as_deref())?;
        if let Some(gid) = req.group_id.as_deref() {
            if !self.groups.iter().any(|g| g.id == gid) {
                return Err(CoreError::UnknownGroup(gid.to_string()));
            }
        }

        let name = req.name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("instance name cannot be empty"));
        }
        let mut inst = Instance::new(name, req.path, req.agent);
        inst.custom_command = req.custom_command.filter(|c| !c.trim().is_empty());
        inst.group_id = req.group_id;
        inst.auto_yes = req.auto_yes && req.agent.profile().supports_auto_approve();
        // Rejects an empty custom command before anything is stored
        self.window_command(&inst, 0)?;

        let profile = req.agent.profile();
        match req.resume_token.filter(|t| !t.is_empty()) {
            Some(token) if profile.supports_resume() => inst.resume_session_id = token,
            Some(_) => return Err(CoreError::invariant(format!("{} cannot resume", profile.label))),
            None if profile.supports_resume() => {
                let candidates = self.discover_candidates(req.agent, inst.path.clone()).await;
                if !candidates.is_empty() {
                    let instance_id = inst.id.clone();
                    self.instances.push(inst);
                    if let Err(e) = self.persist() {
                        self.instances.pop();
                        return Err(e);
                    }
                    info!(id = %instance_id, count = candidates.len(), "offering resume candidates");
                    return Ok(CreateOutcome::NeedsResumeChoice {
                        instance_id,
                        candidates,
                    });
                }
            }
            None => {}
        }

        let id = inst.id.clone();
        self.instances.push(inst);
        if let Err(e) = self.start(&id).await {
            self.instances.retain(|i| i.id != id);
            return Err(e);
        }
        Ok(CreateOutcome::Started(id))
    }

    /// Prior conversations recorded by the agent for `cwd`, newest first.
    pub async fn discover_candidates(&self, kind: AgentKind, cwd: PathBuf) -> Vec<ResumeCandidate> {
        let home = self.home.clone();
        match tokio::task::spawn_blocking(move || transcripts::discover(kind, &home, &cwd)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("transcript scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Ensure the instance's session exists with a live window 0.
    pub async fn start(&mut self, id: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let inst = &self.instances[idx];
        self.check_binary(inst.agent, inst.custom_command.as_deref())?;
        let spec = self.session_spec(inst)?;

        let created = self.mux.ensure_session(&spec).await?;
        if !created {
            self.respawn_if_dead(idx, 0).await?;
        }

        let previous = self.instances[idx].runtime.status;
        self.instances[idx].runtime.status = Status::Running;
        if let Err(e) = self.persist() {
            self.instances[idx].runtime.status = previous;
            if created {
                self.undo_session(&spec.name).await;
            }
            return Err(e);
        }

        self.refresh_status_bar(idx).await;
        info!(id, session = %spec.name, created, "instance started");
        Ok(())
    }

    /// Start window 0 into a prior conversation, respawning it in place when
    /// the session is already up.
    pub async fn start_with_resume(&mut self, id: &str, token: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let kind = self.instances[idx].agent;
        if !kind.profile().supports_resume() {
            return Err(CoreError::invariant(format!("{} cannot resume", kind.label())));
        }
        self.check_binary(kind, None)?;

        let name = self.session_name(&self.instances[idx]);
        let previous = std::mem::replace(&mut self.instances[idx].resume_session_id, token.to_string());
        let result = self.launch_window_zero(idx, &name).await;
        let created = match result {
            Ok(created) => created,
            Err(e) => {
                self.instances[idx].resume_session_id = previous;
                return Err(e);
            }
        };

        self.instances[idx].runtime.status = Status::Running;
        if let Err(e) = self.persist() {
            self.instances[idx].resume_session_id = previous;
            if created {
                self.undo_session(&name).await;
                self.instances[idx].runtime.clear();
            } else {
                self.undo_respawn(idx, &name, 0).await;
            }
            return Err(e);
        }

        self.refresh_status_bar(idx).await;
        info!(id, token, "instance resumed");
        Ok(())
    }

    /// Returns true when a new session was created.
    async fn launch_window_zero(&self, idx: usize, name: &str) -> Result<bool, CoreError> {
        let inst = &self.instances[idx];
        if self.mux.session_exists(name).await? {
            let command = self.window_command(inst, 0)?;
            self.mux
                .respawn_window(name, 0, &command.cwd, &command.shell_line())
                .await?;
            Ok(false)
        } else {
            let spec = self.session_spec(inst)?;
            Ok(self.mux.ensure_session(&spec).await?)
        }
    }

    /// Kill a session created by an operation whose save failed.
    async fn undo_session(&self, name: &str) {
        if let Err(e) = self.mux.kill_session(name).await {
            warn!(session = %name, "failed to kill session after a failed save: {}", e);
        }
    }

    /// Relaunch a window with the command the model holds again after a
    /// failed save.
    async fn undo_respawn(&self, idx: usize, session: &str, window: u32) {
        let result = match self.window_command(&self.instances[idx], window) {
            Ok(command) => self
                .mux
                .respawn_window(session, window, &command.cwd, &command.shell_line())
                .await
                .map_err(CoreError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(session = %session, window, "failed to restore window after a failed save: {}", e);
        }
    }

    async fn respawn_if_dead(&self, idx: usize, window: u32) -> Result<(), CoreError> {
        let inst = &self.instances[idx];
        let name = self.session_name(inst);
        let windows = self.mux.list_windows(&name).await?;
        if windows.iter().any(|w| w.index == window && w.dead) {
            let command = self.window_command(inst, window)?;
            self.mux
                .respawn_window(&name, window, &command.cwd, &command.shell_line())
                .await?;
            debug!(session = %name, window, "respawned dead window");
        }
        Ok(())
    }

    pub async fn stop(&mut self, id: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let name = self.session_name(&self.instances[idx]);
        self.mux.kill_session(&name).await?;
        let runtime = &mut self.instances[idx].runtime;
        runtime.clear();
        runtime.status = Status::Stopped;
        info!(id, session = %name, "instance stopped");
        Ok(())
    }

    /// Get the instance ready for an interactive attach: start it if needed,
    /// revive the selected window, bind Ctrl-Q and refresh the status bar.
    pub async fn prepare_attach(&mut self, id: &str) -> Result<AttachTarget, CoreError> {
        let idx = self.index_of(id)?;
        let name = self.session_name(&self.instances[idx]);
        if !self.mux.session_exists(&name).await? {
            self.start(id).await?;
        }

        let windows = self.mux.list_windows(&name).await?;
        let mut window = self.instances[idx].runtime.selected_window;
        if !windows.iter().any(|w| w.index == window) {
            window = 0;
            self.instances[idx].runtime.selected_window = 0;
        }
        if windows.iter().any(|w| w.index == window && w.dead) {
            let command = self.window_command(&self.instances[idx], window)?;
            self.mux
                .respawn_window(&name, window, &command.cwd, &command.shell_line())
                .await?;
        }

        let (width, height) = self.preview_size;
        if let Err(e) = self.mux.bind_detach_resize(&name, width, height).await {
            warn!(session = %name, "failed to bind detach key: {}", e);
        }
        self.refresh_status_bar(idx).await;

        Ok(AttachTarget {
            session: name,
            window,
        })
    }

    /// Hand the terminal over. Blocks until the user detaches.
    pub fn attach(&self, target: &AttachTarget) -> Result<(), CoreError> {
        self.mux.attach(&target.session, target.window)?;
        Ok(())
    }

    /// Shrink the session back to the preview geometry after a detach.
    pub async fn after_detach(&self, target: &AttachTarget) {
        let (width, height) = self.preview_size;
        if let Err(e) = self.mux.resize_pane(&target.session, width, height).await {
            debug!(session = %target.session, "resize after detach failed: {}", e);
        }
    }

    /// Kill the session and forget the instance.
    pub async fn delete(&mut self, id: &str) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let name = self.session_name(&self.instances[idx]);
        self.mux.kill_session(&name).await?;

        let removed = self.instances.remove(idx);
        if let Err(e) = self.persist() {
            self.instances.insert(idx, removed);
            self.instances[idx].runtime.clear();
            return Err(e);
        }
        if self.settings.marked_session_id.as_deref() == Some(id) {
            self.settings.marked_session_id = None;
            if let Err(e) = self.store.save_settings(self.project.as_deref(), &self.settings) {
                warn!("failed to clear marked session: {}", e);
            }
        }
        info!(id, name = %removed.name, "instance deleted");
        Ok(())
    }

    /// Duplicate an instance right after the original and start the copy.
    pub async fn parallel_start(&mut self, id: &str) -> Result<String, CoreError> {
        let idx = self.index_of(id)?;
        let copy = self.instances[idx].duplicate();
        let copy_id = copy.id.clone();
        self.instances.insert(idx + 1, copy);
        if let Err(e) = self.start(&copy_id).await {
            self.instances.remove(idx + 1);
            return Err(e);
        }
        Ok(copy_id)
    }

    /// Open a new tracked window running `agent`. Returns its index.
    pub async fn new_tab(
        &mut self,
        id: &str,
        name: &str,
        agent: AgentKind,
        custom_command: Option<String>,
    ) -> Result<u32, CoreError> {
        self.check_binary(agent, custom_command.as_deref())?;
        let window = FollowedWindow {
            index: 0,
            name: tab_name(name, agent),
            agent,
            custom_command,
            resume_session_id: String::new(),
            auto_yes: false,
            notes: None,
        };
        self.open_tab(id, window).await
    }

    /// Open a new window running the instance's own agent resumed into `token`.
    pub async fn new_forked_tab(&mut self, id: &str, name: &str, token: &str) -> Result<u32, CoreError> {
        let idx = self.index_of(id)?;
        let inst = &self.instances[idx];
        if !inst.agent.profile().supports_resume() {
            return Err(CoreError::invariant(format!("{} cannot resume", inst.agent.label())));
        }
        self.check_binary(inst.agent, inst.custom_command.as_deref())?;
        let window = FollowedWindow {
            index: 0,
            name: tab_name(name, inst.agent),
            agent: inst.agent,
            custom_command: inst.custom_command.clone(),
            resume_session_id: token.to_string(),
            auto_yes: inst.auto_yes,
            notes: None,
        };
        self.open_tab(id, window).await
    }

    async fn open_tab(&mut self, id: &str, mut window: FollowedWindow) -> Result<u32, CoreError> {
        let idx = self.index_of(id)?;
        let session = self.session_name(&self.instances[idx]);
        if !self.mux.session_exists(&session).await? {
            return Err(CoreError::NotRunning(self.instances[idx].name.clone()));
        }

        let command = window.agent.profile().build_command(
            window.custom_command.as_deref(),
            window.auto_yes,
            &window.resume_session_id,
            &self.instances[idx].path,
        )?;
        let index = self
            .mux
            .new_window(&session, &window.name, &command.cwd, &command.shell_line())
            .await?;
        if index == 0 {
            return Err(CoreError::invariant("tmux reused window 0 for a new tab"));
        }

        window.index = index;
        self.instances[idx].followed_windows.push(window);
        if let Err(e) = self.persist() {
            self.instances[idx].followed_windows.pop();
            if let Err(undo) = self.mux.close_window(&session, index).await {
                warn!(session = %session, index, "failed to close tab after a failed save: {}", undo);
            }
            return Err(e);
        }

        self.instances[idx].runtime.selected_window = index;
        self.refresh_status_bar(idx).await;
        info!(id, session = %session, index, "opened tab");
        Ok(index)
    }

    /// Close a tracked window. Window 0 cannot be closed.
    pub async fn close_tab(&mut self, id: &str, index: u32) -> Result<(), CoreError> {
        if index == 0 {
            return Err(CoreError::invariant("window 0 cannot be closed; stop the instance"));
        }
        let idx = self.index_of(id)?;
        let session = self.session_name(&self.instances[idx]);
        match self.mux.close_window(&session, index).await {
            Ok(()) => {}
            Err(MuxError::Absent(_)) => debug!(session = %session, index, "window already gone"),
            Err(e) => return Err(e.into()),
        }

        let inst = &mut self.instances[idx];
        inst.followed_windows.retain(|w| w.index != index);
        inst.runtime.windows.retain(|w| w.index != index);
        if inst.runtime.selected_window == index {
            inst.runtime.selected_window = 0;
        }
        self.persist()?;
        self.refresh_status_bar(idx).await;
        Ok(())
    }

    /// Choose the window previewed and attached for an instance.
    pub fn select_window(&mut self, id: &str, index: u32) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let inst = &mut self.instances[idx];
        if index != 0 && inst.followed(index).is_none() {
            return Err(CoreError::invariant(format!("window {} is not tracked", index)));
        }
        if inst.runtime.selected_window != index {
            inst.runtime.selected_window = index;
            inst.runtime.preview.clear();
            inst.runtime.last_line.clear();
            inst.runtime.activity = Activity::Idle;
        }
        Ok(())
    }

    pub async fn rename_tab(&mut self, id: &str, index: u32, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("tab name cannot be empty"));
        }
        let idx = self.index_of(id)?;
        let session = self.session_name(&self.instances[idx]);
        let window = self.instances[idx]
            .followed_mut(index)
            .ok_or_else(|| CoreError::invariant(format!("window {} is not tracked", index)))?;
        let previous = std::mem::replace(&mut window.name, name.to_string());
        if let Err(e) = self.persist() {
            if let Some(window) = self.instances[idx].followed_mut(index) {
                window.name = previous;
            }
            return Err(e);
        }
        if self.instances[idx].is_running() {
            if let Err(e) = self.mux.rename_window(&session, index, name).await {
                warn!(session = %session, index, "failed to rename window: {}", e);
            }
        }
        Ok(())
    }

    /// Flip auto-approve for one window. A running agent with an in-band
    /// toggle gets the key; other running agents are respawned with the new
    /// flags. Returns the new flag.
    pub async fn toggle_auto_approve(&mut self, id: &str, window: u32) -> Result<bool, CoreError> {
        let idx = self.index_of(id)?;
        let kind = self.instances[idx].window_agent(window);
        let profile = kind.profile();
        if !profile.supports_auto_approve() {
            return Err(CoreError::invariant(format!("{} has no auto-approve mode", profile.label)));
        }
        if window != 0 && self.instances[idx].followed(window).is_none() {
            return Err(CoreError::invariant(format!("window {} is not tracked", window)));
        }

        let enabled = !self.instances[idx].window_auto_yes(window);
        set_window_auto_yes(&mut self.instances[idx], window, enabled);

        let session = self.session_name(&self.instances[idx]);
        let running = match self.mux.session_exists(&session).await {
            Ok(running) => running,
            Err(e) => {
                set_window_auto_yes(&mut self.instances[idx], window, !enabled);
                return Err(e.into());
            }
        };
        if running {
            if let Err(e) = self.apply_auto_approve(idx, &session, window).await {
                set_window_auto_yes(&mut self.instances[idx], window, !enabled);
                return Err(e);
            }
        }

        if let Err(e) = self.persist() {
            set_window_auto_yes(&mut self.instances[idx], window, !enabled);
            if running {
                if let Err(undo) = self.apply_auto_approve(idx, &session, window).await {
                    warn!(session = %session, window, "failed to revert auto-approve: {}", undo);
                }
            }
            return Err(e);
        }
        if running {
            self.refresh_status_bar(idx).await;
        }
        info!(id, window, enabled, "auto-approve toggled");
        Ok(enabled)
    }

    async fn apply_auto_approve(&self, idx: usize, session: &str, window: u32) -> Result<(), CoreError> {
        let inst = &self.instances[idx];
        match inst.window_agent(window).profile().in_band_toggle() {
            Some(key) => self.mux.send_key(session, window, key).await?,
            None => {
                let command = self.window_command(inst, window)?;
                self.mux
                    .respawn_window(session, window, &command.cwd, &command.shell_line())
                    .await?;
            }
        }
        Ok(())
    }

    /// Point a window at a prior conversation. Window 0 goes through
    /// [`Self::start_with_resume`]; other windows are respawned in place and
    /// their preview is cleared until the next tick recaptures it.
    pub async fn resume_window(&mut self, id: &str, window: u32, token: &str) -> Result<(), CoreError> {
        if window == 0 {
            return self.start_with_resume(id, token).await;
        }
        let idx = self.index_of(id)?;
        let tracked = self.instances[idx]
            .followed(window)
            .ok_or_else(|| CoreError::invariant(format!("window {} is not tracked", window)))?;
        let kind = tracked.agent;
        if !kind.profile().supports_resume() {
            return Err(CoreError::invariant(format!("{} cannot resume", kind.label())));
        }

        let previous = match self.instances[idx].followed_mut(window) {
            Some(w) => std::mem::replace(&mut w.resume_session_id, token.to_string()),
            None => String::new(),
        };
        let revert = |inst: &mut Instance| {
            if let Some(w) = inst.followed_mut(window) {
                w.resume_session_id = previous.clone();
            }
        };

        let session = self.session_name(&self.instances[idx]);
        if self.instances[idx].is_running() {
            let respawn = match self.window_command(&self.instances[idx], window) {
                Ok(command) => self
                    .mux
                    .respawn_window(&session, window, &command.cwd, &command.shell_line())
                    .await
                    .map_err(CoreError::from),
                Err(e) => Err(e),
            };
            if let Err(e) = respawn {
                revert(&mut self.instances[idx]);
                return Err(e);
            }
        }

        if let Err(e) = self.persist() {
            revert(&mut self.instances[idx]);
            if self.instances[idx].is_running() {
                self.undo_respawn(idx, &session, window).await;
            }
            return Err(e);
        }

        let runtime = &mut self.instances[idx].runtime;
        if runtime.selected_window == window {
            runtime.preview.clear();
            runtime.last_line.clear();
            runtime.activity = Activity::Idle;
        }
        info!(id, window, token, "window resumed");
        Ok(())
    }

    /// Type a prompt into the selected window and submit it.
    pub async fn send_prompt(&self, id: &str, text: &str) -> Result<(), CoreError> {
        let (session, window) = self.running_target(id)?;
        self.mux.send_prompt(&session, window, text).await?;
        Ok(())
    }

    /// Type text into the selected window without submitting.
    pub async fn send_keys(&self, id: &str, text: &str) -> Result<(), CoreError> {
        let (session, window) = self.running_target(id)?;
        self.mux.send_keys(&session, window, text).await?;
        Ok(())
    }

    fn running_target(&self, id: &str) -> Result<(String, u32), CoreError> {
        let inst = &self.instances[self.index_of(id)?];
        if !inst.is_running() {
            return Err(CoreError::NotRunning(inst.name.clone()));
        }
        Ok((self.session_name(inst), inst.runtime.selected_window))
    }
}

fn set_window_auto_yes(inst: &mut Instance, window: u32, enabled: bool) {
    if window == 0 {
        inst.auto_yes = enabled;
    } else if let Some(w) = inst.followed_mut(window) {
        w.auto_yes = enabled;
    }
}

fn tab_name(name: &str, agent: AgentKind) -> String {
    let name = name.trim();
    if name.is_empty() {
        agent.label().to_lowercase()
    } else {
        name.to_string()
    }
}
