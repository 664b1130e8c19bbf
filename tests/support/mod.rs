#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use asmgr::tmux::{Multiplexer, MuxError, SessionSpec, StatusBar, WindowInfo};
use asmgr::{Config, SessionCore};

#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub index: u32,
    pub name: String,
    pub command: String,
    pub dead: bool,
    pub pane: String,
    /// Text and keys typed into the window, in order
    pub input: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub windows: Vec<FakeWindow>,
    pub status: Option<StatusBar>,
    pub detach_binding: Option<(u16, u16)>,
}

impl FakeSession {
    pub fn window(&self, index: u32) -> Option<&FakeWindow> {
        self.windows.iter().find(|w| w.index == index)
    }
}

#[derive(Debug, Default)]
struct State {
    sessions: BTreeMap<String, FakeSession>,
    calls: Vec<String>,
    failures: HashMap<&'static str, MuxError>,
    attached: Vec<(String, u32)>,
}

/// In-memory tmux. Clones share state, so a test keeps one handle while the
/// core owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeMux {
    state: Arc<Mutex<State>>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call and return the injected failure for `op`, if any.
    fn enter(&self, op: &'static str, target: &str) -> Result<(), MuxError> {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", op, target));
        match state.failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn fail(&self, op: &'static str, err: MuxError) {
        self.lock().failures.insert(op, err);
    }

    pub fn heal(&self, op: &'static str) {
        self.lock().failures.remove(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{} ", op);
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.lock().sessions.get(name).cloned()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.lock().sessions.keys().cloned().collect()
    }

    pub fn attached(&self) -> Vec<(String, u32)> {
        self.lock().attached.clone()
    }

    /// Create a session outside the manager, as another process would.
    pub fn add_session(&self, name: &str, command: &str) {
        self.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                windows: vec![FakeWindow {
                    index: 0,
                    name: "main".into(),
                    command: command.into(),
                    ..FakeWindow::default()
                }],
                ..FakeSession::default()
            },
        );
    }

    /// The user killed the session from a shell.
    pub fn drop_session(&self, name: &str) {
        self.lock().sessions.remove(name);
    }

    /// The user closed a window from inside tmux.
    pub fn drop_window(&self, name: &str, index: u32) {
        if let Some(session) = self.lock().sessions.get_mut(name) {
            session.windows.retain(|w| w.index != index);
        }
    }

    /// Remove every window while keeping the session listed.
    pub fn empty_session(&self, name: &str) {
        if let Some(session) = self.lock().sessions.get_mut(name) {
            session.windows.clear();
        }
    }

    /// The process in a window exited; `remain-on-exit` keeps the pane.
    pub fn kill_pane(&self, name: &str, index: u32) {
        let _ = self.with_window(name, index, |w| w.dead = true);
    }

    pub fn set_pane(&self, name: &str, index: u32, text: &str) {
        let _ = self.with_window(name, index, |w| w.pane = text.to_string());
    }

    fn with_window<T>(
        &self,
        name: &str,
        index: u32,
        f: impl FnOnce(&mut FakeWindow) -> T,
    ) -> Result<T, MuxError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| MuxError::Absent(name.to_string()))?;
        let window = session
            .windows
            .iter_mut()
            .find(|w| w.index == index)
            .ok_or_else(|| MuxError::Absent(format!("{}:{}", name, index)))?;
        Ok(f(window))
    }
}

fn window_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or("shell")
        .to_string()
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn ensure_session(&self, spec: &SessionSpec) -> Result<bool, MuxError> {
        self.enter("ensure_session", &spec.name)?;
        let mut state = self.lock();
        if state.sessions.contains_key(&spec.name) {
            return Ok(false);
        }
        state.sessions.insert(
            spec.name.clone(),
            FakeSession {
                cwd: spec.cwd.clone(),
                env: spec.env.clone(),
                windows: vec![FakeWindow {
                    index: 0,
                    name: window_name(&spec.command),
                    command: spec.command.clone(),
                    ..FakeWindow::default()
                }],
                status: None,
                detach_binding: None,
            },
        );
        Ok(true)
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.enter("kill_session", name)?;
        self.lock().sessions.remove(name);
        Ok(())
    }

    async fn session_exists(&self, name: &str) -> Result<bool, MuxError> {
        self.enter("session_exists", name)?;
        Ok(self.lock().sessions.contains_key(name))
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>, MuxError> {
        self.enter("list_sessions", prefix)?;
        Ok(self
            .lock()
            .sessions
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn list_windows(&self, name: &str) -> Result<Vec<WindowInfo>, MuxError> {
        self.enter("list_windows", name)?;
        let state = self.lock();
        let session = state
            .sessions
            .get(name)
            .ok_or_else(|| MuxError::Absent(name.to_string()))?;
        Ok(session
            .windows
            .iter()
            .map(|w| WindowInfo {
                index: w.index,
                name: w.name.clone(),
                active: false,
                dead: w.dead,
            })
            .collect())
    }

    async fn new_window(
        &self,
        name: &str,
        window_name: &str,
        _cwd: &Path,
        command: &str,
    ) -> Result<u32, MuxError> {
        self.enter("new_window", name)?;
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| MuxError::Absent(name.to_string()))?;
        let index = session.windows.iter().map(|w| w.index + 1).max().unwrap_or(0);
        session.windows.push(FakeWindow {
            index,
            name: window_name.to_string(),
            command: command.to_string(),
            ..FakeWindow::default()
        });
        Ok(index)
    }

    async fn respawn_window(
        &self,
        name: &str,
        index: u32,
        _cwd: &Path,
        command: &str,
    ) -> Result<(), MuxError> {
        self.enter("respawn_window", &format!("{}:{}", name, index))?;
        self.with_window(name, index, |w| {
            w.command = command.to_string();
            w.dead = false;
            w.pane.clear();
        })
    }

    async fn rename_window(&self, name: &str, index: u32, window_name: &str) -> Result<(), MuxError> {
        self.enter("rename_window", name)?;
        self.with_window(name, index, |w| w.name = window_name.to_string())
    }

    async fn close_window(&self, name: &str, index: u32) -> Result<(), MuxError> {
        self.enter("close_window", &format!("{}:{}", name, index))?;
        if index == 0 {
            return Err(MuxError::Io("refusing to close window 0".into()));
        }
        self.with_window(name, index, |_| ())?;
        self.drop_window(name, index);
        Ok(())
    }

    async fn capture_pane(&self, name: &str, index: u32, _lines: usize) -> Result<String, MuxError> {
        self.enter("capture_pane", &format!("{}:{}", name, index))?;
        self.with_window(name, index, |w| w.pane.clone())
    }

    async fn send_keys(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError> {
        self.enter("send_keys", name)?;
        self.with_window(name, index, |w| w.input.push(text.to_string()))
    }

    async fn send_key(&self, name: &str, index: u32, key: &str) -> Result<(), MuxError> {
        self.enter("send_key", name)?;
        self.with_window(name, index, |w| w.input.push(format!("<{}>", key)))
    }

    async fn send_prompt(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError> {
        self.enter("send_prompt", name)?;
        self.with_window(name, index, |w| {
            w.input.push(text.to_string());
            w.input.push("<Enter>".to_string());
        })
    }

    async fn resize_pane(&self, name: &str, _width: u16, _height: u16) -> Result<(), MuxError> {
        self.enter("resize_pane", name)
    }

    async fn bind_detach_resize(&self, name: &str, width: u16, height: u16) -> Result<(), MuxError> {
        self.enter("bind_detach_resize", name)?;
        if let Some(session) = self.lock().sessions.get_mut(name) {
            session.detach_binding = Some((width, height));
        }
        Ok(())
    }

    async fn configure_status(&self, name: &str, bar: &StatusBar) -> Result<(), MuxError> {
        self.enter("configure_status", name)?;
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| MuxError::Absent(name.to_string()))?;
        session.status = Some(bar.clone());
        Ok(())
    }

    fn attach(&self, name: &str, index: u32) -> Result<(), MuxError> {
        self.enter("attach", name)?;
        self.lock().attached.push((name.to_string(), index));
        Ok(())
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub mux: FakeMux,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            mux: FakeMux::new(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    /// Fake home directory searched for agent transcripts.
    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    pub fn config(&self) -> Config {
        Config {
            root: self.root(),
            ..Config::default()
        }
    }

    /// Open a core over the shared fake; every agent binary counts as installed.
    pub fn core(&self) -> SessionCore<FakeMux> {
        SessionCore::open(self.mux.clone(), self.config())
            .unwrap()
            .with_home(self.home())
            .with_binary_check(|_| true)
    }

    /// Write a Claude transcript for `cwd` with the given session token.
    pub fn claude_transcript(&self, cwd: &Path, token: &str, prompt: &str) {
        let dir = asmgr::agents::transcripts::transcripts_root(
            asmgr::agents::AgentKind::Claude,
            &self.home(),
            cwd,
        )
        .unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let line = serde_json::json!({
            "type": "user",
            "sessionId": token,
            "cwd": cwd,
            "message": { "content": prompt },
        });
        std::fs::write(dir.join(format!("{}.jsonl", token)), format!("{}\n", line)).unwrap();
    }
}
