mod client;
mod heuristics;

pub use client::TmuxClient;
pub use heuristics::{strip_ansi, Activity, ActivityClassifier, Classification};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single tmux operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// The target session or window does not exist.
    #[error("tmux target not found: {0}")]
    Absent(String),
    /// tmux could not be run, failed, or exceeded its deadline.
    #[error("tmux command failed: {0}")]
    Io(String),
}

impl MuxError {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent(_))
    }
}

/// A window inside a tmux session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub index: u32,
    pub name: String,
    pub active: bool,
    /// The window's pane has exited but is kept by `remain-on-exit`.
    pub dead: bool,
}

/// Everything needed to create a session whose window 0 runs an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: String,
    pub cwd: PathBuf,
    /// Shell command line for window 0; empty means the default shell.
    pub command: String,
    pub env: Vec<(String, String)>,
    pub width: u16,
    pub height: u16,
}

/// Status-bar content for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBar {
    pub left: String,
    /// `(window index, auto-approve on)` for every window in the session.
    pub windows: Vec<(u32, bool)>,
}

/// Operations the core needs from a terminal multiplexer.
///
/// Advisory operations (resize, bindings, status bar) may fail without
/// consequence; callers log and continue.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Create the session unless it exists. Returns `true` when created.
    async fn ensure_session(&self, spec: &SessionSpec) -> Result<bool, MuxError>;

    /// Kill the session; absent sessions are not an error.
    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    async fn session_exists(&self, name: &str) -> Result<bool, MuxError>;

    /// Names of all sessions starting with `prefix`.
    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>, MuxError>;

    async fn list_windows(&self, name: &str) -> Result<Vec<WindowInfo>, MuxError>;

    /// Append a window and return its index.
    async fn new_window(
        &self,
        name: &str,
        window_name: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<u32, MuxError>;

    /// Replace the process of a window in place, killing it if still alive.
    async fn respawn_window(
        &self,
        name: &str,
        index: u32,
        cwd: &Path,
        command: &str,
    ) -> Result<(), MuxError>;

    async fn rename_window(&self, name: &str, index: u32, window_name: &str)
        -> Result<(), MuxError>;

    /// Close a window other than window 0.
    async fn close_window(&self, name: &str, index: u32) -> Result<(), MuxError>;

    /// Last `lines` lines of the pane, escape sequences preserved.
    async fn capture_pane(&self, name: &str, index: u32, lines: usize)
        -> Result<String, MuxError>;

    /// Type text verbatim.
    async fn send_keys(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError>;

    /// Press a named key such as `C-y` or `Escape`.
    async fn send_key(&self, name: &str, index: u32, key: &str) -> Result<(), MuxError>;

    /// Type text then press Enter in one tmux invocation.
    async fn send_prompt(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError>;

    async fn resize_pane(&self, name: &str, width: u16, height: u16) -> Result<(), MuxError>;

    /// Rebind Ctrl-Q to shrink the session to the preview geometry and detach.
    async fn bind_detach_resize(&self, name: &str, width: u16, height: u16)
        -> Result<(), MuxError>;

    async fn configure_status(&self, name: &str, bar: &StatusBar) -> Result<(), MuxError>;

    /// Hand the terminal to tmux until the user detaches. Blocks the caller.
    fn attach(&self, name: &str, index: u32) -> Result<(), MuxError>;
}
