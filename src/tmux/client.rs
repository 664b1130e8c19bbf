use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{MuxError, Multiplexer, SessionSpec, StatusBar, WindowInfo};

/// tmux user option marking windows that run with auto-approve.
const AUTO_YES_OPTION: &str = "@asmgr_yes";

const WINDOW_HOOKS: [&str; 3] = ["after-new-window", "window-unlinked", "pane-died"];

/// Client for interacting with tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    /// Deadline for every non-interactive tmux call
    timeout: Duration,
    /// Executable re-invoked by tmux hooks (`<exe> refresh-status <session>`)
    hook_exe: Option<PathBuf>,
    /// State root passed to the hook so it reads the same store
    hook_root: Option<PathBuf>,
}

impl TmuxClient {
    pub fn new(tmux_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tmux_path: tmux_path.into(),
            timeout,
            hook_exe: std::env::current_exe().ok(),
            hook_root: None,
        }
    }

    pub fn with_hook_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.hook_root = Some(root.into());
        self
    }

    /// Check if tmux server is running
    pub async fn is_server_running(&self) -> bool {
        let status = Command::new(&self.tmux_path)
            .arg("list-sessions")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        matches!(
            tokio::time::timeout(self.timeout, status).await,
            Ok(Ok(s)) if s.success()
        )
    }

    /// Run tmux with a deadline and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        debug!(?args, "tmux");
        let output = Command::new(&self.tmux_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(MuxError::Io(format!("failed to execute tmux: {}", e))),
            Err(_) => {
                return Err(MuxError::Io(format!(
                    "tmux {} timed out after {:?}",
                    args.first().copied().unwrap_or_default(),
                    self.timeout
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(args, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an advisory command: failures are logged and swallowed.
    async fn run_advisory(&self, args: &[&str]) {
        if let Err(e) = self.run(args).await {
            warn!(?args, "advisory tmux command failed: {}", e);
        }
    }

    fn hook_command(&self) -> Option<String> {
        let exe = self.hook_exe.as_ref()?;
        let root = self
            .hook_root
            .as_ref()
            .map(|root| format!(" --root \"{}\"", root.display()))
            .unwrap_or_default();
        Some(format!(
            "run-shell -b '\"{}\"{} refresh-status #{{session_name}}'",
            exe.display(),
            root
        ))
    }

    async fn install_session_options(&self, name: &str) {
        let session = session_target(name);
        let window0 = window_target(name, 0);

        self.run_advisory(&["set-option", "-t", &session, "window-size", "largest"])
            .await;
        self.run_advisory(&["set-option", "-w", "-t", &window0, "aggressive-resize", "on"])
            .await;
        self.run_advisory(&["set-option", "-s", "focus-events", "on"])
            .await;

        if let Some(hook) = self.hook_command() {
            for hook_name in WINDOW_HOOKS {
                self.run_advisory(&["set-hook", "-t", &session, hook_name, &hook])
                    .await;
            }
        }

        self.run_advisory(&["bind-key", "-n", "C-q", "detach-client"])
            .await;
    }

    async fn keep_dead_panes(&self, name: &str, index: u32) {
        let target = window_target(name, index);
        self.run_advisory(&["set-option", "-w", "-t", &target, "remain-on-exit", "on"])
            .await;
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new("tmux", Duration::from_secs(3))
    }
}

#[async_trait]
impl Multiplexer for TmuxClient {
    async fn ensure_session(&self, spec: &SessionSpec) -> Result<bool, MuxError> {
        if self.session_exists(&spec.name).await? {
            return Ok(false);
        }

        let cwd = spec.cwd.to_string_lossy().into_owned();
        let width = spec.width.to_string();
        let height = spec.height.to_string();
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        let mut args = vec![
            "new-session",
            "-d",
            "-s",
            spec.name.as_str(),
            "-c",
            cwd.as_str(),
            "-x",
            width.as_str(),
            "-y",
            height.as_str(),
        ];
        for pair in &env {
            args.push("-e");
            args.push(pair.as_str());
        }
        if !spec.command.is_empty() {
            args.push(spec.command.as_str());
        }

        self.run(&args).await?;
        self.keep_dead_panes(&spec.name, 0).await;
        self.install_session_options(&spec.name).await;
        Ok(true)
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        match self.run(&["kill-session", "-t", &session_target(name)]).await {
            Err(MuxError::Absent(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn session_exists(&self, name: &str) -> Result<bool, MuxError> {
        match self.run(&["has-session", "-t", &session_target(name)]).await {
            Ok(_) => Ok(true),
            Err(MuxError::Absent(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>, MuxError> {
        let stdout = match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(stdout) => stdout,
            Err(MuxError::Absent(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(stdout
            .lines()
            .filter(|name| name.starts_with(prefix))
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn list_windows(&self, name: &str) -> Result<Vec<WindowInfo>, MuxError> {
        // Format: window_index|window_active|pane_dead|window_name
        let stdout = self
            .run(&[
                "list-windows",
                "-t",
                &session_target(name),
                "-F",
                "#{window_index}|#{window_active}|#{pane_dead}|#{window_name}",
            ])
            .await?;

        Ok(stdout.lines().filter_map(parse_window_line).collect())
    }

    async fn new_window(
        &self,
        name: &str,
        window_name: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<u32, MuxError> {
        let target = format!("{}:", session_target(name));
        let cwd = cwd.to_string_lossy().into_owned();
        let mut args = vec![
            "new-window",
            "-d",
            "-P",
            "-F",
            "#{window_index}",
            "-t",
            target.as_str(),
            "-n",
            window_name,
            "-c",
            cwd.as_str(),
        ];
        if !command.is_empty() {
            args.push(command);
        }

        let stdout = self.run(&args).await?;
        let index = stdout
            .trim()
            .parse::<u32>()
            .map_err(|_| MuxError::Io(format!("unexpected new-window output: {:?}", stdout)))?;
        self.keep_dead_panes(name, index).await;
        Ok(index)
    }

    async fn respawn_window(
        &self,
        name: &str,
        index: u32,
        cwd: &Path,
        command: &str,
    ) -> Result<(), MuxError> {
        let target = window_target(name, index);
        let cwd = cwd.to_string_lossy().into_owned();
        let mut args = vec!["respawn-pane", "-k", "-t", target.as_str(), "-c", cwd.as_str()];
        if !command.is_empty() {
            args.push(command);
        }
        self.run(&args).await.map(|_| ())
    }

    async fn rename_window(
        &self,
        name: &str,
        index: u32,
        window_name: &str,
    ) -> Result<(), MuxError> {
        self.run(&["rename-window", "-t", &window_target(name, index), window_name])
            .await
            .map(|_| ())
    }

    async fn close_window(&self, name: &str, index: u32) -> Result<(), MuxError> {
        if index == 0 {
            return Err(MuxError::Io("window 0 cannot be closed".to_string()));
        }
        self.run(&["kill-window", "-t", &window_target(name, index)])
            .await
            .map(|_| ())
    }

    async fn capture_pane(
        &self,
        name: &str,
        index: u32,
        lines: usize,
    ) -> Result<String, MuxError> {
        let start = format!("-{}", lines);
        self.run(&[
            "capture-pane",
            "-p",
            "-e",
            "-J",
            "-t",
            &window_target(name, index),
            "-S",
            &start,
        ])
        .await
    }

    async fn send_keys(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError> {
        self.run(&["send-keys", "-t", &window_target(name, index), "-l", text])
            .await
            .map(|_| ())
    }

    async fn send_key(&self, name: &str, index: u32, key: &str) -> Result<(), MuxError> {
        self.run(&["send-keys", "-t", &window_target(name, index), key])
            .await
            .map(|_| ())
    }

    async fn send_prompt(&self, name: &str, index: u32, text: &str) -> Result<(), MuxError> {
        let target = window_target(name, index);
        // One invocation so no other keystroke lands between text and Enter
        self.run(&[
            "send-keys", "-t", &target, "-l", text, ";", "send-keys", "-t", &target, "Enter",
        ])
        .await
        .map(|_| ())
    }

    async fn resize_pane(&self, name: &str, width: u16, height: u16) -> Result<(), MuxError> {
        self.run(&[
            "resize-window",
            "-t",
            &session_target(name),
            "-x",
            &width.to_string(),
            "-y",
            &height.to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn bind_detach_resize(
        &self,
        name: &str,
        width: u16,
        height: u16,
    ) -> Result<(), MuxError> {
        let binding = format!(
            "run-shell \"{} resize-window -t '{}' -x {} -y {}\" ; detach-client",
            self.tmux_path,
            session_target(name),
            width,
            height
        );
        self.run(&["bind-key", "-n", "C-q", &binding]).await.map(|_| ())
    }

    async fn configure_status(&self, name: &str, bar: &StatusBar) -> Result<(), MuxError> {
        let session = session_target(name);
        let tab = format!("#I:#W#{{?{}, !,}}", AUTO_YES_OPTION);
        let current_tab = format!("#[reverse] {} #[noreverse]", tab);
        let tab = format!(" {} ", tab);

        self.run(&["set-option", "-t", &session, "status-left", &bar.left])
            .await?;
        self.run(&["set-option", "-t", &session, "status-left-length", "60"])
            .await?;
        self.run(&["set-option", "-t", &session, "window-status-format", &tab])
            .await?;
        self.run(&["set-option", "-t", &session, "window-status-current-format", &current_tab])
            .await?;

        for (index, auto_yes) in &bar.windows {
            let target = window_target(name, *index);
            if *auto_yes {
                self.run(&["set-option", "-w", "-t", &target, AUTO_YES_OPTION, "1"])
                    .await?;
            } else {
                self.run_advisory(&["set-option", "-w", "-u", "-t", &target, AUTO_YES_OPTION])
                    .await;
            }
        }
        Ok(())
    }

    fn attach(&self, name: &str, index: u32) -> Result<(), MuxError> {
        let window = window_target(name, index);
        // Already inside tmux: switch this client instead of nesting
        let args: Vec<&str> = if std::env::var_os("TMUX").is_some() {
            vec!["switch-client", "-t", window.as_str()]
        } else {
            vec!["attach-session", "-t", window.as_str()]
        };

        let status = std::process::Command::new(&self.tmux_path)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| MuxError::Io(format!("failed to attach: {}", e)))?;

        if !status.success() {
            return Err(MuxError::Io(format!("tmux attach exited with {}", status)));
        }
        Ok(())
    }
}

/// Exact-match session target, so `asmgr-1` never matches `asmgr-10`.
fn session_target(name: &str) -> String {
    format!("={}", name)
}

fn window_target(name: &str, index: u32) -> String {
    format!("={}:{}", name, index)
}

fn classify_failure(args: &[&str], stderr: String) -> MuxError {
    let missing = [
        "can't find session",
        "can't find window",
        "can't find pane",
        "session not found",
        "no server running",
        "no sessions",
        "error connecting to",
    ];
    if missing.iter().any(|needle| stderr.contains(needle)) {
        MuxError::Absent(stderr)
    } else {
        MuxError::Io(format!(
            "tmux {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr
        ))
    }
}

fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let mut parts = line.splitn(4, '|');
    let index = parts.next()?.parse().ok()?;
    let active = parts.next()? == "1";
    let dead = parts.next()? == "1";
    let name = parts.next().unwrap_or_default().to_string();
    Some(WindowInfo {
        index,
        name,
        active,
        dead,
    })
}
