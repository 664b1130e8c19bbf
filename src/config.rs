use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ROOT_ENV: &str = "ASMGR_HOME";
const CONFIG_FILE: &str = "config.toml";

/// Runtime configuration, read from `<root>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `projects.json` and per-project state.
    #[serde(skip)]
    pub root: PathBuf,
    /// Prefix of every tmux session this tool creates.
    pub session_prefix: String,
    pub tmux_path: String,
    /// Fast tick period in milliseconds.
    pub tick_ms: u64,
    /// Every Nth fast tick refreshes all instances, not just the selected one.
    pub slow_every: u64,
    /// Scrollback lines captured for the preview.
    pub capture_lines: usize,
    /// Trailing lines inspected by the activity classifier.
    pub classify_tail_lines: usize,
    pub mux_timeout_ms: u64,
    pub preview_width: u16,
    pub preview_height: u16,
    pub last_line_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            session_prefix: "asmgr".to_string(),
            tmux_path: "tmux".to_string(),
            tick_ms: 100,
            slow_every: 5,
            capture_lines: 200,
            classify_tail_lines: 15,
            mux_timeout_ms: 3000,
            preview_width: 120,
            preview_height: 40,
            last_line_width: 120,
        }
    }
}

/// `$ASMGR_HOME`, else the per-user config directory.
pub fn default_root() -> PathBuf {
    if let Some(root) = std::env::var_os(ROOT_ENV) {
        return PathBuf::from(root);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("asmgr")
}

impl Config {
    /// Load configuration for `root`. A missing file yields defaults.
    pub fn load(root: Option<&Path>, file: Option<&Path>) -> Result<Self> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(default_root);
        let path = file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_FILE));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.root = root;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_millis(self.mux_timeout_ms)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("asmgr.log")
    }
}
