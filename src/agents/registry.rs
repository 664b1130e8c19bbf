use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which external CLI an instance or tab launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
    Gemini,
    Aider,
    /// User-supplied command line
    Custom,
    /// Plain shell
    Terminal,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Claude,
        AgentKind::Codex,
        AgentKind::Gemini,
        AgentKind::Aider,
        AgentKind::Custom,
        AgentKind::Terminal,
    ];

    pub fn profile(self) -> &'static AgentProfile {
        match self {
            AgentKind::Claude => &CLAUDE,
            AgentKind::Codex => &CODEX,
            AgentKind::Gemini => &GEMINI,
            AgentKind::Aider => &AIDER,
            AgentKind::Custom => &CUSTOM,
            AgentKind::Terminal => &TERMINAL,
        }
    }

    pub fn label(self) -> &'static str {
        self.profile().label
    }

    /// Next kind in registry order, wrapping around.
    pub fn next(self) -> AgentKind {
        let pos = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }
}

/// How auto-approve is turned on for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoApprove {
    Unsupported,
    /// Launch flags; toggling requires a respawn.
    Flags(&'static [&'static str]),
    /// Launch flags, plus a key that toggles the mode in a running agent.
    InBand {
        flags: &'static [&'static str],
        key: &'static str,
    },
}

/// How a resume token is passed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStyle {
    Unsupported,
    /// `<binary> ... --resume <token>`
    Flag(&'static str),
    /// `<binary> ... resume <token>`
    Subcommand(&'static str),
}

/// Where a kind keeps its conversation transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptLayout {
    None,
    /// `~/.claude/projects/<encoded cwd>/<session>.jsonl`
    ClaudeProjects,
    /// `~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`
    CodexSessions,
}

/// Static behavior record for one agent kind.
#[derive(Debug)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub label: &'static str,
    pub icon: &'static str,
    /// Executable looked up on `PATH`; `None` for Custom and Terminal.
    pub binary: Option<&'static str>,
    pub auto_approve: AutoApprove,
    pub resume: ResumeStyle,
    pub transcripts: TranscriptLayout,
    /// Lowercase substrings meaning the agent is working.
    pub busy_markers: &'static [&'static str],
    /// Lowercase substrings meaning the agent waits on a confirmation.
    pub waiting_markers: &'static [&'static str],
}

impl AgentProfile {
    pub fn supports_resume(&self) -> bool {
        self.resume != ResumeStyle::Unsupported
    }

    pub fn supports_auto_approve(&self) -> bool {
        self.auto_approve != AutoApprove::Unsupported
    }

    /// Key that flips auto-approve inside a running agent, if any.
    pub fn in_band_toggle(&self) -> Option<&'static str> {
        match self.auto_approve {
            AutoApprove::InBand { key, .. } => Some(key),
            _ => None,
        }
    }

    fn auto_approve_flags(&self) -> &'static [&'static str] {
        match self.auto_approve {
            AutoApprove::Unsupported => &[],
            AutoApprove::Flags(flags) | AutoApprove::InBand { flags, .. } => flags,
        }
    }

    /// Executable that must be on `PATH` before launching.
    pub fn required_binary(&self, custom_command: Option<&str>) -> Option<String> {
        match self.kind {
            AgentKind::Custom => custom_command
                .and_then(|c| c.split_whitespace().next())
                .map(ToOwned::to_owned),
            _ => self.binary.map(ToOwned::to_owned),
        }
    }

    /// Compose the launch command for a window running this kind.
    pub fn build_command(
        &self,
        custom_command: Option<&str>,
        auto_yes: bool,
        resume_token: &str,
        cwd: &Path,
    ) -> Result<LaunchCommand, RegistryError> {
        let program = match (self.kind, self.binary) {
            (AgentKind::Custom, _) => {
                let custom = custom_command
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(RegistryError::EmptyCustomCommand)?;
                Program::Shell(custom.to_string())
            }
            (_, None) => Program::Shell(String::new()),
            (_, Some(binary)) => {
                let mut argv = vec![binary.to_string()];
                if auto_yes {
                    argv.extend(self.auto_approve_flags().iter().map(|f| f.to_string()));
                }
                if !resume_token.is_empty() {
                    match self.resume {
                        ResumeStyle::Unsupported => {}
                        ResumeStyle::Flag(flag) | ResumeStyle::Subcommand(flag) => {
                            argv.push(flag.to_string());
                            argv.push(resume_token.to_string());
                        }
                    }
                }
                Program::Argv(argv)
            }
        };

        Ok(LaunchCommand {
            program,
            cwd: cwd.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("custom agent requires a command")]
    EmptyCustomCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    Argv(Vec<String>),
    /// Shell line passed through verbatim; empty means the default shell.
    Shell(String),
}

/// A fully resolved command plus its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: Program,
    pub cwd: PathBuf,
}

impl LaunchCommand {
    /// Command line handed to tmux, which runs it through the shell.
    pub fn shell_line(&self) -> String {
        match &self.program {
            Program::Shell(line) => line.clone(),
            Program::Argv(argv) => argv
                .iter()
                .map(|arg| shell_escape(arg))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn argv(&self) -> Option<&[String]> {
        match &self.program {
            Program::Argv(argv) => Some(argv.as_slice()),
            Program::Shell(_) => None,
        }
    }
}

/// Quote a word for POSIX shells, leaving plain words untouched.
fn shell_escape(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Whether `binary` resolves to an executable file.
pub fn binary_on_path(binary: &str) -> bool {
    if binary.contains('/') {
        return is_executable(Path::new(binary));
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .any(|dir| is_executable(&dir.join(binary)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

static CLAUDE: AgentProfile = AgentProfile {
    kind: AgentKind::Claude,
    label: "Claude",
    icon: "✻",
    binary: Some("claude"),
    auto_approve: AutoApprove::Flags(&["--dangerously-skip-permissions"]),
    resume: ResumeStyle::Flag("--resume"),
    transcripts: TranscriptLayout::ClaudeProjects,
    busy_markers: &["esc to interrupt", "ctrl+c to interrupt"],
    waiting_markers: &[
        "do you want to",
        "would you like to",
        "❯ 1. yes",
        "allow edit",
        "allow bash",
    ],
};

static CODEX: AgentProfile = AgentProfile {
    kind: AgentKind::Codex,
    label: "Codex",
    icon: "◎",
    binary: Some("codex"),
    auto_approve: AutoApprove::Flags(&["--dangerously-bypass-approvals-and-sandbox"]),
    resume: ResumeStyle::Subcommand("resume"),
    transcripts: TranscriptLayout::CodexSessions,
    busy_markers: &["esc to interrupt", "working (", "thinking"],
    waiting_markers: &["allow command?", "approve", "press enter to confirm"],
};

static GEMINI: AgentProfile = AgentProfile {
    kind: AgentKind::Gemini,
    label: "Gemini",
    icon: "✦",
    binary: Some("gemini"),
    auto_approve: AutoApprove::InBand {
        flags: &["--yolo"],
        key: "C-y",
    },
    resume: ResumeStyle::Unsupported,
    transcripts: TranscriptLayout::None,
    busy_markers: &["esc to cancel"],
    waiting_markers: &["allow execution", "apply this change?", "waiting for user confirmation"],
};

static AIDER: AgentProfile = AgentProfile {
    kind: AgentKind::Aider,
    label: "Aider",
    icon: "◆",
    binary: Some("aider"),
    auto_approve: AutoApprove::Flags(&["--yes-always"]),
    resume: ResumeStyle::Unsupported,
    transcripts: TranscriptLayout::None,
    busy_markers: &["waiting for "],
    waiting_markers: &["(y)es/(n)o", "add file to the chat?", "run shell command?"],
};

static CUSTOM: AgentProfile = AgentProfile {
    kind: AgentKind::Custom,
    label: "Custom",
    icon: "◇",
    binary: None,
    auto_approve: AutoApprove::Unsupported,
    resume: ResumeStyle::Unsupported,
    transcripts: TranscriptLayout::None,
    busy_markers: &[],
    waiting_markers: &[],
};

static TERMINAL: AgentProfile = AgentProfile {
    kind: AgentKind::Terminal,
    label: "Terminal",
    icon: "$",
    binary: None,
    auto_approve: AutoApprove::Unsupported,
    resume: ResumeStyle::Unsupported,
    transcripts: TranscriptLayout::None,
    busy_markers: &[],
    waiting_markers: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(cmd: &LaunchCommand) -> Vec<String> {
        cmd.argv().map(<[String]>::to_vec).unwrap_or_default()
    }

    #[test]
    fn claude_command_appends_auto_approve_then_resume() {
        let cmd = AgentKind::Claude
            .profile()
            .build_command(None, true, "B", Path::new("/tmp/p"))
            .unwrap();
        assert_eq!(
            argv(&cmd),
            vec!["claude", "--dangerously-skip-permissions", "--resume", "B"]
        );
        assert_eq!(cmd.cwd, PathBuf::from("/tmp/p"));
    }

    #[test]
    fn codex_resume_is_a_subcommand() {
        let cmd = AgentKind::Codex
            .profile()
            .build_command(None, false, "abc", Path::new("/tmp"))
            .unwrap();
        assert_eq!(cmd.shell_line(), "codex resume abc");
    }

    #[test]
    fn resume_token_ignored_for_unsupported_kinds() {
        let cmd = AgentKind::Aider
            .profile()
            .build_command(None, false, "tok", Path::new("/tmp"))
            .unwrap();
        assert_eq!(argv(&cmd), vec!["aider"]);
    }

    #[test]
    fn custom_command_is_verbatim() {
        let profile = AgentKind::Custom.profile();
        let cmd = profile
            .build_command(Some("npm run dev -- --port 3000"), true, "x", Path::new("/"))
            .unwrap();
        assert_eq!(cmd.shell_line(), "npm run dev -- --port 3000");
        assert_eq!(
            profile.required_binary(Some("npm run dev")),
            Some("npm".to_string())
        );
        assert_eq!(
            profile.build_command(Some("  "), false, "", Path::new("/")),
            Err(RegistryError::EmptyCustomCommand)
        );
    }

    #[test]
    fn terminal_uses_default_shell() {
        let cmd = AgentKind::Terminal
            .profile()
            .build_command(None, true, "", Path::new("/"))
            .unwrap();
        assert_eq!(cmd.shell_line(), "");
        assert_eq!(AgentKind::Terminal.profile().required_binary(None), None);
    }

    #[test]
    fn shell_escape_quotes_only_when_needed() {
        assert_eq!(shell_escape("--resume"), "--resume");
        assert_eq!(shell_escape("it's here"), "'it'\\''s here'");
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn gemini_toggles_in_band() {
        let profile = AgentKind::Gemini.profile();
        assert!(profile.supports_auto_approve());
        assert_eq!(profile.in_band_toggle(), Some("C-y"));
        assert_eq!(AgentKind::Claude.profile().in_band_toggle(), None);
    }

    #[test]
    fn kinds_serialize_lowercase_and_cycle() {
        assert_eq!(serde_json::to_string(&AgentKind::Codex).unwrap(), "\"codex\"");
        assert_eq!(AgentKind::Terminal.next(), AgentKind::Claude);
        for kind in AgentKind::ALL {
            assert_eq!(kind.profile().kind, kind);
        }
    }

    #[test]
    fn markers_are_lowercase() {
        for kind in AgentKind::ALL {
            let profile = kind.profile();
            for marker in profile.busy_markers.iter().chain(profile.waiting_markers) {
                assert_eq!(*marker, marker.to_lowercase());
            }
        }
    }
}
