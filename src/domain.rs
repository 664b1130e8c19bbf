use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentKind;
use crate::tmux::{Activity, WindowInfo};

/// Reserved id of the implicit group that shows every favorite instance.
pub const FAVORITES_GROUP_ID: &str = "favorites";

/// Allocate a new opaque, time-ordered identifier.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Canonical tmux session name for an instance.
pub fn canonical_session_name(prefix: &str, instance_id: &str) -> String {
    format!("{}-{}", prefix, instance_id)
}

/// Inverse of [`canonical_session_name`]; `None` for foreign sessions.
pub fn instance_id_from_session<'a>(prefix: &str, session: &'a str) -> Option<&'a str> {
    session
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|id| !id.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Contents of `projects.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCatalog {
    #[serde(default)]
    pub active_id: Option<String>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl ProjectCatalog {
    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub full_row_color: bool,
    #[serde(default)]
    pub collapsed: bool,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            color: None,
            bg_color: None,
            full_row_color: false,
            collapsed: false,
        }
    }
}

/// Whether the instance's tmux session is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Stopped,
    Running,
}

/// A tracked tmux window beyond window 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowedWindow {
    pub index: u32,
    pub name: String,
    pub agent: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<String>,
    #[serde(default)]
    pub resume_session_id: String,
    #[serde(default)]
    pub auto_yes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// State derived from tmux on each tick. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Runtime {
    pub status: Status,
    pub activity: Activity,
    pub last_line: String,
    pub preview: String,
    /// Window currently displayed and previewed for this instance.
    pub selected_window: u32,
    pub windows: Vec<WindowInfo>,
}

impl Runtime {
    pub fn clear(&mut self) {
        let selected_window = self.selected_window;
        *self = Self {
            selected_window,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub agent: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<String>,
    #[serde(default)]
    pub auto_yes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub full_row_color: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub resume_session_id: String,
    #[serde(default)]
    pub followed_windows: Vec<FollowedWindow>,
    #[serde(skip)]
    pub runtime: Runtime,
}

impl Instance {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, agent: AgentKind) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            path: path.into(),
            agent,
            custom_command: None,
            auto_yes: false,
            color: None,
            bg_color: None,
            full_row_color: false,
            group_id: None,
            favorite: false,
            notes: None,
            resume_session_id: String::new(),
            followed_windows: Vec::new(),
            runtime: Runtime::default(),
        }
    }

    pub fn session_name(&self, prefix: &str) -> String {
        canonical_session_name(prefix, &self.id)
    }

    pub fn is_running(&self) -> bool {
        self.runtime.status == Status::Running
    }

    /// Copy of the launch configuration under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_id(),
            name: self.name.clone(),
            path: self.path.clone(),
            agent: self.agent,
            custom_command: self.custom_command.clone(),
            auto_yes: self.auto_yes,
            color: self.color.clone(),
            bg_color: self.bg_color.clone(),
            full_row_color: self.full_row_color,
            group_id: self.group_id.clone(),
            favorite: false,
            notes: None,
            resume_session_id: String::new(),
            followed_windows: Vec::new(),
            runtime: Runtime::default(),
        }
    }

    pub fn followed(&self, index: u32) -> Option<&FollowedWindow> {
        self.followed_windows.iter().find(|w| w.index == index)
    }

    pub fn followed_mut(&mut self, index: u32) -> Option<&mut FollowedWindow> {
        self.followed_windows.iter_mut().find(|w| w.index == index)
    }

    /// Agent kind running in the given window.
    pub fn window_agent(&self, index: u32) -> AgentKind {
        match index {
            0 => self.agent,
            _ => self.followed(index).map_or(AgentKind::Terminal, |w| w.agent),
        }
    }

    pub fn window_auto_yes(&self, index: u32) -> bool {
        match index {
            0 => self.auto_yes,
            _ => self.followed(index).is_some_and(|w| w.auto_yes),
        }
    }

    /// Enforce the persisted-shape invariants: no window 0 among followed
    /// windows, no resume tokens on kinds that cannot resume, no empty group id.
    pub fn normalize(&mut self) {
        self.followed_windows.retain(|w| w.index != 0);
        if !self.agent.profile().supports_resume() {
            self.resume_session_id.clear();
        }
        for window in &mut self.followed_windows {
            if !window.agent.profile().supports_resume() {
                window.resume_session_id.clear();
            }
        }
        if self.group_id.as_deref().is_some_and(|g| g.is_empty()) {
            self.group_id = None;
        }
    }
}

/// Which pane of the split view has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitFocus {
    #[default]
    List,
    Preview,
}

/// Per-project UI preferences, persisted on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub compact_list: bool,
    pub hide_status_lines: bool,
    pub show_agent_icons: bool,
    pub split_view: bool,
    pub split_focus: SplitFocus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_session_id: Option<String>,
    pub cursor: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_round_trips_through_prefix() {
        let name = canonical_session_name("asmgr", "01abc");
        assert_eq!(name, "asmgr-01abc");
        assert_eq!(instance_id_from_session("asmgr", &name), Some("01abc"));
        assert_eq!(instance_id_from_session("asmgr", "other-01abc"), None);
        assert_eq!(instance_id_from_session("asmgr", "asmgr-"), None);
    }

    #[test]
    fn normalize_drops_window_zero_and_unsupported_tokens() {
        let mut inst = Instance::new("demo", "/tmp/p", AgentKind::Aider);
        inst.resume_session_id = "stale".to_string();
        inst.group_id = Some(String::new());
        inst.followed_windows.push(FollowedWindow {
            index: 0,
            name: "bogus".to_string(),
            agent: AgentKind::Terminal,
            custom_command: None,
            resume_session_id: String::new(),
            auto_yes: false,
            notes: None,
        });
        inst.followed_windows.push(FollowedWindow {
            index: 2,
            name: "shell".to_string(),
            agent: AgentKind::Terminal,
            custom_command: None,
            resume_session_id: "x".to_string(),
            auto_yes: false,
            notes: None,
        });

        inst.normalize();

        assert!(inst.resume_session_id.is_empty());
        assert_eq!(inst.group_id, None);
        assert_eq!(inst.followed_windows.len(), 1);
        assert!(inst.followed_windows[0].resume_session_id.is_empty());
    }

    #[test]
    fn duplicate_keeps_config_but_not_identity() {
        let mut inst = Instance::new("demo", "/tmp/p", AgentKind::Claude);
        inst.group_id = Some("g1".to_string());
        inst.color = Some("red".to_string());
        inst.favorite = true;
        inst.resume_session_id = "tok".to_string();

        let copy = inst.duplicate();

        assert_ne!(copy.id, inst.id);
        assert_eq!(copy.group_id, inst.group_id);
        assert_eq!(copy.color, inst.color);
        assert!(!copy.favorite);
        assert!(copy.resume_session_id.is_empty());
    }

    #[test]
    fn settings_use_camel_case_keys() {
        let settings = Settings {
            compact_list: true,
            cursor: 3,
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"compactList\":true"));
        assert!(json.contains("\"splitFocus\":\"list\""));
        assert!(!json.contains("markedSessionId"));
    }
}
