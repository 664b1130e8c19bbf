use crossterm::event::KeyEvent;

use asmgr::agents::{AgentKind, ResumeCandidate};
use asmgr::core::{CreateRequest, Direction};

/// What a resume pick is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeTarget {
    /// Freshly created instance waiting for its first start
    Create,
    /// Respawn this window into the chosen conversation
    Window(u32),
    /// Open a new tab forked from the chosen conversation
    Fork,
}

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// The clock fired
    Tick,
    /// A background transcript scan finished
    ResumeCandidates {
        instance_id: String,
        target: ResumeTarget,
        candidates: Vec<ResumeCandidate>,
    },

    Attach(String),
    Create(CreateRequest),
    ToggleRunning(String),
    Delete(String),
    ParallelStart(String),
    ToggleFavorite(String),
    Reorder(String, Direction),
    Rename(String, String),
    NewTab(String, AgentKind),
    CloseTab(String, u32),
    SelectWindow(String, u32),
    ToggleAutoApprove(String, u32),
    SendPrompt(String, String),
    /// Scan transcripts for an instance in the background
    FindResume(String, ResumeTarget),
    Resume {
        instance_id: String,
        target: ResumeTarget,
        /// `None` starts fresh
        token: Option<String>,
    },
    AddGroup(String),
    ToggleGroup(String),
    /// Move an instance to the next group, wrapping to ungrouped
    CycleGroup(String),
    /// Switch to the next project, wrapping to the default project
    CycleProject,
}
