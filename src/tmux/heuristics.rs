use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agents::AgentKind;

/// What an agent pane is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activity {
    /// Agent is at its prompt or the pane is quiet
    #[default]
    Idle,
    /// Agent is actively processing (spinning, thinking)
    Busy,
    /// Agent asked a question and is blocked on the user
    Waiting,
}

/// Result of classifying one pane snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub activity: Activity,
    pub last_line: String,
}

/// CSI, OSC and two-byte escape sequences.
static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?<>=!]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .unwrap()
});

/// Confirmation prompts common to every kind.
static RE_CONFIRM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\[y/n\]|\(y/n\)|\[y/N\]|\(Y/n\)|\[Y/n\]|\(yes/no\))").unwrap());

/// Braille spinner frames.
static RE_SPINNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]").unwrap());

/// Lines made only of borders, rules and prompt glyphs.
static RE_DECORATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s─━═│┃╭╮╰╯┌┐└┘├┤┬┴┼\-_=~>❯›•·*]*$").unwrap());

/// Remove terminal escape sequences and carriage returns.
pub fn strip_ansi(content: &str) -> String {
    RE_ANSI.replace_all(content, "").replace('\r', "")
}

/// Engine for inferring agent activity from pane content
pub struct ActivityClassifier {
    /// Number of trailing lines considered for markers
    tail_lines: usize,
    /// Maximum width of the summary line, in characters
    line_width: usize,
}

impl ActivityClassifier {
    pub fn new(tail_lines: usize, line_width: usize) -> Self {
        Self {
            tail_lines: tail_lines.max(1),
            line_width: line_width.max(1),
        }
    }

    /// Classify a raw capture. Escape sequences are stripped first.
    pub fn classify(&self, capture: &str, kind: AgentKind) -> Classification {
        let plain = strip_ansi(capture);
        let lines: Vec<&str> = plain.lines().collect();
        let tail_start = lines.len().saturating_sub(self.tail_lines);
        let tail = &lines[tail_start..];

        let profile = kind.profile();
        let mut last_busy = None;
        let mut last_waiting = None;
        for (i, line) in tail.iter().enumerate() {
            let lower = line.to_lowercase();
            if RE_SPINNER.is_match(line)
                || profile.busy_markers.iter().any(|m| lower.contains(m))
            {
                last_busy = Some(i);
            }
            if RE_CONFIRM.is_match(line)
                || profile.waiting_markers.iter().any(|m| lower.contains(m))
            {
                last_waiting = Some(i);
            }
        }

        // A prompt only counts when nothing busy was printed after it
        let activity = match (last_busy, last_waiting) {
            (Some(b), Some(w)) if w >= b => Activity::Waiting,
            (None, Some(_)) => Activity::Waiting,
            (Some(_), _) => Activity::Busy,
            (None, None) => Activity::Idle,
        };

        Classification {
            activity,
            last_line: self.last_line(&lines),
        }
    }

    fn last_line(&self, lines: &[&str]) -> String {
        lines
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty() && !RE_DECORATIVE.is_match(line))
            .map(|line| truncate(line, self.line_width))
            .unwrap_or_default()
    }
}

impl Default for ActivityClassifier {
    fn default() -> Self {
        Self::new(15, 120)
    }
}

fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut out: String = line.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
