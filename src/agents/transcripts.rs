//! Resume-token discovery from agent transcript directories.
//!
//! Only the fields needed to offer a resume choice are read: the session
//! token, modification time, message count and the first/last user prompt.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use super::registry::{AgentKind, TranscriptLayout};

const PROMPT_PREVIEW_CHARS: usize = 200;

/// One resumable conversation for a working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeCandidate {
    pub token: String,
    pub last_modified: DateTime<Utc>,
    pub message_count: usize,
    pub first_prompt: String,
    pub last_prompt: String,
}

/// Directory holding the kind's transcripts relevant to `cwd`.
pub fn transcripts_root(kind: AgentKind, home: &Path, cwd: &Path) -> Option<PathBuf> {
    match kind.profile().transcripts {
        TranscriptLayout::None => None,
        TranscriptLayout::ClaudeProjects => Some(
            home.join(".claude")
                .join("projects")
                .join(claude_project_dir_name(cwd)),
        ),
        TranscriptLayout::CodexSessions => Some(home.join(".codex").join("sessions")),
    }
}

/// Resume candidates for `cwd`, most recently modified first.
pub fn discover(kind: AgentKind, home: &Path, cwd: &Path) -> Vec<ResumeCandidate> {
    let Some(root) = transcripts_root(kind, home, cwd) else {
        return Vec::new();
    };
    if !root.is_dir() {
        return Vec::new();
    }

    let mut candidates: Vec<ResumeCandidate> = match kind.profile().transcripts {
        TranscriptLayout::None => Vec::new(),
        TranscriptLayout::ClaudeProjects => jsonl_files(&root, 1)
            .filter(|path| !file_name_starts_with(path, "agent-"))
            .filter_map(|path| parse_claude(&path, cwd))
            .collect(),
        TranscriptLayout::CodexSessions => jsonl_files(&root, 4)
            .filter(|path| file_name_starts_with(path, "rollout-"))
            .filter_map(|path| parse_codex(&path, cwd))
            .collect(),
    };

    candidates.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    debug!(?kind, cwd = %cwd.display(), count = candidates.len(), "discovered resume candidates");
    candidates
}

/// Claude stores a project's sessions under its path with separators flattened.
fn claude_project_dir_name(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

fn jsonl_files(root: &Path, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
}

fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(prefix))
        .unwrap_or(false)
}

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn json_lines(path: &Path) -> Option<impl Iterator<Item = Value>> {
    let file = File::open(path).ok()?;
    Some(
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str::<Value>(&line).ok()),
    )
}

/// A user prompt worth showing: not a tool result or injected context block.
fn prompt_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('<') {
        return None;
    }
    Some(text.chars().take(PROMPT_PREVIEW_CHARS).collect())
}

fn text_from_content(content: &Value, text_type: &str) -> Option<String> {
    match content {
        Value::String(s) => prompt_text(s),
        Value::Array(items) => items
            .iter()
            .filter(|item| item["type"].as_str() == Some(text_type))
            .find_map(|item| item["text"].as_str().and_then(prompt_text)),
        _ => None,
    }
}

#[derive(Default)]
struct Tally {
    token: Option<String>,
    cwd_matches: Option<bool>,
    message_count: usize,
    first_prompt: Option<String>,
    last_prompt: Option<String>,
}

impl Tally {
    fn see_cwd(&mut self, recorded: &str, cwd: &Path) {
        let matches = Path::new(recorded) == cwd;
        self.cwd_matches = Some(self.cwd_matches.unwrap_or(false) || matches);
    }

    fn see_prompt(&mut self, prompt: Option<String>) {
        if let Some(prompt) = prompt {
            if self.first_prompt.is_none() {
                self.first_prompt = Some(prompt.clone());
            }
            self.last_prompt = Some(prompt);
        }
    }

    fn finish(self, path: &Path) -> Option<ResumeCandidate> {
        // Transcripts that never recorded a cwd are trusted to their directory
        if self.cwd_matches == Some(false) || self.message_count == 0 {
            return None;
        }
        let token = self
            .token
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))?;
        Some(ResumeCandidate {
            token,
            last_modified: modified(path)?,
            message_count: self.message_count,
            first_prompt: self.first_prompt.unwrap_or_default(),
            last_prompt: self.last_prompt.unwrap_or_default(),
        })
    }
}

fn parse_claude(path: &Path, cwd: &Path) -> Option<ResumeCandidate> {
    let mut tally = Tally::default();
    for entry in json_lines(path)? {
        if tally.token.is_none() {
            tally.token = entry["sessionId"].as_str().map(ToOwned::to_owned);
        }
        if let Some(recorded) = entry["cwd"].as_str() {
            tally.see_cwd(recorded, cwd);
        }
        match entry["type"].as_str() {
            Some("user") => {
                tally.message_count += 1;
                if entry["isMeta"].as_bool() != Some(true) {
                    tally.see_prompt(text_from_content(&entry["message"]["content"], "text"));
                }
            }
            Some("assistant") => tally.message_count += 1,
            _ => {}
        }
    }
    tally.finish(path)
}

fn parse_codex(path: &Path, cwd: &Path) -> Option<ResumeCandidate> {
    let mut tally = Tally::default();
    for entry in json_lines(path)? {
        let payload = &entry["payload"];
        match entry["type"].as_str() {
            Some("session_meta") => {
                tally.token = payload["id"].as_str().map(ToOwned::to_owned);
                if let Some(recorded) = payload["cwd"].as_str() {
                    tally.see_cwd(recorded, cwd);
                }
            }
            Some("response_item") if payload["type"].as_str() == Some("message") => {
                match payload["role"].as_str() {
                    Some("user") => {
                        tally.message_count += 1;
                        tally.see_prompt(text_from_content(&payload["content"], "input_text"));
                    }
                    Some("assistant") => tally.message_count += 1,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    // Rollouts without session metadata cannot be tied to a directory
    tally.cwd_matches?;
    tally.finish(path)
}
