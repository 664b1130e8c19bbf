use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use asmgr::agents::{AgentKind, ResumeCandidate};
use asmgr::core::{CreateRequest, Direction, InstanceView, RowView, ViewModel};
use asmgr::domain::Status;
use asmgr::tmux::{strip_ansi, Activity};

use crate::actions::{Action, ResumeTarget};

pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg: Color::Rgb(30, 30, 30),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87),
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Creating { agent: AgentKind },
    Confirming(String),
    Prompting(String),
    Renaming(String),
    NamingGroup,
    ChoosingResume {
        instance_id: String,
        target: ResumeTarget,
        candidates: Vec<ResumeCandidate>,
        selected: usize,
    },
}

/// Main application state
pub struct App {
    pub view: ViewModel,
    pub project_name: String,
    pub list_state: ListState,
    /// Status line message and whether it is an error
    pub message: Option<(String, bool)>,
    pub theme: Theme,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub pending_actions: Vec<Action>,
    /// Inner size of the preview pane at the last render
    pub preview_size: (u16, u16),
}

impl App {
    pub fn new(cursor: usize) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(cursor));

        Self {
            view: ViewModel::default(),
            project_name: "default".to_string(),
            list_state,
            message: None,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            pending_actions: Vec::new(),
            preview_size: (0, 0),
        }
    }

    pub fn cursor(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    /// Id of the instance under the cursor
    pub fn selected_id(&self) -> Option<String> {
        self.view.row_instance(self.cursor()).map(ToOwned::to_owned)
    }

    fn selected_instance(&self) -> Option<&InstanceView> {
        self.view
            .row_instance(self.cursor())
            .and_then(|id| self.view.instances.get(id))
    }

    fn selected_window(&self) -> u32 {
        self.selected_instance()
            .and_then(|inst| inst.tabs.iter().find(|t| t.selected))
            .map_or(0, |t| t.index)
    }

    pub fn set_view(&mut self, view: ViewModel) {
        self.view = view;
        let rows = self.view.rows.len();
        if rows > 0 && self.cursor() >= rows {
            self.list_state.select(Some(rows - 1));
        }
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.message = Some((msg.into(), false));
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.message = Some((msg.into(), true));
    }

    pub fn choose_resume(&mut self, instance_id: String, target: ResumeTarget, candidates: Vec<ResumeCandidate>) {
        self.input_mode = InputMode::ChoosingResume {
            instance_id,
            target,
            candidates,
            selected: 0,
        };
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    fn push(&mut self, action: Action) {
        self.pending_actions.push(action);
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            other => {
                self.push(other);
                Ok(false)
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(true);
        }
        if self.input_mode == InputMode::Normal {
            self.message = None;
        }

        match self.input_mode.clone() {
            InputMode::Normal => return Ok(self.handle_normal_key(key)),
            InputMode::Creating { agent } => self.handle_creating_key(key, agent),
            InputMode::Confirming(id) => self.handle_confirming_key(key, id),
            InputMode::Prompting(id) => {
                if let Some(text) = self.handle_text_key(key) {
                    self.push(Action::SendPrompt(id, text));
                }
            }
            InputMode::Renaming(id) => {
                if let Some(name) = self.handle_text_key(key) {
                    self.push(Action::Rename(id, name));
                }
            }
            InputMode::NamingGroup => {
                if let Some(name) = self.handle_text_key(key) {
                    self.push(Action::AddGroup(name));
                }
            }
            InputMode::ChoosingResume { .. } => self.handle_resume_key(key),
        }
        Ok(false)
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        let selected = self.selected_id();
        match (key.code, selected) {
            (KeyCode::Char('q'), _) => return true,
            (KeyCode::Char('j') | KeyCode::Down, _) => self.move_cursor(1),
            (KeyCode::Char('k') | KeyCode::Up, _) => self.move_cursor(-1),
            (KeyCode::Char('n'), _) => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Creating {
                    agent: AgentKind::default(),
                };
            }
            (KeyCode::Char('g'), _) => {
                self.input_buffer.clear();
                self.input_mode = InputMode::NamingGroup;
            }
            (KeyCode::Char('P'), _) => self.push(Action::CycleProject),
            (KeyCode::Enter, None) => {
                if let Some(RowView::Header { group_id, .. }) = self.view.rows.get(self.cursor()) {
                    let group_id = group_id.clone();
                    self.push(Action::ToggleGroup(group_id));
                }
            }
            (KeyCode::Enter, Some(id)) => self.push(Action::Attach(id)),
            (KeyCode::Char('s'), Some(id)) => self.push(Action::ToggleRunning(id)),
            (KeyCode::Char('d'), Some(id)) => self.input_mode = InputMode::Confirming(id),
            (KeyCode::Char('p'), Some(id)) => self.push(Action::ParallelStart(id)),
            (KeyCode::Char('f'), Some(id)) => self.push(Action::ToggleFavorite(id)),
            (KeyCode::Char('J'), Some(id)) => self.push(Action::Reorder(id, Direction::Down)),
            (KeyCode::Char('K'), Some(id)) => self.push(Action::Reorder(id, Direction::Up)),
            (KeyCode::Char('m'), Some(id)) => self.push(Action::CycleGroup(id)),
            (KeyCode::Char('t'), Some(id)) => self.push(Action::NewTab(id, AgentKind::Terminal)),
            (KeyCode::Char('x'), Some(id)) => {
                let window = self.selected_window();
                if window == 0 {
                    self.error("Window 0 cannot be closed; stop the instance instead");
                } else {
                    self.push(Action::CloseTab(id, window));
                }
            }
            (KeyCode::Char('h') | KeyCode::Left, Some(id)) => self.step_tab(id, -1),
            (KeyCode::Char('l') | KeyCode::Right, Some(id)) => self.step_tab(id, 1),
            (KeyCode::Char('a'), Some(id)) => {
                let window = self.selected_window();
                self.push(Action::ToggleAutoApprove(id, window));
            }
            (KeyCode::Char('r'), Some(id)) => {
                let window = self.selected_window();
                self.push(Action::FindResume(id, ResumeTarget::Window(window)));
            }
            (KeyCode::Char('F'), Some(id)) => self.push(Action::FindResume(id, ResumeTarget::Fork)),
            (KeyCode::Char('i'), Some(id)) => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Prompting(id);
            }
            (KeyCode::Char('R'), Some(id)) => {
                self.input_buffer = self
                    .view
                    .instances
                    .get(&id)
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                self.input_mode = InputMode::Renaming(id);
            }
            _ => {}
        }
        false
    }

    fn step_tab(&mut self, id: String, step: i64) {
        let Some(inst) = self.view.instances.get(&id) else {
            return;
        };
        let count = inst.tabs.len() as i64;
        let current = inst.tabs.iter().position(|t| t.selected).unwrap_or(0) as i64;
        let next = (current + step).rem_euclid(count.max(1)) as usize;
        if let Some(tab) = inst.tabs.get(next) {
            let index = tab.index;
            self.push(Action::SelectWindow(id, index));
        }
    }

    /// Edit the text buffer; returns the text when submitted.
    fn handle_text_key(&mut self, key: KeyEvent) -> Option<String> {
        match key.code {
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                let text = std::mem::take(&mut self.input_buffer);
                return Some(text).filter(|t| !t.trim().is_empty());
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        None
    }

    fn handle_creating_key(&mut self, key: KeyEvent, agent: AgentKind) {
        if key.code == KeyCode::Tab {
            self.input_mode = InputMode::Creating { agent: agent.next() };
            return;
        }
        if let Some(name) = self.handle_text_key(key) {
            let path = std::env::current_dir().unwrap_or_else(|_| ".".into());
            let group_id = match self.view.rows.get(self.cursor()) {
                Some(RowView::Header { group_id, .. }) => Some(group_id.clone()),
                _ => self.selected_id().and_then(|id| self.group_of(&id)),
            };
            let mut request = CreateRequest::new(name.trim(), path, agent);
            request.group_id = group_id;
            self.push(Action::Create(request));
        }
    }

    /// Group that owns the row of `id` outside the favorites section.
    fn group_of(&self, id: &str) -> Option<String> {
        let mut current = None;
        for row in &self.view.rows {
            match row {
                RowView::Header { group_id, .. } => current = Some(group_id.clone()),
                RowView::Instance {
                    id: row_id,
                    favorite_section: false,
                } if row_id == id => return current,
                _ => {}
            }
        }
        None
    }

    fn handle_confirming_key(&mut self, key: KeyEvent, id: String) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.push(Action::Delete(id));
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
    }

    fn handle_resume_key(&mut self, key: KeyEvent) {
        let InputMode::ChoosingResume {
            instance_id,
            target,
            candidates,
            selected,
        } = &mut self.input_mode
        else {
            return;
        };
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                *selected = (*selected + 1).min(candidates.len().saturating_sub(1));
            }
            KeyCode::Char('k') | KeyCode::Up => *selected = selected.saturating_sub(1),
            KeyCode::Enter => {
                let action = Action::Resume {
                    instance_id: instance_id.clone(),
                    target: target.clone(),
                    token: candidates.get(*selected).map(|c| c.token.clone()),
                };
                self.input_mode = InputMode::Normal;
                self.push(action);
            }
            KeyCode::Esc => {
                // A new instance still needs starting; elsewhere Esc just cancels
                let action = (*target == ResumeTarget::Create).then(|| Action::Resume {
                    instance_id: instance_id.clone(),
                    target: ResumeTarget::Create,
                    token: None,
                });
                self.input_mode = InputMode::Normal;
                if let Some(action) = action {
                    self.push(action);
                }
            }
            _ => {}
        }
    }

    fn move_cursor(&mut self, step: i64) {
        let rows = self.view.rows.len() as i64;
        if rows == 0 {
            return;
        }
        let next = (self.cursor() as i64 + step).rem_euclid(rows);
        self.list_state.select(Some(next as usize));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        match &self.input_mode {
            InputMode::Creating { agent } => {
                let title = format!(" New {} instance ", agent.label());
                self.render_input_dialog(frame, &title, "Name (Tab: change agent):");
            }
            InputMode::Prompting(_) => self.render_input_dialog(frame, " Send prompt ", "Prompt:"),
            InputMode::Renaming(_) => self.render_input_dialog(frame, " Rename ", "New name:"),
            InputMode::NamingGroup => self.render_input_dialog(frame, " New group ", "Group name:"),
            InputMode::Confirming(id) => self.render_confirm_dialog(frame, id),
            InputMode::ChoosingResume {
                candidates, selected, ..
            } => self.render_resume_dialog(frame, candidates, *selected),
            InputMode::Normal => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " asmgr ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ project: {}", self.project_name),
                Style::default().fg(self.theme.dim),
            ),
            Span::styled(
                if self.view.orphans.is_empty() {
                    String::new()
                } else {
                    format!(" │ {} orphaned session(s)", self.view.orphans.len())
                },
                Style::default().fg(self.theme.warning),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_preview(frame, chunks[1]);
    }

    fn status_span(&self, inst: &InstanceView) -> Span<'static> {
        match (inst.status, inst.activity) {
            (Status::Stopped, _) => Span::styled("○ ", Style::default().fg(self.theme.dim)),
            (Status::Running, Activity::Busy) => Span::styled("● ", Style::default().fg(self.theme.warning)),
            (Status::Running, Activity::Waiting) => Span::styled("? ", Style::default().fg(self.theme.accent)),
            (Status::Running, Activity::Idle) => Span::styled("● ", Style::default().fg(self.theme.success)),
        }
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.view.rows.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No instances yet. Press 'n' to create one.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.view
                .rows
                .iter()
                .map(|row| match row {
                    RowView::Header {
                        name,
                        collapsed,
                        members,
                        ..
                    } => ListItem::new(Line::from(Span::styled(
                        format!("{} {} ({})", if *collapsed { "▸" } else { "▾" }, name, members),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    ))),
                    RowView::Instance { id, .. } => match self.view.instances.get(id) {
                        Some(inst) => self.instance_item(inst),
                        None => ListItem::new(""),
                    },
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Instances ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn instance_item(&self, inst: &InstanceView) -> ListItem<'static> {
        let mut spans = vec![
            Span::raw("  "),
            self.status_span(inst),
            Span::styled(inst.name.clone(), Style::default().fg(self.theme.fg)),
            Span::styled(
                format!(" {}", inst.agent.profile().icon),
                Style::default().fg(self.theme.dim),
            ),
        ];
        if inst.favorite {
            spans.push(Span::styled(" ★", Style::default().fg(self.theme.warning)));
        }
        if inst.auto_yes {
            spans.push(Span::styled(" !", Style::default().fg(self.theme.error)));
        }
        if inst.tabs.len() > 1 {
            spans.push(Span::styled(
                format!(" [{}]", inst.tabs.len()),
                Style::default().fg(self.theme.dim),
            ));
        }

        let mut lines = vec![Line::from(spans)];
        if !inst.last_line.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("     {}", inst.last_line),
                Style::default().fg(self.theme.dim),
            )));
        }
        ListItem::new(lines)
    }

    fn render_preview(&mut self, frame: &mut Frame, area: Rect) {
        let Some(inst) = self.selected_instance() else {
            let help = Paragraph::new(Line::from(Span::styled(
                "No instance selected",
                Style::default().fg(self.theme.dim),
            )))
            .block(Block::default().title(" Preview ").borders(Borders::ALL));
            frame.render_widget(help, area);
            return;
        };

        let block = Block::default()
            .title(format!(" {} · {} ", inst.name, inst.path))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.dim));
        let inner = block.inner(area);

        let tabs: Vec<Span> = inst
            .tabs
            .iter()
            .map(|tab| {
                let label = format!(
                    " {}:{}{}{} ",
                    tab.index,
                    tab.name,
                    if tab.auto_yes { "!" } else { "" },
                    if tab.dead { " ✗" } else { "" }
                );
                let style = if tab.selected {
                    Style::default()
                        .fg(self.theme.bg)
                        .bg(self.theme.accent)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(self.theme.fg)
                };
                Span::styled(label, style)
            })
            .collect();

        let body_height = inner.height.saturating_sub(1) as usize;
        let text = strip_ansi(&self.view.preview);
        let all: Vec<&str> = text.lines().collect();
        let mut end = all.len();
        while end > 0 && all[end - 1].trim().is_empty() {
            end -= 1;
        }
        let start = end.saturating_sub(body_height);

        let mut lines = vec![Line::from(tabs)];
        lines.extend(all[start..end].iter().map(|l| Line::from(l.to_string())));
        if inst.status == Status::Stopped {
            lines.push(Line::from(Span::styled(
                "Stopped. Press 's' to start or Enter to attach.",
                Style::default().fg(self.theme.dim),
            )));
        }

        self.preview_size = (inner.width, inner.height.saturating_sub(1));
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q quit │ n new │ Enter attach │ s start/stop │ d delete │ p parallel │ t tab │ x close tab │ h/l tabs │ a auto-yes │ r resume │ F fork │ i prompt │ f fav │ g group │ m move │ J/K reorder │ P project ";

        let content = if let Some((msg, is_error)) = &self.message {
            let style = if *is_error {
                Style::default().fg(self.theme.error)
            } else {
                Style::default().fg(self.theme.success)
            };
            Line::from(Span::styled(format!(" {} ", msg), style))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_input_dialog(&self, frame: &mut Frame, title: &str, label: &str) {
        let area = centered_rect(50, 20, frame.area());
        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(label.to_string(), Style::default().fg(self.theme.fg))),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Enter to confirm, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];
        frame.render_widget(Paragraph::new(text), inner);
    }

    fn render_confirm_dialog(&self, frame: &mut Frame, id: &str) {
        let area = centered_rect(50, 20, frame.area());
        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Confirm Delete ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.error));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let name = self
            .view
            .instances
            .get(id)
            .map(|i| i.name.as_str())
            .unwrap_or("unknown");

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Delete instance '{}'?", name),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Its tmux session will be killed.",
                Style::default().fg(self.theme.warning),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to confirm, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];
        frame.render_widget(Paragraph::new(text), inner);
    }

    fn render_resume_dialog(&self, frame: &mut Frame, candidates: &[ResumeCandidate], selected: usize) {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);

        let items: Vec<ListItem> = candidates
            .iter()
            .map(|c| {
                let prompt = if c.last_prompt.is_empty() {
                    &c.first_prompt
                } else {
                    &c.last_prompt
                };
                ListItem::new(vec![
                    Line::from(vec![
                        Span::styled(
                            c.last_modified.format("%Y-%m-%d %H:%M").to_string(),
                            Style::default().fg(self.theme.accent),
                        ),
                        Span::styled(
                            format!("  {} messages", c.message_count),
                            Style::default().fg(self.theme.dim),
                        ),
                    ]),
                    Line::from(Span::styled(
                        format!("  {}", prompt.chars().take(80).collect::<String>()),
                        Style::default().fg(self.theme.fg),
                    )),
                ])
            })
            .collect();

        let mut state = ListState::default();
        state.select(Some(selected));
        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Resume a conversation (Enter pick, Esc skip) ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.accent)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut state);
    }
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
