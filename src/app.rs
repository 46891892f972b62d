use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::collections::HashMap;

use crate::actions::Action;
use crate::activity::{infer_activity, strip_ansi, Activity};
use crate::dispatch::AgentKey;
use crate::logtail::LogWindow;
use crate::view::DisplayAgent;

/// Theme colors inspired by Claude Code
pub struct Theme {
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
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// What the client is currently waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    PollStarted,
    PollFinished,
    MutationStarted,
    MutationFinished,
}

impl Phase {
    /// A running mutation is never masked by a poll starting or ending
    pub fn next(self, event: PhaseEvent) -> Phase {
        match (self, event) {
            (_, PhaseEvent::MutationStarted) => Phase::Mutating,
            (Phase::Mutating, PhaseEvent::MutationFinished) => Phase::Idle,
            (Phase::Mutating, _) => Phase::Mutating,
            (Phase::Idle, PhaseEvent::PollStarted) => Phase::Polling,
            (Phase::Polling, PhaseEvent::PollFinished) => Phase::Idle,
            (phase, _) => phase,
        }
    }
}

/// How the footer renders the current message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Creating,
    Typing,
    Confirming,
}

/// Watch client state
pub struct App {
    /// Live agents, sorted by port
    pub agents: Vec<DisplayAgent>,
    pub mesh_address: String,
    /// Currently selected agent index
    pub list_state: ListState,
    /// Latest log window of the selected agent
    pub log: Option<LogWindow>,
    /// Last inferred activity per port
    pub activity: HashMap<u16, Activity>,
    /// Current footer message
    pub message: Option<(Severity, String)>,
    pub phase: Phase,
    /// Theme
    pub theme: Theme,
    /// Current input mode
    pub input_mode: InputMode,
    /// Text input buffer
    pub input_buffer: String,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            agents: Vec::new(),
            mesh_address: String::new(),
            list_state,
            log: None,
            activity: HashMap::new(),
            message: None,
            phase: Phase::Idle,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected agent
    pub fn selected_agent(&self) -> Option<&DisplayAgent> {
        self.list_state.selected().and_then(|i| self.agents.get(i))
    }

    pub fn selected_port(&self) -> Option<u16> {
        self.selected_agent().map(|a| a.port)
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    fn advance(&mut self, event: PhaseEvent) {
        self.phase = self.phase.next(event);
    }

    /// Queue a side-effecting action and mark the client busy
    fn mutate(&mut self, action: Action) {
        self.advance(PhaseEvent::MutationStarted);
        self.pending_actions.push(action);
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => return self.handle_key(key),
            Action::PollStarted => self.advance(PhaseEvent::PollStarted),
            Action::AgentsUpdated(listing) => {
                self.advance(PhaseEvent::PollFinished);
                let previous = self.selected_port();
                self.agents = listing.agents;
                self.agents.sort_by_key(|a| a.port);
                self.mesh_address = listing.mesh_address;
                if let Some(error) = listing.error {
                    self.message = Some((Severity::Error, error));
                }
                self.activity.retain(|port, _| self.agents.iter().any(|a| a.port == *port));
                self.reselect(previous);
            }
            Action::LogUpdated(window) => {
                if Some(window.port) == self.selected_port() {
                    self.activity.insert(window.port, infer_activity(&window.content));
                    self.log = Some(window);
                }
            }
            Action::MutationDone(result) => {
                self.advance(PhaseEvent::MutationFinished);
                self.message = Some(match result {
                    Ok(msg) => (Severity::Info, msg),
                    Err(e) => (Severity::Error, format!("Failed: {}", e.trim())),
                });
                self.pending_actions.push(Action::Refresh);
            }
            _ => {}
        }
        Ok(false)
    }

    /// Keep the same agent selected across a refresh when it still exists
    fn reselect(&mut self, previous: Option<u16>) {
        if self.agents.is_empty() {
            self.list_state.select(Some(0));
            self.log = None;
            return;
        }
        let index = previous
            .and_then(|port| self.agents.iter().position(|a| a.port == port))
            .unwrap_or_else(|| {
                self.list_state
                    .selected()
                    .unwrap_or(0)
                    .min(self.agents.len() - 1)
            });
        self.list_state.select(Some(index));
        if self.selected_port() != previous {
            self.log = None;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear message on any key press
        if self.message.is_some() && self.input_mode == InputMode::Normal {
            self.message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Creating | InputMode::Typing => self.handle_text_key(key),
            InputMode::Confirming => self.handle_confirming_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.select_offset(1),
            KeyCode::Char('k') | KeyCode::Up => self.select_offset(-1),
            KeyCode::Char('r') => self.pending_actions.push(Action::Refresh),
            // One mutation at a time
            _ if self.phase == Phase::Mutating => {}
            KeyCode::Char('n') => {
                self.input_mode = InputMode::Creating;
                self.input_buffer.clear();
            }
            KeyCode::Char('d') => {
                if self.selected_agent().is_some() {
                    self.input_mode = InputMode::Confirming;
                }
            }
            KeyCode::Char('i') => {
                if self.selected_agent().is_some() {
                    self.input_mode = InputMode::Typing;
                    self.input_buffer.clear();
                }
            }
            KeyCode::Char('e') => self.send_key(AgentKey::Esc),
            KeyCode::Char('x') => self.send_key(AgentKey::CtrlC),
            KeyCode::Enter => self.send_key(AgentKey::Enter),
            _ => {}
        }
        Ok(false)
    }

    fn send_key(&mut self, key: AgentKey) {
        if let Some(port) = self.selected_port() {
            self.mutate(Action::SendKey(port, key));
        }
    }

    fn handle_text_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input_buffer);
                let mode = self.input_mode.clone();
                match (mode, self.selected_port()) {
                    (InputMode::Creating, _) => {
                        let name = text.trim();
                        if name.is_empty() {
                            self.message =
                                Some((Severity::Error, "Task name is required".to_string()));
                        } else {
                            self.mutate(Action::StartAgent(name.to_string()));
                        }
                    }
                    (InputMode::Typing, Some(port)) => self.mutate(Action::SendText(port, text)),
                    _ => {}
                }
                self.input_mode = InputMode::Normal;
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
        Ok(false)
    }

    fn handle_confirming_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(port) = self.selected_port() {
                    self.mutate(Action::StopAgent(port));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    /// Move the selection, wrapping at both ends
    fn select_offset(&mut self, delta: isize) {
        if self.agents.is_empty() {
            return;
        }
        let len = self.agents.len() as isize;
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        if self.list_state.selected() != Some(next) {
            self.log = None;
        }
        self.list_state.select(Some(next));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        // Render modal dialogs on top
        match self.input_mode {
            InputMode::Creating => self.render_input_dialog(frame, " Start Agent ", "Task name:"),
            InputMode::Typing => self.render_input_dialog(frame, " Send Input ", "Text (sent with Enter):"),
            InputMode::Confirming => self.render_confirm_dialog(frame),
            InputMode::Normal => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let phase = match self.phase {
            Phase::Idle => Span::styled("", Style::default()),
            Phase::Polling => Span::styled(" ⟳ refreshing", Style::default().fg(self.theme.dim)),
            Phase::Mutating => Span::styled(" ● working", Style::default().fg(self.theme.warning)),
        };
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " AgentHUD ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ {} agents on {}", self.agents.len(), self.mesh_address),
                Style::default().fg(self.theme.dim),
            ),
            phase,
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
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(30), // Agent list
                Constraint::Percentage(70), // Detail and log
            ])
            .split(area);

        self.render_agent_list(frame, chunks[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(8), Constraint::Min(0)])
            .split(chunks[1]);
        self.render_detail_pane(frame, right[0]);
        self.render_log_pane(frame, right[1]);
    }

    fn activity_icon(&self, port: u16) -> Span<'static> {
        match self.activity.get(&port).copied().unwrap_or_default() {
            Activity::Busy => Span::styled("● ", Style::default().fg(self.theme.warning)),
            Activity::Idle => Span::styled("● ", Style::default().fg(self.theme.success)),
            Activity::WaitingForInput => Span::styled("? ", Style::default().fg(self.theme.accent)),
            Activity::Error => Span::styled("✗ ", Style::default().fg(self.theme.error)),
            Activity::Unknown => Span::styled("○ ", Style::default().fg(self.theme.dim)),
        }
    }

    fn render_agent_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.agents.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No agents running. Press 'n' to start one.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.agents
                .iter()
                .map(|agent| {
                    ListItem::new(Line::from(vec![
                        self.activity_icon(agent.port),
                        Span::styled(agent.name.clone(), Style::default().fg(self.theme.fg)),
                        Span::styled(format!(" :{}", agent.port), Style::default().fg(self.theme.dim)),
                    ]))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Agents ")
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

    fn detail_line<'a>(&self, label: &'a str, value: String) -> Line<'a> {
        Line::from(vec![
            Span::styled(label, Style::default().fg(self.theme.dim)),
            Span::styled(value, Style::default().fg(self.theme.fg)),
        ])
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let content = match self.selected_agent() {
            Some(agent) => {
                let workdir = if agent.is_worktree {
                    format!("{} (worktree of {})", agent.workdir, agent.original_workdir)
                } else {
                    agent.workdir.clone()
                };
                vec![
                    self.detail_line("Task: ", agent.name.clone()),
                    self.detail_line("URL: ", agent.url.clone()),
                    self.detail_line("Dir: ", workdir),
                    self.detail_line("Session: ", agent.session_name.clone()),
                    self.detail_line("Started: ", agent.started.clone()),
                    self.detail_line(
                        "Activity: ",
                        format!("{:?}", self.activity.get(&agent.port).copied().unwrap_or_default()),
                    ),
                ]
            }
            None => vec![Line::from(Span::styled(
                "No agent selected",
                Style::default().fg(self.theme.dim),
            ))],
        };

        let detail = Paragraph::new(content).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn render_log_pane(&self, frame: &mut Frame, area: Rect) {
        let (title, text) = match &self.log {
            Some(window) => {
                // Show only what fits, newest at the bottom
                let clean = strip_ansi(&window.content);
                let visible = area.height.saturating_sub(2) as usize;
                let lines: Vec<&str> = clean.lines().collect();
                let tail = lines[lines.len().saturating_sub(visible)..].join("\n");
                let updated = window
                    .last_modified
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "no output yet".to_string());
                (
                    format!(" Log ({} lines, {}) ", window.total_lines, updated),
                    tail,
                )
            }
            None => (" Log ".to_string(), String::new()),
        };

        let log = Paragraph::new(text)
            .style(Style::default().fg(self.theme.fg))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            );
        frame.render_widget(log, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ n: New │ d: Stop │ i: Input │ Enter/e/x: Enter/Esc/Ctrl-C │ r: Refresh ";

        let content = if let Some((severity, msg)) = &self.message {
            let style = match *severity {
                Severity::Error => Style::default().fg(self.theme.error),
                Severity::Info => Style::default().fg(self.theme.success),
            };
            Line::from(Span::styled(format!(" {} ", msg.trim()), style))
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

    fn render_input_dialog(&self, frame: &mut Frame, title: &str, prompt: &str) {
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
            Line::from(Span::styled(prompt.to_string(), Style::default().fg(self.theme.fg))),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to submit, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        frame.render_widget(Paragraph::new(text), inner);
    }

    fn render_confirm_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Confirm Stop ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.error));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let label = self
            .selected_agent()
            .map(|a| format!("'{}' on port {}", a.name, a.port))
            .unwrap_or_else(|| "unknown".to_string());

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Stop agent {}?", label),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Its tmux session and terminal will be torn down.",
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
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
