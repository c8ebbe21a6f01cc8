use std::collections::VecDeque;

use crossterm::event::Event as TermEvent;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use futures::StreamExt;
use ratatui::Frame;
use ratatui::layout::Constraint;
use ratatui::layout::Direction;
use ratatui::layout::Layout;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::text::Text;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::List;
use ratatui::widgets::ListItem;
use ratatui::widgets::Paragraph;
use ratatui::widgets::TableState;
use ratatui::widgets::Wrap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

use viddy_core::ControllerHandle;
use viddy_core::EngineEvent;
use viddy_core::Modes;
use viddy_core::SnapshotId;
use viddy_core::config::Config;

use crate::app_event::AppEvent;
use crate::app_event_sender::AppEventSender;
use crate::body_view;
use crate::help_view;
use crate::history_view;
use crate::history_view::HISTORY_PANE_WIDTH;
use crate::keymap;
use crate::keymap::Action;
use crate::keymap::Keymap;
use crate::status_line;
use crate::status_line::STATUS_WIDTH;
use crate::theme::Theme;
use crate::tui::Tui;

const MAX_LOG_LINES: usize = 500;

pub(crate) struct App {
    handle: ControllerHandle,
    keymap: Keymap,
    theme: Theme,
    command_line: String,
    interval_label: String,
    debug: bool,

    app_event_rx: UnboundedReceiver<AppEvent>,

    body: Text<'static>,
    body_scroll: u16,
    body_height: u16,
    query_input: String,
    log_lines: VecDeque<String>,
    table_state: TableState,
    should_quit: bool,
}

impl App {
    pub(crate) fn new(
        config: &Config,
        handle: ControllerHandle,
        engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
        log_rx: Option<mpsc::UnboundedReceiver<String>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = AppEventSender::new(tx);

        spawn_input_pump(sender.clone());
        spawn_engine_pump(sender.clone(), engine_rx);
        if let Some(log_rx) = log_rx {
            spawn_log_pump(sender, log_rx);
        }

        let mut command_line = vec![config.command.clone()];
        command_line.extend(config.args.iter().cloned());

        Self {
            handle,
            keymap: Keymap::from_config(&config.keymap),
            theme: Theme::from_config(&config.color),
            command_line: command_line.join(" "),
            interval_label: humantime::format_duration(config.interval).to_string(),
            debug: config.general.debug,
            app_event_rx: rx,
            body: Text::default(),
            body_scroll: 0,
            body_height: 0,
            query_input: String::new(),
            log_lines: VecDeque::new(),
            table_state: TableState::default(),
            should_quit: false,
        }
    }

    pub(crate) async fn run(&mut self, terminal: &mut Tui) -> std::io::Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| self.draw(frame))?;

            let Some(event) = self.app_event_rx.recv().await else {
                break;
            };
            self.handle_event(event);

            // Coalesce bursts so a busy engine does not force a draw per
            // message.
            while !self.should_quit {
                match self.app_event_rx.try_recv() {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                }
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Resize => {}
            AppEvent::Engine(event) => self.on_engine(event),
            AppEvent::LogLine(line) => {
                self.log_lines.push_back(line);
                while self.log_lines.len() > MAX_LOG_LINES {
                    self.log_lines.pop_front();
                }
            }
            AppEvent::ExitRequest => self.should_quit = true,
        }
    }

    fn on_engine(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SelectionChanged(id) => {
                self.body_scroll = 0;
                self.render_body(id);
            }
            EngineEvent::SnapshotFinished { id, .. } | EngineEvent::DiffComputed { id, .. } => {
                if self.handle.selected_id() == Some(id) {
                    self.render_body(id);
                }
            }
            EngineEvent::SnapshotAdded(_) => {}
        }
    }

    fn render_body(&mut self, id: SnapshotId) {
        let mut sink = Vec::new();
        match self.handle.render_snapshot(id, &mut sink) {
            Ok(()) => self.body = body_view::text_from_ansi(&sink),
            Err(err) => {
                // Not completed yet or already gone: clear the body.
                tracing::debug!(id, %err, "clearing body");
                self.body = Text::default();
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        let modes = self.handle.modes();

        if modes.is_edit_query {
            self.on_query_key(key);
            return;
        }

        if modes.show_help {
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => self.handle.set_show_help(false),
                KeyCode::Char('Q') => self.should_quit = true,
                _ => {}
            }
            return;
        }

        let stroke = keymap::normalize(&key);

        let mut any = false;
        for action in self.keymap.actions_for(stroke) {
            any = true;
            match action {
                Action::ToggleTimeMachine => self.handle.toggle_time_machine(),
                Action::GoToPast
                | Action::GoToFuture
                | Action::GoToMorePast
                | Action::GoToMoreFuture
                | Action::GoToNow
                | Action::GoToOldest => {
                    if !modes.is_time_machine {
                        continue;
                    }
                    match action {
                        Action::GoToPast => self.handle.go_to_past(),
                        Action::GoToFuture => self.handle.go_to_future(),
                        Action::GoToMorePast => self.handle.go_to_more_past(),
                        Action::GoToMoreFuture => self.handle.go_to_more_future(),
                        Action::GoToNow => self.handle.go_to_now(),
                        Action::GoToOldest => self.handle.go_to_oldest(),
                        Action::ToggleTimeMachine => {}
                    }
                }
            }
        }

        match key.code {
            KeyCode::Char('s') => self.handle.toggle_suspend(),
            KeyCode::Char('b') => self.handle.toggle_ring_bell(),
            KeyCode::Char('d') => self.handle.toggle_show_diff(),
            KeyCode::Char('t') => self.handle.toggle_no_title(),
            KeyCode::Char('u') => self.handle.toggle_unfold(),
            KeyCode::Char('x') => {
                if self.debug {
                    self.handle.set_show_log(!modes.show_log);
                }
            }
            KeyCode::Char('?') => self.handle.set_show_help(true),
            KeyCode::Char('/') => {
                if !modes.query.is_empty() {
                    self.query_input.clear();
                    self.handle.set_query(String::new());
                }
                self.handle.set_edit_query(true);
            }
            KeyCode::Char('q') | KeyCode::Char('Q') => self.should_quit = true,
            _ => {
                if !any {
                    self.on_pager_key(key);
                }
            }
        }
    }

    fn on_query_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => self.handle.set_edit_query(false),
            KeyCode::Backspace => {
                self.query_input.pop();
                self.handle.set_query(self.query_input.clone());
            }
            KeyCode::Char(c) => {
                self.query_input.push(c);
                self.handle.set_query(self.query_input.clone());
            }
            _ => {}
        }
    }

    fn on_pager_key(&mut self, key: KeyEvent) {
        let page = self.body_height.max(1);
        match (key.code, key.modifiers) {
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
                self.scroll_to(self.body_scroll.saturating_add(1));
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
                self.scroll_to(self.body_scroll.saturating_sub(1));
            }
            (KeyCode::Char('f'), KeyModifiers::CONTROL) | (KeyCode::PageDown, _) => {
                self.scroll_to(self.body_scroll.saturating_add(page));
            }
            (KeyCode::Char('b'), KeyModifiers::CONTROL) | (KeyCode::PageUp, _) => {
                self.scroll_to(self.body_scroll.saturating_sub(page));
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) => self.scroll_to(0),
            (KeyCode::Char('G'), _) => self.scroll_to(self.max_scroll()),
            _ => {}
        }
    }

    fn scroll_to(&mut self, target: u16) {
        self.body_scroll = target.min(self.max_scroll());
    }

    fn max_scroll(&self) -> u16 {
        let lines = self.body.lines.len() as u16;
        lines.saturating_sub(self.body_height.max(1))
    }

    fn draw(&mut self, frame: &mut Frame) {
        let modes = self.handle.modes();
        let area = frame.area();

        if modes.show_help {
            frame.render_widget(Paragraph::new(help_view::help_text(&self.keymap)), area);
            return;
        }

        let show_title = !modes.is_no_title;
        let show_log = self.debug && modes.show_log;

        let mut constraints: Vec<Constraint> = Vec::new();
        if show_title {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Min(0));
        constraints.push(Constraint::Length(1));
        if show_log {
            constraints.push(Constraint::Length(10));
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut index = 0;
        if show_title {
            self.draw_title(frame, chunks[index]);
            index += 1;
        }
        let middle = chunks[index];
        let bottom = chunks[index + 1];
        if show_log {
            self.draw_log(frame, chunks[index + 2]);
        }

        if modes.is_time_machine {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(0), Constraint::Length(HISTORY_PANE_WIDTH)])
                .split(middle);
            self.draw_body(frame, columns[0], &modes);
            self.draw_history(frame, columns[1]);
        } else {
            self.draw_body(frame, middle, &modes);
        }

        self.draw_bottom(frame, bottom, &modes);
    }

    fn titled_block(&self, title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.border))
            .title(title)
            .title_style(Style::default().fg(self.theme.title))
    }

    fn draw_title(&self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(10),
                Constraint::Min(0),
                Constraint::Length(21),
            ])
            .split(area);

        frame.render_widget(
            Paragraph::new(self.interval_label.clone()).block(self.titled_block("Every")),
            columns[0],
        );
        frame.render_widget(
            Paragraph::new(self.command_line.clone()).block(self.titled_block("Command")),
            columns[1],
        );

        let time = self
            .handle
            .selected_id()
            .and_then(|id| self.handle.start_time_of(id))
            .map(|start| start.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        frame.render_widget(
            Paragraph::new(time).block(self.titled_block("Time")),
            columns[2],
        );
    }

    fn draw_body(&mut self, frame: &mut Frame, area: Rect, modes: &Modes) {
        // The runner sizes PTYs from the width published here; running
        // children keep the width they started with.
        self.handle.set_body_width(area.width);
        self.body_height = area.height;

        let mut body = Paragraph::new(self.body.clone())
            .style(Style::default().fg(self.theme.text))
            .scroll((self.body_scroll, 0));
        if !modes.unfold {
            body = body.wrap(Wrap { trim: false });
        }
        frame.render_widget(body, area);
    }

    fn draw_history(&mut self, frame: &mut Frame, area: Rect) {
        let rows = self.handle.history_rows();
        let selected = self
            .handle
            .selected_id()
            .and_then(|id| rows.iter().position(|row| row.id == id));
        self.table_state.select(selected);

        let table = history_view::history_table(&rows, &self.theme);
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_bottom(&self, frame: &mut Frame, area: Rect, modes: &Modes) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(STATUS_WIDTH)])
            .split(area);

        if modes.is_edit_query || !modes.query.is_empty() {
            let mut spans = vec![Span::raw("/"), Span::raw(self.query_input.clone())];
            if modes.is_edit_query {
                spans.push(Span::styled(
                    " ",
                    Style::default().bg(self.theme.contrast_background),
                ));
            }
            frame.render_widget(Paragraph::new(Line::from(spans)), columns[0]);
        }

        frame.render_widget(
            Paragraph::new(status_line::status_line(modes)),
            columns[1],
        );
    }

    fn draw_log(&self, frame: &mut Frame, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem<'static>> = self
            .log_lines
            .iter()
            .rev()
            .take(visible.max(1))
            .rev()
            .map(|line| ListItem::new(line.clone()))
            .collect();
        frame.render_widget(List::new(items).block(self.titled_block("Log")), area);
    }
}

fn spawn_input_pump(sender: AppEventSender) {
    tokio::spawn(async move {
        let mut events = crossterm::event::EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(TermEvent::Key(key)) => sender.send(AppEvent::Key(key)),
                Ok(TermEvent::Resize(_, _)) => sender.send(AppEvent::Resize),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "terminal input stream failed");
                    sender.send(AppEvent::ExitRequest);
                    return;
                }
            }
        }
    });
}

fn spawn_engine_pump(sender: AppEventSender, mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>) {
    tokio::spawn(async move {
        while let Some(event) = engine_rx.recv().await {
            sender.send(AppEvent::Engine(event));
        }
    });
}

fn spawn_log_pump(sender: AppEventSender, mut log_rx: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(line) = log_rx.recv().await {
            sender.send(AppEvent::LogLine(line));
        }
    });
}
