use crate::client::AgentClient;
use crate::protocol::{ChatTurn, SourceRef};
use crate::query::Filters;
use crate::report;
use crate::session::{self, SessionEvent, SessionState, ERR_REPORT_FETCH};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type UiResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const INPUT_TITLE: &str = " Query (Enter to run, Ctrl-S to save report, Esc to quit) ";

pub struct AppConfig {
    pub client: AgentClient,
    pub filters: Filters,
    pub output_dir: PathBuf,
    pub initial_query: Option<String>,
}

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug)]
enum UiEvent {
    /// A stream event tagged with the run generation that produced it.
    Session(u64, SessionEvent),
    Downloaded(Result<Option<PathBuf>, report::DownloadError>),
}

/// Single-line editor for the query bar.
struct InputLine {
    chars: Vec<char>,
    cursor: usize,
}

impl InputLine {
    fn new() -> Self {
        Self {
            chars: Vec::new(),
            cursor: 0,
        }
    }

    fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.chars.remove(self.cursor - 1);
            self.cursor -= 1;
        }
    }

    fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_right(&mut self) {
        if self.cursor < self.chars.len() {
            self.cursor += 1;
        }
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.chars.len();
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn take(&mut self) -> String {
        let text: String = self.chars.drain(..).collect();
        self.cursor = 0;
        text
    }

    fn render(&self) -> Text<'static> {
        if self.is_empty() {
            return Text::from(Span::styled(
                "What do you want to analyze?",
                Style::default().fg(Color::DarkGray),
            ));
        }
        Text::from(self.chars.iter().collect::<String>())
    }
}

struct App {
    client: Arc<AgentClient>,
    filters: Filters,
    output_dir: PathBuf,
    session: SessionState,
    input: InputLine,
    notice: Option<String>,
    report_scroll: u16,
    generation: u64,
    run_task: Option<JoinHandle<()>>,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    should_quit: bool,
}

impl App {
    fn new(client: AgentClient, filters: Filters, output_dir: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel(100);

        Self {
            client: Arc::new(client),
            filters,
            output_dir,
            session: SessionState::default(),
            input: InputLine::new(),
            notice: None,
            report_scroll: 0,
            generation: 0,
            run_task: None,
            sender,
            receiver,
            should_quit: false,
        }
    }

    /// Opens a new run. Any previous stream is closed by aborting its task;
    /// whatever events it had in flight fail the generation check and are
    /// dropped.
    fn start_run(&mut self, query_text: String) {
        if let Some(task) = self.run_task.take() {
            task.abort();
        }
        self.generation += 1;
        self.session = SessionState::start();
        self.notice = None;
        self.report_scroll = 0;

        let payload = self.filters.payload(query_text);
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        let generation = self.generation;
        // The stream task runs independently of the draw loop, so a busy or
        // obscured terminal never stalls the run.
        self.run_task = Some(tokio::spawn(async move {
            client
                .run(&payload, |event| {
                    let sender = sender.clone();
                    async move {
                        let _ = sender.send(UiEvent::Session(generation, event)).await;
                    }
                })
                .await;
        }));
    }

    fn start_download(&mut self) {
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        let job_id = self.session.job_id.clone();
        let dir = self.output_dir.clone();
        tokio::spawn(async move {
            let result = report::download(&client, job_id.as_deref(), &dir).await;
            let _ = sender.send(UiEvent::Downloaded(result)).await;
        });
    }

    fn apply_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Session(generation, event) if generation == self.generation => {
                session::apply(&mut self.session, event);
            }
            UiEvent::Session(..) => {}
            UiEvent::Downloaded(Ok(Some(path))) => {
                self.notice = Some(format!("Report saved to {}", path.display()));
            }
            UiEvent::Downloaded(Ok(None)) => {}
            UiEvent::Downloaded(Err(err)) => {
                tracing::warn!(%err, "report download failed");
                self.session.error = Some(ERR_REPORT_FETCH.to_string());
            }
        }
    }

    fn handle_events(&mut self) -> UiResult<bool> {
        while let Ok(event) = self.receiver.try_recv() {
            self.apply_ui_event(event);
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    match key.code {
                        KeyCode::Char('c') => {
                            self.should_quit = true;
                            return Ok(false);
                        }
                        KeyCode::Char('s') => self.start_download(),
                        _ => {}
                    }
                    return Ok(true);
                }

                match key.code {
                    KeyCode::Esc => {
                        self.should_quit = true;
                        return Ok(false);
                    }
                    KeyCode::Enter => {
                        if !self.input.is_empty() {
                            let query_text = self.input.take();
                            self.start_run(query_text);
                        }
                    }
                    KeyCode::Char(c) => self.input.insert(c),
                    KeyCode::Backspace => self.input.backspace(),
                    KeyCode::Left => self.input.move_left(),
                    KeyCode::Right => self.input.move_right(),
                    KeyCode::Home => self.input.move_home(),
                    KeyCode::End => self.input.move_end(),
                    KeyCode::Up => self.report_scroll = self.report_scroll.saturating_sub(1),
                    KeyCode::Down => self.report_scroll = self.report_scroll.saturating_add(1),
                    KeyCode::PageUp => self.report_scroll = self.report_scroll.saturating_sub(10),
                    KeyCode::PageDown => {
                        self.report_scroll = self.report_scroll.saturating_add(10)
                    }
                    _ => {}
                }
            }
        }

        Ok(true)
    }

    fn draw(&self, f: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
            ])
            .split(f.area());

        let input_paragraph = Paragraph::new(self.input.render()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(INPUT_TITLE)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(input_paragraph, outer[0]);

        let cursor_x = (outer[0].x + 1 + self.input.cursor as u16)
            .min(outer[0].x + outer[0].width.saturating_sub(2));
        f.set_cursor_position((cursor_x, outer[0].y + 1));

        let filters_line = Paragraph::new(Line::from(Span::styled(
            self.filters.summary(),
            Style::default().fg(Color::DarkGray),
        )));
        f.render_widget(filters_line, outer[1]);

        f.render_widget(self.status_paragraph(), outer[2]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(outer[3]);

        self.draw_activity(f, body[0]);
        self.draw_citations(f, body[1]);
    }

    fn status_paragraph(&self) -> Paragraph<'_> {
        let style = if self.session.error.is_some() {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else if self.session.is_running {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };

        let mut spans = vec![Span::styled(self.session.status_line(), style)];
        if let Some(notice) = &self.notice {
            spans.push(Span::raw("  ·  "));
            spans.push(Span::styled(notice.as_str(), Style::default().fg(Color::Green)));
        }
        Paragraph::new(Line::from(spans))
    }

    fn draw_activity(&self, f: &mut Frame, area: Rect) {
        if self.session.report.is_empty() {
            self.draw_messages(f, area);
            return;
        }

        let halves = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        self.draw_messages(f, halves[0]);

        let report = Paragraph::new(self.session.report.clone())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Report (Up/Down to scroll) "),
            )
            .wrap(Wrap { trim: false })
            .scroll((self.report_scroll, 0));
        f.render_widget(report, halves[1]);
    }

    fn draw_messages(&self, f: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" Agent activity ");

        if self.session.messages.is_empty() {
            let placeholder = Paragraph::new(Span::styled(
                "No messages yet. Run a query to see the analysis.",
                Style::default().fg(Color::DarkGray),
            ))
            .block(block)
            .wrap(Wrap { trim: false });
            f.render_widget(placeholder, area);
            return;
        }

        let items: Vec<ListItem> = self.session.messages.iter().map(message_item).collect();
        f.render_widget(List::new(items).block(block), area);
    }

    fn draw_citations(&self, f: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" Sources ");

        if self.session.citations.is_empty() {
            let placeholder = Paragraph::new(Span::styled(
                "Sources will appear here.",
                Style::default().fg(Color::DarkGray),
            ))
            .block(block)
            .wrap(Wrap { trim: false });
            f.render_widget(placeholder, area);
            return;
        }

        let items: Vec<ListItem> = self.session.citations.iter().map(citation_item).collect();
        f.render_widget(List::new(items).block(block), area);
    }
}

fn message_item(turn: &ChatTurn) -> ListItem<'static> {
    let style = match turn.role.as_str() {
        "status" => Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::ITALIC),
        "user" => Style::default().fg(Color::Blue),
        _ => Style::default().fg(Color::Yellow),
    };
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{}: ", turn.role),
            style.add_modifier(Modifier::BOLD),
        ),
        Span::styled(turn.content.clone(), style),
    ]))
}

fn citation_item(source: &SourceRef) -> ListItem<'static> {
    ListItem::new(Text::from(vec![
        Line::from(vec![
            Span::styled(
                format!("[{}] ", source.kind),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(
                source.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(
            format!("  {}", source.url),
            Style::default().fg(Color::DarkGray),
        )),
    ]))
}

pub fn run(config: AppConfig) -> UiResult<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let _guard = TerminalGuard;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let AppConfig {
        client,
        filters,
        output_dir,
        initial_query,
    } = config;
    let mut app = App::new(client, filters, output_dir);

    if let Some(query_text) = initial_query {
        app.start_run(query_text);
    }

    terminal.draw(|f| app.draw(f))?;

    while !app.should_quit {
        if !app.handle_events()? {
            break;
        }

        terminal.draw(|f| app.draw(f))?;

        std::thread::sleep(Duration::from_millis(10));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StateSnapshot;

    fn test_app() -> App {
        let filters = Filters::build(
            &["AAPL".to_string()],
            &[],
            &["10-K".to_string()],
            &[2024],
        )
        .unwrap();
        App::new(
            AgentClient::new("http://localhost:0"),
            filters,
            PathBuf::from("."),
        )
    }

    #[test]
    fn input_line_edits_around_the_cursor() {
        let mut input = InputLine::new();
        for c in "growth".chars() {
            input.insert(c);
        }
        input.move_left();
        input.backspace();
        assert_eq!(input.take(), "growh");
        assert!(input.is_empty());
    }

    #[test]
    fn stale_session_events_are_discarded() {
        let mut app = test_app();
        app.generation = 2;
        app.session = SessionState::start();

        app.apply_ui_event(UiEvent::Session(
            1,
            SessionEvent::Snapshot(StateSnapshot {
                messages: Some(vec![ChatTurn {
                    role: "status".to_string(),
                    content: "from a dead run".to_string(),
                }]),
                ..Default::default()
            }),
        ));
        assert!(app.session.messages.is_empty());

        app.apply_ui_event(UiEvent::Session(
            2,
            SessionEvent::Snapshot(StateSnapshot {
                messages: Some(vec![ChatTurn {
                    role: "status".to_string(),
                    content: "current".to_string(),
                }]),
                ..Default::default()
            }),
        ));
        assert_eq!(app.session.messages.len(), 1);
    }

    #[test]
    fn download_failure_surfaces_the_fixed_message() {
        let mut app = test_app();
        app.apply_ui_event(UiEvent::Downloaded(Err(
            report::DownloadError::Write(io::Error::other("disk full")),
        )));
        assert_eq!(app.session.error.as_deref(), Some(ERR_REPORT_FETCH));
    }
}
