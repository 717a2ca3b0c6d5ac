use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use deductive_coder_config::Config;
use deductive_coder_engine::coding::{
    CodingSession, HighlightLayout, RawSelection, Segment, SelectionProvider, resolve_selection,
};
use deductive_coder_engine::export::{ExportFormat, ExportMetadata, ExportOptions, render};
use deductive_coder_engine::io;
use deductive_coder_engine::suggest::{
    CodeSuggestion, SuggestConfig, SuggestError, SuggestionClient,
};
use deductive_coder_engine::{CodeId, coding::SuggestionToken};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use std::{
    env,
    io::stdout,
    path::{Path, PathBuf},
    process,
    sync::{Arc, mpsc},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

type SuggestionOutcome = (SuggestionToken, Result<Vec<CodeSuggestion>, SuggestError>);

enum Mode {
    Normal,
    Search { query: String },
}

/// Selection by search: the terminal has no mouse text selection, so the
/// user types a query and the provider reports the next occurrence as a
/// raw selection over the rendered text. The offset mapper turns that
/// into canonical offsets like it would for any other surface.
struct SearchSelectionProvider<'a> {
    rendered: &'a str,
    query: &'a str,
    from: usize,
}

impl SelectionProvider for SearchSelectionProvider<'_> {
    fn current_selection(&self) -> Option<RawSelection> {
        if self.query.is_empty() {
            return None;
        }
        let from = self.from.min(self.rendered.len());
        // Search forward from the last selection, wrapping to the top.
        let start = self.rendered[from..]
            .find(self.query)
            .map(|i| i + from)
            .or_else(|| self.rendered.find(self.query))?;
        Some(RawSelection {
            anchor_offset: start,
            focus_offset: start + self.query.len(),
            container_start: 0,
        })
    }
}

struct App {
    session: CodingSession,
    document_name: String,
    framework_name: String,
    paragraph_view: bool,
    selected_codes: Vec<CodeId>,
    mode: Mode,
    search_from: usize,
    scroll: u16,
    status: String,
    suggestion_client: Option<Arc<SuggestionClient>>,
    suggestion_tx: mpsc::Sender<SuggestionOutcome>,
    suggestion_rx: mpsc::Receiver<SuggestionOutcome>,
    runtime: tokio::runtime::Runtime,
}

impl App {
    fn new(
        session: CodingSession,
        document_name: String,
        framework_name: String,
        suggestion_client: Option<SuggestionClient>,
    ) -> Result<Self> {
        let (suggestion_tx, suggestion_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            session,
            document_name,
            framework_name,
            paragraph_view: false,
            selected_codes: Vec::new(),
            mode: Mode::Normal,
            search_from: 0,
            scroll: 0,
            status: "Press / to search for text to code".to_string(),
            suggestion_client: suggestion_client.map(Arc::new),
            suggestion_tx,
            suggestion_rx,
            runtime,
        })
    }

    fn commit_search(&mut self, query: &str) {
        let range = {
            let provider = SearchSelectionProvider {
                rendered: self.session.document().text(),
                query,
                from: self.search_from,
            };
            provider
                .current_selection()
                .and_then(|raw| resolve_selection(self.session.document(), &raw))
        };

        match range {
            Some(range) => {
                self.search_from = range.end;
                match self.session.select(range) {
                    Ok(_) => {
                        self.selected_codes.clear();
                        let pending = self.session.pending();
                        let text = pending.map_or(String::new(), |p| p.text.clone());
                        self.status = format!("Selected \"{}\" - toggle codes, then c to apply", text);
                    }
                    Err(err) => self.status = err.to_string(),
                }
            }
            None => self.status = format!("\"{query}\" not found"),
        }
    }

    fn toggle_code(&mut self, index: usize) {
        let Some(code) = self.session.codebook().codes().get(index) else {
            return;
        };
        let id = code.id.clone();
        let name = code.name.clone();
        if self.selected_codes.contains(&id) {
            self.selected_codes.retain(|existing| existing != &id);
            self.status = format!("Removed {name}");
        } else {
            self.selected_codes.push(id);
            self.status = format!("Added {name}");
        }
    }

    fn confirm(&mut self) {
        match self.session.confirm_codes(&self.selected_codes) {
            Ok(_) => {
                self.selected_codes.clear();
                self.status = "Codes applied".to_string();
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn cancel(&mut self) {
        self.session.cancel();
        self.selected_codes.clear();
        self.status = "Selection canceled".to_string();
    }

    fn delete_last_span(&mut self) {
        let last = self.session.spans().spans().last().map(|span| span.id);
        match last {
            Some(id) => {
                self.session.remove_span(&id);
                self.status = "Removed last coded segment".to_string();
            }
            None => self.status = "No coded segments to remove".to_string(),
        }
    }

    fn request_suggestions(&mut self) {
        let Some(pending) = self.session.pending() else {
            self.status = "Select text before requesting suggestions".to_string();
            return;
        };
        let Some(client) = &self.suggestion_client else {
            self.status = "AI suggestions unavailable: OPENROUTER_API_KEY is not set".to_string();
            return;
        };

        let token = pending.token();
        let text = pending.text.clone();
        let context = pending.context.clone();
        let codebook = self.session.codebook().clone();
        let client = Arc::clone(client);
        let tx = self.suggestion_tx.clone();

        // Fire and forget: the task reports back over the channel and the
        // session decides on receipt whether the token is still current.
        self.runtime.spawn(async move {
            let result = client.suggest(&codebook, &text, &context).await;
            let _ = tx.send((token, result));
        });
        self.status = "Requesting AI suggestions...".to_string();
    }

    fn poll_suggestions(&mut self) {
        while let Ok((token, result)) = self.suggestion_rx.try_recv() {
            match result {
                Ok(suggestions) => {
                    let count = suggestions.len();
                    if self.session.offer_suggestions(token, suggestions) {
                        self.status = match count {
                            0 => "No AI suggestions for this selection".to_string(),
                            n => format!("{n} AI suggestion(s) - toggle codes to accept"),
                        };
                    }
                }
                Err(err) => {
                    tracing::warn!("suggestion request failed: {err}");
                    // Recover as "zero suggestions"; surface the error as
                    // advisory text only if the selection is still current.
                    if self.session.offer_suggestions(token, Vec::new()) {
                        self.status = format!("AI suggestions unavailable: {err}");
                    }
                }
            }
        }
    }

    fn export_results(&mut self) -> Result<()> {
        let records = self.session.coded_segments();
        if records.is_empty() {
            self.status = "Nothing to export yet".to_string();
            return Ok(());
        }
        let stats = self.session.code_stats();
        let metadata = ExportMetadata {
            document: self.document_name.clone(),
            framework: self.framework_name.clone(),
            generated: chrono::Local::now().to_rfc3339(),
        };
        let options = ExportOptions::default();
        let date = chrono::Local::now().format("%Y-%m-%d");

        let mut written = Vec::new();
        for format in [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Text] {
            let content = render(format, &metadata, &records, &stats, &options)?;
            let filename = format!("coding-results-{date}.{}", format.extension());
            std::fs::write(&filename, content)?;
            written.push(filename);
        }
        self.status = format!("Exported {}", written.join(", "));
        Ok(())
    }
}

fn main() -> Result<()> {
    let _log_guard = init_tracing();

    // Determine input paths from CLI args or config file
    let args: Vec<String> = env::args().collect();
    let config_path = Config::config_path();

    let document_path;
    let framework_path;
    let mut model = None;

    if args.len() == 3 {
        document_path = PathBuf::from(&args[1]);
        framework_path = PathBuf::from(&args[2]);
    } else if args.len() == 1 {
        match Config::load() {
            Ok(Some(config)) => {
                document_path = config.document_path;
                framework_path = config.framework_path;
                model = config.model;
            }
            Ok(None) => {
                eprintln!("Error: No input files provided and no config file found");
                eprintln!("Usage: {} <document.txt> <framework.csv>", args[0]);
                eprintln!("Or create a config file at {}", config_path.display());
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: Failed to load config file: {e}");
                eprintln!("Usage: {} <document.txt> <framework.csv>", args[0]);
                process::exit(1);
            }
        }
    } else {
        eprintln!("Usage: {} [<document.txt> <framework.csv>]", args[0]);
        process::exit(1);
    }

    // Load inputs before touching the terminal so schema problems surface
    // as plain errors and no session starts on a broken framework.
    let document = match io::load_document(&document_path) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: Failed to load document '{}': {e}", document_path.display());
            process::exit(1);
        }
    };
    let codebook = match io::load_codebook(&framework_path) {
        Ok(codebook) => codebook,
        Err(e) => {
            eprintln!(
                "Error: Failed to load framework '{}': {e}",
                framework_path.display()
            );
            process::exit(1);
        }
    };

    let suggestion_client = match SuggestConfig::from_env(model) {
        Ok(config) => Some(SuggestionClient::new(config)),
        Err(e) => {
            tracing::info!("AI suggestions disabled: {e}");
            None
        }
    };

    let session = CodingSession::new(document, codebook);
    let mut app = App::new(
        session,
        display_name(&document_path),
        display_name(&framework_path),
        suggestion_client,
    )?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("deductive-coder.log")
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    loop {
        app.poll_suggestions();
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match &mut app.mode {
            Mode::Search { query } => match key.code {
                KeyCode::Esc => {
                    app.mode = Mode::Normal;
                    app.status = "Search canceled".to_string();
                }
                KeyCode::Enter => {
                    let query = query.clone();
                    app.mode = Mode::Normal;
                    app.commit_search(&query);
                }
                KeyCode::Backspace => {
                    query.pop();
                }
                KeyCode::Char(c) => query.push(c),
                _ => {}
            },
            Mode::Normal => match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('/') => {
                    app.mode = Mode::Search {
                        query: String::new(),
                    };
                }
                KeyCode::Char('p') => app.paragraph_view = !app.paragraph_view,
                KeyCode::Char('c') => app.confirm(),
                KeyCode::Char('x') => app.cancel(),
                KeyCode::Char('d') => app.delete_last_span(),
                KeyCode::Char('a') => app.request_suggestions(),
                KeyCode::Char('e') => {
                    if let Err(e) = app.export_results() {
                        app.status = format!("Export failed: {e}");
                    }
                }
                KeyCode::Char(ch @ '1'..='9') => {
                    app.toggle_code(ch as usize - '1' as usize);
                }
                KeyCode::Down | KeyCode::Char('j') => app.scroll = app.scroll.saturating_add(1),
                KeyCode::Up | KeyCode::Char('k') => app.scroll = app.scroll.saturating_sub(1),
                _ => {}
            },
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(34), Constraint::Percentage(66)].as_ref())
        .split(outer[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(10)].as_ref())
        .split(columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(8)].as_ref())
        .split(columns[1]);

    render_codebook(f, app, left[0]);
    render_selection(f, app, left[1]);
    render_document(f, app, right[0]);
    render_results(f, app, right[1]);
    render_status(f, app, outer[1]);
}

fn render_codebook(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let stats = app.session.code_stats();
    let items: Vec<ListItem> = app
        .session
        .codebook()
        .codes()
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let marker = if app.selected_codes.contains(&code.id) {
                "[x]"
            } else {
                "[ ]"
            };
            let count = stats
                .iter()
                .find(|usage| usage.id == code.id)
                .map_or(0, |usage| usage.count);
            ListItem::new(Line::from(vec![
                Span::styled("● ", Style::default().fg(hex_to_color(&code.color))),
                Span::raw(format!("{} {} {} ({})", i + 1, marker, code.name, count)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Codebook - {}", app.framework_name)),
    );
    f.render_widget(list, area);
}

fn render_selection(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let mut lines: Vec<Line> = Vec::new();
    match app.session.pending() {
        Some(pending) => {
            lines.push(Line::from(Span::styled(
                format!("\"{}\"", pending.text),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!(
                "at {}..{}",
                pending.range.start, pending.range.end
            )));
            if !pending.suggestions().is_empty() {
                lines.push(Line::from("AI suggestions:"));
                for suggestion in pending.suggestions() {
                    let name = app
                        .session
                        .codebook()
                        .get(&suggestion.code_id)
                        .map_or("?", |code| code.name.as_str());
                    lines.push(Line::from(format!(
                        "  {} ({}/10) {}",
                        name, suggestion.confidence, suggestion.explanation
                    )));
                }
            }
        }
        None => lines.push(Line::from("No selection - press / to search")),
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Selection"))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_document(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let layout = app.session.layout(app.paragraph_view);
    let mut title = format!("Document - {}", app.document_name);
    if !layout.omitted.is_empty() {
        title.push_str(&format!(
            " ({} span(s) cross paragraph boundaries and are not shown)",
            layout.omitted.len()
        ));
    }

    let paragraph = Paragraph::new(layout_to_lines(&layout))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    f.render_widget(paragraph, area);
}

fn render_results(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let records = app.session.coded_segments();
    let items: Vec<ListItem> = records
        .iter()
        .rev()
        .map(|record| {
            let codes = record
                .codes
                .iter()
                .map(|code| code.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            ListItem::new(Line::from(format!("[{}] \"{}\"", codes, record.text)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Coded Segments ({})", records.len())),
    );
    f.render_widget(list, area);
}

fn render_status(f: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let line = match &app.mode {
        Mode::Search { query } => Line::from(vec![
            Span::styled("Search: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(query.clone()),
            Span::styled("▏", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            Span::raw("  (Enter: select | Esc: cancel)"),
        ]),
        Mode::Normal => Line::from(vec![
            Span::raw(app.status.clone()),
            Span::styled(
                "  /: search | 1-9: toggle code | c: apply | x: cancel | a: AI | d: delete | p: paragraphs | e: export | q: quit",
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    };

    let paragraph = Paragraph::new(vec![line]).block(Block::default().borders(Borders::ALL));
    f.render_widget(paragraph, area);
}

/// Flatten the composed layout into styled terminal lines. Blocks
/// partition the document, so their segments concatenate back into the
/// full text; newlines inside segments become line breaks.
fn layout_to_lines(layout: &HighlightLayout) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current: Vec<Span> = Vec::new();

    for block in &layout.blocks {
        for segment in &block.segments {
            let style = match segment {
                Segment::Plain { .. } => Style::default(),
                Segment::Highlighted { color, .. } => Style::default()
                    .fg(Color::Black)
                    .bg(hex_to_color(color)),
            };
            let mut parts = segment.text().split('\n');
            if let Some(first) = parts.next() {
                if !first.is_empty() {
                    current.push(Span::styled(first.to_string(), style));
                }
                for part in parts {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    if !part.is_empty() {
                        current.push(Span::styled(part.to_string(), style));
                    }
                }
            }
        }
    }
    lines.push(Line::from(current));
    lines
}

fn hex_to_color(hex: &str) -> Color {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Color::Blue;
    }
    match (
        u8::from_str_radix(&hex[0..2], 16),
        u8::from_str_radix(&hex[2..4], 16),
        u8::from_str_radix(&hex[4..6], 16),
    ) {
        (Ok(r), Ok(g), Ok(b)) => Color::Rgb(r, g, b),
        _ => Color::Blue,
    }
}
