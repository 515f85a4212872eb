mod app;
mod catalog;
mod change;
mod config;
mod context;
mod error;
mod patch;
mod session;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{App, InputMode};
use change::{AgentRewriter, ChangeState, CommitOutcome};
use clap::Parser;
use context::OutputFormat;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use session::{Session, SessionStore};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use watch::{FileWatcher, WatchEvent};

/// Pack project files into AI context and review AI-proposed rewrites
#[derive(Parser)]
#[command(name = "cf", version, about)]
struct Cli {
    /// Project directory to open (defaults to current directory)
    path: Option<PathBuf>,

    /// Output format for the assembled context
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Pre-apply a filter expression (e.g. '+*.rs,-*.lock' or a preset like 'backend')
    #[arg(long)]
    filter: Option<String>,

    /// Pre-apply a path search
    #[arg(long)]
    search: Option<String>,

    /// Only show files of this language (e.g. 'rust')
    #[arg(long)]
    lang: Option<String>,

    /// Write the context document to the download directory and exit
    #[arg(long)]
    export: bool,

    /// Print the token estimate of the current selection and exit
    #[arg(long)]
    tokens: bool,

    /// Load a unified diff file into the viewer
    #[arg(long, value_name = "FILE")]
    patch: Option<PathBuf>,

    /// With --patch: print per-file +adds -dels and exit
    #[arg(long, requires = "patch")]
    stat: bool,

    /// Reconstruct this project file from --fragment and print the preview
    #[arg(long, value_name = "PATH", requires = "fragment")]
    apply: Option<String>,

    /// File holding the proposed change for --apply
    #[arg(long, value_name = "FILE")]
    fragment: Option<PathBuf>,

    /// With --apply: commit the change after printing the preview
    #[arg(long, requires = "apply")]
    yes: bool,

    /// Allow writing confirmed changes back to project files
    #[arg(long)]
    write: bool,

    /// Restore the saved session for this project
    #[arg(long)]
    resume: bool,

    /// Write the current configuration to the global config file and exit
    #[arg(long)]
    init_config: bool,
}

fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off"));
    // The TUI owns the terminal, so logs only go somewhere when asked
    match std::env::var_os("CF_LOG_FILE") {
        Some(path) => match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {:?}: {}", path, e),
        },
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }
    builder.init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    // --stat needs no project
    if cli.stat {
        if let Some(ref path) = cli.patch {
            return print_patch_stat(path);
        }
    }

    let root = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = config::load_config(&root);

    if cli.init_config {
        let path = config::save_config(&config)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let store = SessionStore::default_location();
    let previous_session = match (&store, cli.resume) {
        (Some(store), true) => store.load_for_root(&root)?,
        _ => None,
    };

    let mut app = match previous_session {
        Some(ref session) => {
            if cli.write {
                eprintln!("Write access is not restored with --resume; changes will be saved as downloads");
            }
            App::resume(&root, config, session)?
        }
        None => {
            if cli.resume {
                eprintln!("No saved session for {}", root.display());
            }
            App::open(&root, config, cli.write)?
        }
    };

    if let Some(format) = cli.format {
        app.format = format;
    }
    if let Some(ref expr) = cli.filter {
        app.apply_filter_expr(expr);
    }
    if let Some(ref query) = cli.search {
        app.set_search(query);
    }
    if let Some(ref lang) = cli.lang {
        app.filter.language = Some(lang.clone());
    }
    app.refresh_token_estimate();

    if run_headless(&cli, &mut app)? {
        return Ok(());
    }

    if let Some(ref path) = cli.patch {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        app.load_patch(&raw);
    }

    // Load syntax highlighting (once, reused for all files)
    let highlighter = ui::highlight::Highlighter::new();

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &highlighter, store.as_ref(), previous_session);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

// ── Headless modes ──

/// Run the one-shot modes. Returns true if one ran and the TUI should not start.
fn run_headless(cli: &Cli, app: &mut App) -> Result<bool> {
    if let Some(ref target) = cli.apply {
        let Some(ref fragment_path) = cli.fragment else {
            anyhow::bail!("--apply needs --fragment <FILE>");
        };
        let fragment = std::fs::read_to_string(fragment_path)
            .with_context(|| format!("Failed to read {}", fragment_path.display()))?;
        apply_change(app, target, &fragment, cli.yes)?;
        return Ok(true);
    }

    if !(cli.export || cli.tokens) {
        return Ok(false);
    }

    // Without the tree, a filter narrows the selection itself
    if app.filter.is_active() {
        let hidden: Vec<String> = app
            .catalog
            .records()
            .iter()
            .filter(|r| !app.filter.matches(r))
            .map(|r| r.path.clone())
            .collect();
        app.catalog.set_selection(&hidden, false);
        app.refresh_token_estimate();
    }

    if cli.tokens {
        println!(
            "~{} tokens · {} files · {}",
            app.token_estimate,
            app.catalog.selected_count(),
            app.format.label()
        );
        if app.over_budget() {
            eprintln!("Over the token budget of {}", app.config.output.token_budget);
        }
    }
    if cli.export {
        let path = app.export_context()?;
        println!("{}", path.display());
    }
    Ok(true)
}

fn apply_change(app: &mut App, target: &str, fragment: &str, commit: bool) -> Result<()> {
    let rewriter = AgentRewriter::new(app.config.agent.clone());
    app.controller
        .reconstruct_with(&rewriter, &app.catalog, target, fragment)?;

    if let Some(preview) = app.controller.preview() {
        if preview.hunks.is_empty() {
            eprintln!("No changes to {}", target);
            return Ok(());
        }
        print!("{}", preview.to_text());
    }

    if !commit {
        eprintln!("Preview only; pass --yes to apply");
        return Ok(());
    }

    let dir = app.download_dir();
    match app.controller.confirm(&mut app.catalog, &app.caps, &dir)? {
        CommitOutcome::Written(path) => eprintln!("Wrote {}", path),
        CommitOutcome::Downloaded(path) => eprintln!("Saved {}", path.display()),
    }
    Ok(())
}

fn print_patch_stat(path: &std::path::Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let files = patch::try_parse(&raw)?;
    let (mut adds, mut dels) = (0, 0);
    for file in &files {
        println!(
            "{} {:>6} {:>6}  {}",
            file.change_type.symbol(),
            format!("+{}", file.additions),
            format!("-{}", file.deletions),
            file.display_path()
        );
        adds += file.additions;
        dels += file.deletions;
    }
    println!("{} files changed, +{} -{}", files.len(), adds, dels);
    Ok(())
}

// ── Event loop ──

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    hl: &ui::highlight::Highlighter,
    store: Option<&SessionStore>,
    previous_session: Option<Session>,
) -> Result<()> {
    // Channel for file watch events
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>();

    // Debounce state for file watcher refreshes
    let mut pending_refresh = false;
    let mut refresh_deadline = Instant::now();
    let mut pending_file_count = 0usize;

    // Debounce state for session saves
    let mut saved_key = (app.catalog.version(), app.format);
    let mut save_deadline: Option<Instant> = None;

    // Start watching by default
    let mut _watcher: Option<FileWatcher> = start_watcher(app, &watch_tx);

    loop {
        terminal.draw(|f| ui::draw(f, app, hl))?;

        // Poll for events with a timeout (lets us process watch events too)
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match app.input_mode {
                    InputMode::Search => handle_search_input(app, key),
                    InputMode::Filter => handle_filter_input(app, key),
                    InputMode::Fragment => handle_fragment_input(app, key),
                    InputMode::Normal => handle_normal_input(app, key, &watch_tx, &mut _watcher),
                }
            }
        }

        // A finished reconstruction from the worker thread
        app.poll_rewrite();

        // Coalesce watcher events before rescanning
        match watch_rx.try_recv() {
            Ok(WatchEvent::FilesChanged(paths)) => {
                pending_file_count += paths.len();
                pending_refresh = true;
                refresh_deadline = Instant::now() + Duration::from_millis(200);
            }
            Ok(WatchEvent::Error(e)) => app.notify(&format!("Watch error: {}", e)),
            Err(_) => {}
        }

        if pending_refresh && Instant::now() >= refresh_deadline {
            pending_refresh = false;
            let count = pending_file_count;
            pending_file_count = 0;
            let total = app.rescan();
            app.notify(&format!(
                "{} file{} changed · {} in project",
                count,
                if count == 1 { "" } else { "s" },
                total
            ));
        }

        app.refresh_token_estimate();

        // Save the session 500ms after the last selection or format change
        let key = (app.catalog.version(), app.format);
        if key != saved_key {
            saved_key = key;
            save_deadline = Some(Instant::now() + Duration::from_millis(500));
        }
        if save_deadline.is_some_and(|d| Instant::now() >= d) || (app.should_quit && save_deadline.is_some()) {
            save_deadline = None;
            save_session(app, store, previous_session.as_ref());
        }

        app.tick();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn start_watcher(app: &mut App, watch_tx: &mpsc::Sender<WatchEvent>) -> Option<FileWatcher> {
    match FileWatcher::new(&app.root, 500, app.config.collect.options(), watch_tx.clone()) {
        Ok(w) => {
            app.watching = true;
            Some(w)
        }
        Err(e) => {
            log::warn!("Could not start watcher: {}", e);
            app.notify(&format!("Watch failed: {}", e));
            None
        }
    }
}

fn save_session(app: &App, store: Option<&SessionStore>, previous: Option<&Session>) {
    let Some(store) = store else {
        return;
    };
    let mut session = app.session_snapshot();
    if let Some(previous) = previous {
        session.carry_notes_from(previous);
    }
    if let Err(e) = store.save(&session) {
        log::warn!("Session save failed: {:#}", e);
    }
}

// ── Key handling ──

fn handle_normal_input(
    app: &mut App,
    key: KeyEvent,
    watch_tx: &mpsc::Sender<WatchEvent>,
    watcher: &mut Option<FileWatcher>,
) {
    // Quit (Ctrl+q) works everywhere
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // A change awaiting a decision takes the keyboard
    match app.controller.state() {
        ChangeState::Reviewing(_) => {
            match key.code {
                KeyCode::Char('y') => app.confirm_change(),
                KeyCode::Char('n') | KeyCode::Esc => app.cancel_change(),
                KeyCode::Char('s') => app.toggle_layout(),
                KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
                KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
                KeyCode::PageDown => app.scroll_down(20),
                KeyCode::PageUp => app.scroll_up(20),
                _ => {}
            }
            return;
        }
        ChangeState::WriteFailed { .. } => {
            match key.code {
                KeyCode::Char('d') => app.retry_download(),
                KeyCode::Esc => app.acknowledge_failure(),
                KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
                KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
                _ => {}
            }
            return;
        }
        ChangeState::Reconstructing { .. } if key.code == KeyCode::Esc => {
            app.cancel_change();
            return;
        }
        _ => {}
    }

    match key.code {
        // Tree navigation
        KeyCode::Char('j') | KeyCode::Down => app.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_cursor(-1),
        KeyCode::Char('g') | KeyCode::Home => app.move_cursor(isize::MIN / 2),
        KeyCode::Char('G') | KeyCode::End => app.move_cursor(isize::MAX / 2),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => app.expand_current(),
        KeyCode::Char('h') | KeyCode::Left => app.collapse_current(),
        KeyCode::Char('E') => app.expand_all(),
        KeyCode::Char(' ') => app.toggle_current(),

        // Right pane scroll
        KeyCode::Char('J') | KeyCode::PageDown => app.scroll_down(20),
        KeyCode::Char('K') | KeyCode::PageUp => app.scroll_up(20),

        // Filtering
        KeyCode::Char('/') => {
            app.input = app.filter.search.clone();
            app.input_mode = InputMode::Search;
        }
        KeyCode::Char('f') => {
            app.input = app.filter.expr.clone();
            app.input_mode = InputMode::Filter;
        }
        KeyCode::Char('L') => app.cycle_language(),
        KeyCode::Esc if app.filter.is_active() => {
            app.filter.clear();
            app.clamp_cursor();
            app.notify("Filters cleared");
        }

        // Context
        KeyCode::Char('F') => app.cycle_format(),
        KeyCode::Char('e') => {
            if let Err(e) = app.export_context() {
                app.notify(&format!("Export failed: {:#}", e));
            }
        }
        KeyCode::Char('c') => {
            if let Err(e) = app.copy_context() {
                app.notify(&format!("Copy failed: {:#}", e));
            }
        }

        // Patch viewing
        KeyCode::Char('n') => app.next_patch_file(),
        KeyCode::Char('N') => app.prev_patch_file(),
        KeyCode::Char('s') => app.toggle_layout(),

        // Proposed change for the file under the cursor
        KeyCode::Char('a') => {
            if app.current_record().is_some_and(|r| r.is_text()) {
                app.input.clear();
                app.input_mode = InputMode::Fragment;
            } else {
                app.notify("Move the cursor to a text file first");
            }
        }

        KeyCode::Char('r') => {
            let total = app.rescan();
            app.notify(&format!("Rescanned · {} files", total));
        }

        // Toggle watch mode
        KeyCode::Char('w') => {
            if app.watching {
                *watcher = None;
                app.watching = false;
                app.notify("Watch stopped");
            } else {
                *watcher = start_watcher(app, watch_tx);
                if app.watching {
                    app.notify("Watching for changes");
                }
            }
        }
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            app.input.clear();
            app.clamp_cursor();
        }
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.input.clear();
            app.set_search("");
        }
        KeyCode::Char(c) => {
            app.input.push(c);
            let query = app.input.clone();
            app.set_search(&query);
        }
        KeyCode::Backspace => {
            app.input.pop();
            let query = app.input.clone();
            app.set_search(&query);
        }
        _ => {}
    }
}

fn handle_filter_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            let expr = std::mem::take(&mut app.input);
            app.apply_filter_expr(&expr);
            app.input_mode = InputMode::Normal;
            if expr.trim().is_empty() {
                app.notify("Filter cleared");
            } else {
                let visible = app.visible_rows().iter().filter(|r| !r.is_dir).count();
                let total = app.catalog.len();
                app.notify(&format!("Filter: {} ({}/{})", expr.trim(), visible, total));
            }
        }
        KeyCode::Esc => {
            app.input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        _ => {}
    }
}

fn handle_fragment_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            let path = std::mem::take(&mut app.input);
            app.input_mode = InputMode::Normal;
            if !path.trim().is_empty() {
                app.start_rewrite_from_file(&path);
            }
        }
        KeyCode::Esc => {
            app.input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        _ => {}
    }
}
