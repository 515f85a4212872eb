use super::filter::Filter;
use super::tree::{self, TreeRow};
use crate::catalog::{self, FileCatalog, FileRecord};
use crate::change::{
    AgentRewriter, ChangeController, ChangeState, CommitOutcome, Rewriter, WriteCapabilityMap,
};
use crate::config::CfConfig;
use crate::context::{self, OutputFormat};
use crate::error::ReconstructionError;
use crate::patch::{self, DiffFile, DiffLayout};
use crate::session::Session;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

// ── Enums ──

/// Whether we're navigating or typing into one of the prompts
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Search,
    Filter,
    /// Path of a file holding a proposed change for the file under the cursor
    Fragment,
}

/// What the right-hand pane shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaneContent {
    /// A change under review (or awaiting retry)
    Change,
    /// A loaded patch file
    Patch,
    /// The file under the cursor
    File,
}

type RewriteResult = (u64, Result<String, ReconstructionError>);

// ── Main App State ──

pub struct App {
    /// Canonical project root
    pub root: PathBuf,
    pub project_name: String,
    pub config: CfConfig,

    pub catalog: FileCatalog,
    /// Direct-write grants; empty unless acquired at open
    pub caps: WriteCapabilityMap,

    pub filter: Filter,
    /// Expanded directory paths in the tree view
    pub expanded: HashSet<String>,
    /// Index into the visible tree rows
    pub cursor: usize,

    pub format: OutputFormat,
    /// Estimate for the current selection, refreshed when catalog or format change
    pub token_estimate: usize,
    token_key: Option<(u64, OutputFormat)>,

    /// Parsed patch loaded with --patch
    pub patch: Vec<DiffFile>,
    pub patch_file: usize,
    pub layout: DiffLayout,
    pub diff_scroll: u16,

    pub controller: ChangeController,
    /// Confirmed bodies that only reached a download, by path. A rescan reads
    /// the untouched file from disk, so these are laid back over it.
    committed: HashMap<String, String>,
    rewriter: Arc<dyn Rewriter + Send + Sync>,
    rewrite_rx: Option<mpsc::Receiver<RewriteResult>>,

    pub input_mode: InputMode,
    /// Text being typed in Search / Filter / Fragment mode
    pub input: String,

    pub should_quit: bool,
    pub watching: bool,

    /// Last notification message
    pub message: Option<String>,
    /// Ticks since the last notification (for auto-clearing)
    pub message_ticks: u8,

    /// Entries skipped by the last scan
    pub collection_errors: usize,
}

impl App {
    /// Scan `root` and build a fresh catalog.
    /// Write handles are acquired here and only here, when `grant_write` is set.
    pub fn open(root: &Path, config: CfConfig, grant_write: bool) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Path not found: {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Not a directory: {}", root.display());
        }

        let collection = catalog::collect(&root, &config.collect.options());
        let collection_errors = collection.errors.len();
        let first_error = collection.errors.first().map(|e| e.path().to_string());
        let catalog = FileCatalog::new(collection.records);

        let caps = if grant_write {
            WriteCapabilityMap::acquire(
                &root,
                catalog
                    .records()
                    .iter()
                    .filter(|r| r.is_text())
                    .map(|r| r.path.as_str()),
            )
        } else {
            WriteCapabilityMap::new()
        };

        let mut app = App::with_catalog(root, config, catalog);
        app.caps = caps;
        app.collection_errors = collection_errors;
        if let Some(path) = first_error {
            app.notify(&format!("Skipped {} unreadable entries (first: {})", collection_errors, path));
        }
        Ok(app)
    }

    /// Rehydrate from a saved session. Write capability always starts empty.
    pub fn resume(root: &Path, config: CfConfig, session: &Session) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Path not found: {}", root.display()))?;
        let mut app = App::with_catalog(root, config, session.to_catalog());
        app.format = session.output_format;
        app.project_name = session.name.clone();
        app.notify(&format!("Resumed session from {}", session.last_updated));
        Ok(app)
    }

    pub fn with_catalog(root: PathBuf, config: CfConfig, catalog: FileCatalog) -> Self {
        let project_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        let rewriter = Arc::new(AgentRewriter::new(config.agent.clone()));

        let mut app = App {
            root,
            project_name,
            format: config.output.format,
            layout: if config.display.split_diff {
                DiffLayout::Split
            } else {
                DiffLayout::Unified
            },
            config,
            catalog,
            caps: WriteCapabilityMap::new(),
            filter: Filter::default(),
            expanded: HashSet::new(),
            cursor: 0,
            token_estimate: 0,
            token_key: None,
            patch: Vec::new(),
            patch_file: 0,
            diff_scroll: 0,
            controller: ChangeController::new(),
            committed: HashMap::new(),
            rewriter,
            rewrite_rx: None,
            input_mode: InputMode::Normal,
            input: String::new(),
            should_quit: false,
            watching: false,
            message: None,
            message_ticks: 0,
            collection_errors: 0,
        };
        app.expand_top_level();
        app.refresh_token_estimate();
        app
    }

    /// Replace the rewrite collaborator (the configured agent by default)
    pub fn set_rewriter(&mut self, rewriter: Arc<dyn Rewriter + Send + Sync>) {
        self.rewriter = rewriter;
    }

    pub fn download_dir(&self) -> PathBuf {
        self.config.output.download_dir(&self.root)
    }

    // ── Tree ──

    /// Visible tree rows after filtering the flat list
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let roots = tree::build(self.catalog.records().iter().filter(|r| self.filter.matches(r)));
        tree::flatten(&roots, &self.expanded)
    }

    pub fn current_row(&self) -> Option<TreeRow> {
        self.visible_rows().into_iter().nth(self.cursor)
    }

    /// Record under the cursor, if the cursor is on a file
    pub fn current_record(&self) -> Option<&FileRecord> {
        let row = self.current_row()?;
        if row.is_dir {
            return None;
        }
        self.catalog.get(&row.path)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let count = self.visible_rows().len();
        if count == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, count as isize - 1) as usize;
        self.diff_scroll = 0;
    }

    /// Keep the cursor on a row after the visible set shrinks
    pub fn clamp_cursor(&mut self) {
        let count = self.visible_rows().len();
        if self.cursor >= count {
            self.cursor = count.saturating_sub(1);
        }
    }

    fn expand_top_level(&mut self) {
        let roots = tree::build(self.catalog.records());
        for node in &roots {
            if node.is_dir() {
                self.expanded.insert(node.path().to_string());
            }
        }
    }

    pub fn expand_all(&mut self) {
        let roots = tree::build(self.catalog.records());
        self.expanded.extend(tree::directory_paths(&roots));
    }

    pub fn expand_current(&mut self) {
        if let Some(row) = self.current_row() {
            if row.is_dir {
                self.expanded.insert(row.path);
            }
        }
    }

    /// Collapse the directory under the cursor, or the parent of a file
    pub fn collapse_current(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let target = if row.is_dir && row.expanded {
            row.path
        } else {
            match row.path.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None => return,
            }
        };
        self.expanded.remove(&target);
        if let Some(idx) = self.visible_rows().iter().position(|r| r.path == target) {
            self.cursor = idx;
        }
    }

    /// Toggle the file or directory under the cursor.
    /// A directory applies to its visible text descendants only.
    pub fn toggle_current(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let filter = &self.filter;
        let changed = tree::toggle_path(&mut self.catalog, &row.path, |r| filter.matches(r));
        if changed == 0 && row.kind.is_some_and(|k| k != catalog::FileKind::Text) {
            self.notify(&format!("{} cannot be selected", row.name));
        }
        self.refresh_token_estimate();
    }

    // ── Filtering ──

    pub fn apply_filter_expr(&mut self, expr: &str) {
        self.filter.set_expr(expr);
        self.cursor = 0;
        self.clamp_cursor();
    }

    pub fn set_search(&mut self, query: &str) {
        self.filter.search = query.to_string();
        self.clamp_cursor();
    }

    /// Step through each language present, then back to all
    pub fn cycle_language(&mut self) {
        let languages = self.catalog.languages();
        self.filter.language = match &self.filter.language {
            None => languages.first().cloned(),
            Some(current) => languages
                .iter()
                .position(|l| l == current)
                .and_then(|i| languages.get(i + 1))
                .cloned(),
        };
        self.cursor = 0;
        self.clamp_cursor();
        let label = self.filter.language.as_deref().unwrap_or("all languages");
        self.notify(&format!("Language: {}", label));
    }

    // ── Context ──

    pub fn cycle_format(&mut self) {
        self.format = self.format.next();
        self.refresh_token_estimate();
        self.notify(&format!("Format: {}", self.format.label()));
    }

    pub fn context_text(&self) -> String {
        context::serialize(&self.project_name, self.catalog.records(), self.format)
    }

    /// Recompute the token estimate if the catalog or format changed
    pub fn refresh_token_estimate(&mut self) {
        let key = (self.catalog.version(), self.format);
        if self.token_key == Some(key) {
            return;
        }
        self.token_estimate = context::estimate_tokens(&self.context_text());
        self.token_key = Some(key);
    }

    pub fn over_budget(&self) -> bool {
        self.token_estimate > self.config.output.token_budget
    }

    pub fn export_context(&mut self) -> Result<PathBuf> {
        let dir = self.download_dir();
        let path = context::export(&self.project_name, self.catalog.records(), self.format, &dir)?;
        self.notify(&format!("Exported {}", path.display()));
        Ok(path)
    }

    pub fn copy_context(&mut self) -> Result<()> {
        let text = self.context_text();
        copy_to_clipboard(&text)?;
        self.notify(&format!(
            "Copied {} files (~{} tokens)",
            self.catalog.selected_count(),
            context::estimate_tokens(&text)
        ));
        Ok(())
    }

    // ── Catalog refresh ──

    /// Re-collect the project and swap the catalog in one step, keeping selection
    pub fn rescan(&mut self) -> usize {
        let previous = self.catalog.snapshot();
        let collection = catalog::collect(&self.root, &self.config.collect.options());
        self.collection_errors = collection.errors.len();
        self.catalog.replace(collection.records);
        self.catalog.carry_selection_from(&previous);
        self.reapply_committed();
        self.clamp_cursor();
        self.refresh_token_estimate();
        self.catalog.len()
    }

    /// Lay confirmed-but-downloaded bodies over freshly scanned records.
    /// An entry is dropped once disk matches it or its file is gone.
    fn reapply_committed(&mut self) {
        let catalog = &mut self.catalog;
        self.committed.retain(|path, content| {
            let on_disk = match catalog.get(path) {
                Some(record) => record.content.as_deref() == Some(content.as_str()),
                None => return false,
            };
            if !on_disk {
                catalog.update_content(path, content);
            }
            !on_disk
        });
    }

    pub fn session_snapshot(&self) -> Session {
        Session::capture(&self.root, &self.project_name, &self.catalog, self.format)
    }

    // ── Patch ──

    /// Load unified diff text; malformed input yields no patch
    pub fn load_patch(&mut self, raw: &str) -> usize {
        self.patch = patch::parse(raw);
        self.patch_file = 0;
        self.diff_scroll = 0;
        if self.patch.is_empty() && !raw.trim().is_empty() {
            self.notify("Patch could not be parsed");
        }
        self.patch.len()
    }

    pub fn next_patch_file(&mut self) {
        if self.patch_file + 1 < self.patch.len() {
            self.patch_file += 1;
            self.diff_scroll = 0;
        }
    }

    pub fn prev_patch_file(&mut self) {
        if self.patch_file > 0 {
            self.patch_file -= 1;
            self.diff_scroll = 0;
        }
    }

    pub fn toggle_layout(&mut self) {
        self.layout = self.layout.toggle();
        self.notify(&format!("Layout: {}", self.layout.label()));
    }

    pub fn pane_content(&self) -> PaneContent {
        match self.controller.state() {
            ChangeState::Reviewing(_) | ChangeState::WriteFailed { .. } => PaneContent::Change,
            _ if !self.patch.is_empty() => PaneContent::Patch,
            _ => PaneContent::File,
        }
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.diff_scroll = self.diff_scroll.saturating_add(amount);
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.diff_scroll = self.diff_scroll.saturating_sub(amount);
    }

    // ── Change review ──

    /// Send `fragment` for `path` to the rewrite collaborator on a worker thread
    pub fn start_rewrite(&mut self, path: &str, fragment: &str) {
        let request = match self.controller.begin(&self.catalog, path, fragment) {
            Ok(r) => r,
            Err(e) => {
                self.notify(&e.to_string());
                return;
            }
        };

        let (tx, rx) = mpsc::channel();
        let rewriter = Arc::clone(&self.rewriter);
        std::thread::spawn(move || {
            let result = rewriter.rewrite(&request);
            // The receiver is gone only if the app quit meanwhile
            let _ = tx.send((request.id, result));
        });
        self.rewrite_rx = Some(rx);
        self.notify(&format!("Reconstructing {}...", path));
    }

    /// Read the fragment file named in `input` and start a rewrite of the file under the cursor
    pub fn start_rewrite_from_file(&mut self, fragment_path: &str) {
        let Some(path) = self.current_record().map(|r| r.path.clone()) else {
            self.notify("Move the cursor to a text file first");
            return;
        };
        let fragment_path = self.root.join(fragment_path.trim());
        match std::fs::read_to_string(&fragment_path) {
            Ok(fragment) => self.start_rewrite(&path, &fragment),
            Err(e) => self.notify(&format!("Cannot read {}: {}", fragment_path.display(), e)),
        }
    }

    /// Deliver a finished reconstruction, if one has arrived
    pub fn poll_rewrite(&mut self) -> bool {
        let Some(rx) = &self.rewrite_rx else {
            return false;
        };
        let (id, result) = match rx.try_recv() {
            Ok(msg) => msg,
            Err(mpsc::TryRecvError::Empty) => return false,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.rewrite_rx = None;
                return false;
            }
        };
        self.rewrite_rx = None;

        let message = match self.controller.finish(id, result) {
            Ok(change) => format!("Review change to {}: y apply · n discard", change.path),
            Err(e) => e.to_string(),
        };
        self.diff_scroll = 0;
        self.notify(&message);
        true
    }

    pub fn confirm_change(&mut self) {
        let dir = self.download_dir();
        let change = self.pending_body();
        let message = match self.controller.confirm(&mut self.catalog, &self.caps, &dir) {
            Ok(CommitOutcome::Written(path)) => {
                self.committed.remove(&path);
                format!("Wrote {}", path)
            }
            Ok(CommitOutcome::Downloaded(target)) => {
                if let Some((path, body)) = change {
                    self.committed.insert(path, body);
                }
                format!("Saved {}", target.display())
            }
            Err(e) => format!("{} (d download · esc discard)", e),
        };
        self.refresh_token_estimate();
        self.notify(&message);
    }

    pub fn cancel_change(&mut self) {
        if self.controller.cancel() {
            self.rewrite_rx = None;
            self.notify("Change discarded");
        }
    }

    pub fn retry_download(&mut self) {
        let dir = self.download_dir();
        let change = self.pending_body();
        let message = match self.controller.retry_via_download(&mut self.catalog, &dir) {
            Ok(target) => {
                if let Some((path, body)) = change {
                    self.committed.insert(path, body);
                }
                format!("Saved {}", target.display())
            }
            Err(e) => e.to_string(),
        };
        self.refresh_token_estimate();
        self.notify(&message);
    }

    fn pending_body(&self) -> Option<(String, String)> {
        self.controller
            .pending()
            .map(|c| (c.path.clone(), c.new_content.clone()))
    }

    pub fn acknowledge_failure(&mut self) {
        if self.controller.acknowledge_failure() {
            self.notify("Change discarded");
        }
    }

    // ── Notifications ──

    /// Show a notification message in the status bar (auto-clears after ~2s)
    pub fn notify(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_ticks = 0;
    }

    /// Called on every event loop iteration; clears stale notifications
    pub fn tick(&mut self) {
        if self.message.is_some() {
            self.message_ticks += 1;
            if self.message_ticks > 20 {
                self.message = None;
                self.message_ticks = 0;
            }
        }
    }
}

// ── Helpers ──

fn copy_to_clipboard(text: &str) -> Result<()> {
    let (cmd, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("pbcopy", vec![])
    } else if cfg!(target_os = "windows") {
        ("clip", vec![])
    } else {
        // Linux: try xclip, fall back to xsel
        if std::process::Command::new("which")
            .arg("xclip")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            ("xclip", vec!["-selection", "clipboard"])
        } else {
            ("xsel", vec!["--clipboard", "--input"])
        }
    };

    let mut child = std::process::Command::new(cmd)
        .args(&args)
        .stdin(std::process::Stdio::piped())
        .spawn()
        .context("Failed to open clipboard command")?;

    if let Some(ref mut stdin) = child.stdin {
        stdin.write_all(text.as_bytes())?;
    }

    child.wait().context("Clipboard command failed")?;
    Ok(())
}

/// ISO 8601 UTC timestamp without pulling in a date crate
pub(crate) fn chrono_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_timestamp(secs)
}

fn format_timestamp(secs: u64) -> String {
    let days = secs / 86400;
    let remaining = secs % 86400;
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;

    let is_leap = |y: i64| y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);

    let mut year = 1970i64;
    let mut day = i64::try_from(days).unwrap_or(i64::MAX);
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if day < len {
            break;
        }
        day -= len;
        year += 1;
    }

    let month_days: [i64; 12] = [
        31,
        if is_leap(year) { 29 } else { 28 },
        31, 30, 31, 30, 31, 31, 30, 31, 30, 31,
    ];
    let mut month = 0usize;
    while month < 11 && day >= month_days[month] {
        day -= month_days[month];
        month += 1;
    }

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month + 1,
        day + 1,
        hours,
        minutes,
        seconds
    )
}

/// Truncate a string to max_len chars, adding … if truncated
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
    format!("{}…", truncated)
}
