use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

use super::highlight::Highlighter;
use super::styles;
use crate::app::{truncate, App, PaneContent};
use crate::change::ChangeState;
use crate::patch::{self, ChangeType, DiffFile, DiffLayout, LineType, SplitCell};

/// Render the right-hand pane: change preview, loaded patch, or file content
pub fn render(f: &mut Frame, area: Rect, app: &App, hl: &Highlighter) {
    match app.pane_content() {
        PaneContent::Change => render_change(f, area, app, hl),
        PaneContent::Patch => match app.patch.get(app.patch_file) {
            Some(file) => {
                let title = format!(
                    " PATCH {} ({}/{}) ",
                    file.display_path(),
                    app.patch_file + 1,
                    app.patch.len()
                );
                render_diff(f, area, app, hl, file, title, Vec::new());
            }
            None => render_empty(f, area, "No patch loaded"),
        },
        PaneContent::File => render_file(f, area, app, hl),
    }
}

fn render_change(f: &mut Frame, area: Rect, app: &App, hl: &Highlighter) {
    let Some(file) = app.controller.preview() else {
        render_empty(f, area, "No change under review");
        return;
    };

    let banner = match app.controller.state() {
        ChangeState::WriteFailed { message, .. } => vec![
            Line::from(Span::styled(
                format!("  ✗ {}", message),
                Style::default().fg(styles::RED),
            )),
            Line::from(Span::styled(
                "  [d] save as download  [esc] discard",
                styles::key_hint_style(),
            )),
        ],
        _ => vec![Line::from(Span::styled(
            "  [y] apply  [n] discard  [s] split/unified",
            styles::key_hint_style(),
        ))],
    };

    let title = format!(" PREVIEW {} ", file.display_path());
    render_diff(f, area, app, hl, &file, title, banner);
}

fn render_diff(
    f: &mut Frame,
    area: Rect,
    app: &App,
    hl: &Highlighter,
    file: &DiffFile,
    title: String,
    banner: Vec<Line<'static>>,
) {
    let mut lines: Vec<Line> = vec![file_header(file)];
    lines.extend(banner);
    lines.push(Line::from(""));

    let width = area.width.saturating_sub(1) as usize;
    let opts = RowOptions::from_app(app);
    if file.hunks.is_empty() {
        lines.push(Line::from(Span::styled(
            "  (no changes)",
            Style::default().fg(styles::DIM),
        )));
    }
    match app.layout {
        DiffLayout::Unified => {
            for (hunk, rows) in file.hunks.iter().zip(patch::render_unified(file)) {
                lines.push(hunk_header(&hunk.header()));
                for row in rows {
                    lines.push(unified_line(&row, file.display_path(), hl, &opts));
                }
                lines.push(Line::from(""));
            }
        }
        DiffLayout::Split => {
            let half = width.saturating_sub(1) / 2;
            for (hunk, rows) in file.hunks.iter().zip(patch::render_split(file)) {
                lines.push(hunk_header(&hunk.header()));
                for row in rows {
                    let mut spans = split_cell(row.left.as_ref(), half, file.display_path(), hl, &opts);
                    spans.push(Span::styled("│", Style::default().fg(styles::BORDER)));
                    spans.extend(split_cell(row.right.as_ref(), half, file.display_path(), hl, &opts));
                    lines.push(Line::from(spans));
                }
                lines.push(Line::from(""));
            }
        }
    }

    let total_hunks = file.hunks.len();
    f.render_widget(pane(lines, title, app.diff_scroll), area);

    if total_hunks > 0 {
        render_indicator(f, area, &format!("{} · {} hunks", app.layout.label(), total_hunks));
    }
}

fn render_file(f: &mut Frame, area: Rect, app: &App, hl: &Highlighter) {
    let Some(record) = app.current_record() else {
        render_empty(f, area, "Move to a file to view it");
        return;
    };
    let Some(content) = record.content.as_deref() else {
        render_empty(f, area, &format!("{} has no text content ({} bytes)", record.path, record.size_bytes));
        return;
    };

    let opts = RowOptions::from_app(app);
    let lines: Vec<Line> = content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let mut spans = Vec::new();
            if opts.line_numbers {
                spans.push(Span::styled(
                    format!("{:>5} │", i + 1),
                    Style::default().fg(styles::DIM),
                ));
            }
            spans.extend(hl.highlight_line(&opts.expand(line), &record.path, styles::default_style()));
            Line::from(spans)
        })
        .collect();

    let mark = if record.selected { "[x]" } else { "[ ]" };
    let title = format!(" {} {} · {} · {} lines ", mark, record.path, record.language, record.line_count);
    f.render_widget(pane(lines, title, app.diff_scroll), area);

    if matches!(app.controller.state(), ChangeState::Reconstructing { .. }) {
        render_indicator(f, area, "reconstructing…");
    }
}

// ── Rows ──

const NO_NEWLINE_HINT: &str = " ∅ no newline";

struct RowOptions {
    line_numbers: bool,
    tab: String,
}

impl RowOptions {
    fn from_app(app: &App) -> Self {
        RowOptions {
            line_numbers: app.config.display.line_numbers,
            tab: " ".repeat(app.config.display.tab_width as usize),
        }
    }

    /// Expand tabs and make carriage returns visible
    fn expand(&self, content: &str) -> String {
        content.replace('\t', &self.tab).replace('\r', "␍")
    }
}

fn line_styles(line_type: LineType) -> (Style, Style) {
    match line_type {
        LineType::Add => (styles::add_style(), Style::default().fg(styles::DIM).bg(styles::ADD_BG)),
        LineType::Delete => (styles::del_style(), Style::default().fg(styles::DIM).bg(styles::DEL_BG)),
        LineType::Context => (styles::default_style(), Style::default().fg(styles::DIM)),
    }
}

fn num(n: Option<usize>) -> String {
    n.map(|n| format!("{:>4}", n)).unwrap_or_else(|| "    ".to_string())
}

fn unified_line(row: &patch::UnifiedRow, path: &str, hl: &Highlighter, opts: &RowOptions) -> Line<'static> {
    let (base_style, gutter_style) = line_styles(row.line_type);
    let mut spans = Vec::new();
    if opts.line_numbers {
        spans.push(Span::styled(
            format!("{} {} │", num(row.old_num), num(row.new_num)),
            gutter_style,
        ));
    }
    spans.push(Span::styled(row.line_type.prefix(), base_style));
    if !row.content.is_empty() {
        spans.extend(hl.highlight_line(&opts.expand(row.content), path, base_style));
    }
    if row.no_newline {
        spans.push(Span::styled(NO_NEWLINE_HINT, Style::default().fg(styles::MUTED)));
    }
    Line::from(spans).style(base_style)
}

/// One half of a split row, padded to `width` columns
fn split_cell(
    cell: Option<&SplitCell>,
    width: usize,
    path: &str,
    hl: &Highlighter,
    opts: &RowOptions,
) -> Vec<Span<'static>> {
    let Some(cell) = cell else {
        return vec![Span::styled(" ".repeat(width), Style::default().bg(styles::SURFACE))];
    };
    let (base_style, gutter_style) = line_styles(cell.line_type);
    let mut spans = Vec::new();
    let mut used = 0;
    if opts.line_numbers {
        spans.push(Span::styled(format!("{} │", num(Some(cell.num))), gutter_style));
        used += 6;
    }
    spans.push(Span::styled(cell.line_type.prefix(), base_style));
    used += 1;

    let hint = if cell.no_newline { NO_NEWLINE_HINT } else { "" };
    let room = width.saturating_sub(used + hint.chars().count());
    let content = truncate(&opts.expand(cell.content), room);
    used += content.chars().count();
    spans.extend(hl.highlight_line(&content, path, base_style));
    if !hint.is_empty() && used + hint.chars().count() <= width {
        spans.push(Span::styled(hint, Style::default().fg(styles::MUTED)));
        used += hint.chars().count();
    }
    if used < width {
        spans.push(Span::styled(" ".repeat(width - used), base_style));
    }
    spans
}

fn file_header(file: &DiffFile) -> Line<'static> {
    let symbol_style = match file.change_type {
        ChangeType::Add => styles::status_added(),
        ChangeType::Delete => styles::status_deleted(),
        ChangeType::Modify => styles::status_modified(),
    };
    Line::from(vec![
        Span::styled(format!("  {} ", file.change_type.symbol()), symbol_style),
        Span::styled(file.display_path().to_string(), Style::default().fg(styles::BRIGHT)),
        Span::styled(
            format!("  +{} -{}", file.additions, file.deletions),
            Style::default().fg(styles::DIM),
        ),
    ])
}

fn hunk_header(header: &str) -> Line<'static> {
    Line::from(Span::styled(format!(" {}", header), styles::hunk_header_style()))
        .style(styles::hunk_header_style())
}

// ── Chrome ──

fn pane(lines: Vec<Line<'_>>, title: String, scroll: u16) -> Paragraph<'_> {
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(styles::BRIGHT)))
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG))
        .padding(Padding::new(0, 1, 0, 0));
    Paragraph::new(lines).block(block).scroll((scroll, 0))
}

/// Small label in the top-right corner
fn render_indicator(f: &mut Frame, area: Rect, text: &str) {
    let width = text.chars().count() as u16 + 3;
    let indicator_area = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y,
        width: width.min(area.width),
        height: 1,
    };
    let indicator = Paragraph::new(Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(styles::MUTED),
    )));
    f.render_widget(indicator, indicator_area);
}

fn render_empty(f: &mut Frame, area: Rect, message: &str) {
    let block = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG));

    let text = Paragraph::new(vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", message),
            Style::default().fg(styles::MUTED),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "  [space] select  [e] export  [c] copy  [a] propose change",
            Style::default().fg(styles::DIM),
        )),
    ])
    .block(block);

    f.render_widget(text, area);
}
