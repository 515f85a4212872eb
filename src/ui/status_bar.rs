use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::styles;
use crate::app::{App, InputMode, PaneContent};
use crate::change::ChangeState;
use crate::context::OutputFormat;

/// Compute the display width of a list of spans
fn spans_width(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.content.chars().count()).sum()
}

/// Render the top status bar:
///   project · root                MARKDOWN JSON XML   ~1.2k / 128k tokens
pub fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let bar_width = area.width as usize;
    let panel_bg = Style::default().bg(styles::PANEL);

    let mut left: Vec<Span> = vec![
        Span::styled(
            format!(" {}", app.project_name),
            Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" · ", Style::default().fg(styles::BORDER)),
        Span::styled(
            app.root.display().to_string(),
            Style::default().fg(styles::DIM),
        ),
    ];
    if app.watching {
        left.push(Span::styled("  ● watching", Style::default().fg(styles::GREEN)));
    }
    if !app.controller.is_idle() {
        left.push(Span::styled(
            format!("  ◆ {}", app.controller.state().label()),
            Style::default().fg(styles::PURPLE),
        ));
    }
    if !app.caps.is_empty() {
        left.push(Span::styled(
            format!("  ✎ write ({})", app.caps.len()),
            Style::default().fg(styles::YELLOW),
        ));
    }

    let mut right: Vec<Span> = Vec::new();
    for format in [OutputFormat::Markdown, OutputFormat::Json, OutputFormat::Xml] {
        let style = if format == app.format {
            Style::default()
                .fg(styles::BG)
                .bg(styles::BLUE)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(styles::MUTED)
        };
        right.push(Span::styled(format!(" {} ", format.label()), style));
        right.push(Span::raw(" "));
    }
    let token_style = if app.over_budget() {
        styles::over_budget_style()
    } else {
        Style::default().fg(styles::TEXT)
    };
    right.push(Span::styled(
        format!(
            " ~{} / {} tokens ",
            compact_count(app.token_estimate),
            compact_count(app.config.output.token_budget)
        ),
        token_style,
    ));

    let pad = bar_width.saturating_sub(spans_width(&left) + spans_width(&right));
    left.push(Span::raw(" ".repeat(pad)));
    left.extend(right);
    f.render_widget(Paragraph::new(Line::from(left)).style(panel_bg), area);
}

/// 950 → "950", 1234 → "1.2k", 128000 → "128k"
fn compact_count(n: usize) -> String {
    if n < 1000 {
        n.to_string()
    } else if n < 10_000 {
        format!("{:.1}k", n as f64 / 1000.0)
    } else {
        format!("{}k", n / 1000)
    }
}

/// A key-label hint pair, e.g. ("e", " export ")
struct Hint {
    key: String,
    label: String,
}

impl Hint {
    fn new(key: &str, label: &str) -> Self {
        Self { key: key.to_string(), label: label.to_string() }
    }
    fn width(&self) -> usize {
        self.key.chars().count() + self.label.chars().count()
    }
}

fn build_hints(app: &App) -> Vec<Hint> {
    match app.controller.state() {
        ChangeState::Reviewing(_) => {
            return vec![
                Hint::new("y", " apply "),
                Hint::new("n", " discard "),
                Hint::new("s", " split/unified "),
                Hint::new("j/k", " scroll "),
            ];
        }
        ChangeState::WriteFailed { .. } => {
            return vec![
                Hint::new("d", " save as download "),
                Hint::new("Esc", " discard "),
                Hint::new("j/k", " scroll "),
            ];
        }
        _ => {}
    }

    let mut hints = vec![
        Hint::new("j/k", " navigate "),
        Hint::new("␣", " toggle "),
        Hint::new("h/l", " fold "),
        Hint::new("/", " search "),
        Hint::new("f", " filter "),
        Hint::new("L", " language "),
        Hint::new("F", " format "),
        Hint::new("e", " export "),
        Hint::new("c", " copy "),
        Hint::new("a", " propose change "),
        Hint::new("r", " rescan "),
        Hint::new("w", " watch "),
    ];
    if app.pane_content() == PaneContent::Patch {
        hints.push(Hint::new("n/N", " patch file "));
        hints.push(Hint::new("s", " split/unified "));
    }
    if matches!(app.controller.state(), ChangeState::Reconstructing { .. }) {
        hints.push(Hint::new("Esc", " abandon rewrite "));
    }
    hints.push(Hint::new("^q", " quit "));

    if !app.filter.search.is_empty() {
        hints.push(Hint::new("", &format!(" [search: {}] ", app.filter.search)));
    }
    if let Some(ref lang) = app.filter.language {
        hints.push(Hint::new("", &format!(" [lang: {}] ", lang)));
    }
    if !app.filter.expr.is_empty() {
        hints.push(Hint::new("F:", &format!(" {} ", app.filter.expr)));
    }
    if app.collection_errors > 0 {
        hints.push(Hint::new("", &format!(" [{} skipped] ", app.collection_errors)));
    }
    hints
}

/// Pack hints into rows that fit within `width`
fn pack_hint_lines(hints: &[Hint], width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();
    let mut current_w: usize = 1; // leading space

    for hint in hints {
        let hw = hint.width();
        if current_w + hw > width && !current_spans.is_empty() {
            lines.push(Line::from(current_spans));
            current_spans = Vec::new();
            current_w = 1;
        }
        if current_spans.is_empty() {
            current_spans.push(Span::raw(" "));
        }
        if !hint.key.is_empty() {
            current_spans.push(Span::styled(hint.key.clone(), styles::key_hint_style()));
        }
        let label_style = if hint.key.is_empty() {
            Style::default().fg(styles::PURPLE)
        } else if hint.key == "F:" {
            Style::default().fg(styles::YELLOW)
        } else {
            Style::default().fg(styles::DIM)
        };
        current_spans.push(Span::styled(hint.label.clone(), label_style));
        current_w += hw;
    }
    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }
    if lines.is_empty() {
        lines.push(Line::from(vec![Span::raw(" ")]));
    }
    lines
}

/// Calculate how many rows the bottom bar needs
pub fn bottom_bar_height(app: &App, width: u16) -> u16 {
    match app.input_mode {
        InputMode::Search | InputMode::Filter | InputMode::Fragment => 1,
        InputMode::Normal => {
            let lines = pack_hint_lines(&build_hints(app), width as usize);
            (lines.len() as u16).max(1)
        }
    }
}

/// Render the bottom bar: a prompt while typing, key hints otherwise
pub fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let panel_bg = Style::default().bg(styles::PANEL);

    let prompt = match app.input_mode {
        InputMode::Search => Some((" / ", styles::BLUE, " confirm  ")),
        InputMode::Filter => Some((" filter ", styles::YELLOW, " apply  ")),
        InputMode::Fragment => Some((" change file ", styles::GREEN, " reconstruct  ")),
        InputMode::Normal => None,
    };

    if let Some((label, accent, action)) = prompt {
        let spans = vec![
            Span::styled(
                label,
                Style::default()
                    .fg(styles::BG)
                    .bg(accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {}", app.input), Style::default().fg(styles::TEXT)),
            Span::styled("█", Style::default().fg(accent)),
            Span::raw("  "),
            Span::styled("Enter", styles::key_hint_style()),
            Span::styled(action, Style::default().fg(styles::DIM)),
            Span::styled("Esc", styles::key_hint_style()),
            Span::styled(" cancel", Style::default().fg(styles::DIM)),
        ];
        f.render_widget(Paragraph::new(Line::from(spans)).style(panel_bg), area);
        return;
    }

    let lines = pack_hint_lines(&build_hints(app), area.width as usize);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(lines.iter().map(|_| Constraint::Length(1)).collect::<Vec<_>>())
        .split(area);
    for (i, line) in lines.into_iter().enumerate() {
        f.render_widget(Paragraph::new(line).style(panel_bg), rows[i]);
    }
}

/// Notification overlay in the top-right corner
pub fn render_notification(f: &mut Frame, area: Rect, message: &str) {
    let notif_width = (message.chars().count() as u16 + 4).min(area.width);
    let notif_area = Rect {
        x: area.x + area.width.saturating_sub(notif_width + 2),
        y: area.y + 2,
        width: notif_width,
        height: 1,
    };

    let notif = Paragraph::new(Line::from(vec![
        Span::styled(" ● ", Style::default().fg(styles::GREEN)),
        Span::styled(message.to_string(), Style::default().fg(styles::TEXT)),
        Span::raw(" "),
    ]))
    .style(Style::default().bg(styles::PANEL).fg(styles::TEXT));

    f.render_widget(notif, notif_area);
}
