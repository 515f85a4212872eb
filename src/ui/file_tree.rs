use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Padding},
    Frame,
};

use super::styles;
use crate::app::tree::{SelectionStatus, TreeRow};
use crate::app::{truncate, App};
use crate::catalog::FileKind;

/// Render the file tree panel (left side)
pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let rows = app.visible_rows();
    let total = app.catalog.len();
    let selected = app.catalog.selected_count();

    let title = if app.filter.is_active() {
        let files = rows.iter().filter(|r| !r.is_dir).count();
        format!(" FILES ({}/{}) · {}/{} selected ", files, total, selected, app.catalog.text_count())
    } else {
        format!(" FILES ({}) · {}/{} selected ", total, selected, app.catalog.text_count())
    };

    // Virtualized rendering: only build items inside the viewport
    let viewport_height = area.height.saturating_sub(1) as usize;
    let scroll = viewport_offset(app.cursor, rows.len(), viewport_height);
    let end = (scroll + viewport_height).min(rows.len());

    let items: Vec<ListItem> = rows[scroll..end]
        .iter()
        .enumerate()
        .map(|(offset, row)| render_row(row, scroll + offset == app.cursor, area.width as usize))
        .collect();

    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(styles::MUTED)))
        .borders(Borders::RIGHT)
        .border_style(Style::default().fg(styles::BORDER))
        .style(Style::default().bg(styles::SURFACE))
        .padding(Padding::new(0, 0, 0, 0));

    f.render_widget(List::new(items).block(block), area);
}

fn render_row(row: &TreeRow, is_cursor: bool, width: usize) -> ListItem<'static> {
    let indent = "  ".repeat(row.depth);
    let arrow = match (row.is_dir, row.expanded) {
        (true, true) => "▾ ",
        (true, false) => "▸ ",
        (false, _) => "  ",
    };

    let (check, check_style) = match (row.kind, row.status) {
        (Some(FileKind::Binary), _) => ("[b]", styles::unselectable_style()),
        (Some(FileKind::Oversized), _) => ("[>]", styles::unselectable_style()),
        (_, status) => (
            status.symbol(),
            match status {
                SelectionStatus::Checked => styles::checked_style(),
                SelectionStatus::Partial => styles::partial_style(),
                SelectionStatus::Unchecked => styles::unchecked_style(),
            },
        ),
    };

    let name = if row.is_dir {
        format!("{}/", row.name)
    } else {
        row.name.clone()
    };
    let lines = format!("{}", row.line_count);
    // " [x] " + arrow + lines column
    let fixed = 5 + indent.chars().count() + arrow.chars().count() + 7;
    let name_width = width.saturating_sub(fixed).max(1);
    let name = truncate(&name, name_width);

    let name_style = if is_cursor {
        styles::selected_style()
    } else if row.kind.is_some_and(|k| k != FileKind::Text) {
        styles::unselectable_style()
    } else if row.is_dir {
        Style::default().fg(styles::BLUE)
    } else {
        Style::default().fg(styles::TEXT)
    };

    let mut spans = vec![
        Span::styled(format!(" {} ", check), check_style),
        Span::raw(indent),
        Span::styled(arrow, Style::default().fg(styles::MUTED)),
        Span::styled(format!("{:<w$}", name, w = name_width), name_style),
    ];
    if width > 24 {
        spans.push(Span::styled(
            format!("{:>6} ", lines),
            Style::default().fg(styles::DIM),
        ));
    }

    let line_style = if is_cursor {
        styles::selected_style()
    } else {
        styles::surface_style()
    };
    ListItem::new(Line::from(spans)).style(line_style)
}

/// First row to draw so the cursor stays visible, centered where possible
fn viewport_offset(cursor: usize, len: usize, height: usize) -> usize {
    if len <= height {
        0
    } else if cursor < height / 2 {
        0
    } else if cursor > len.saturating_sub(height / 2) {
        len.saturating_sub(height)
    } else {
        cursor.saturating_sub(height / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::viewport_offset;

    #[test]
    fn everything_fits_without_scrolling() {
        assert_eq!(viewport_offset(5, 10, 20), 0);
    }

    #[test]
    fn cursor_near_top_keeps_offset_zero() {
        assert_eq!(viewport_offset(3, 100, 20), 0);
    }

    #[test]
    fn cursor_in_middle_is_centered() {
        assert_eq!(viewport_offset(50, 100, 20), 40);
    }

    #[test]
    fn cursor_near_bottom_pins_last_page() {
        assert_eq!(viewport_offset(99, 100, 20), 80);
    }

    #[test]
    fn zero_height_does_not_panic() {
        assert_eq!(viewport_offset(0, 3, 0), 0);
    }
}
