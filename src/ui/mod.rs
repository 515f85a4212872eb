mod diff_view;
mod file_tree;
pub mod highlight;
mod status_bar;
mod styles;

use crate::app::App;
use highlight::Highlighter;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

/// Render the entire UI
pub fn draw(f: &mut Frame, app: &App, hl: &Highlighter) {
    let bottom_height = status_bar::bottom_bar_height(app, f.area().width);

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),             // top bar
            Constraint::Min(1),                // main content
            Constraint::Length(bottom_height), // key hints / prompt
        ])
        .split(f.area());

    status_bar::render_top_bar(f, outer[0], app);

    let tree_width = if outer[1].width < 80 { 28 } else { 36 };
    let main_area = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(tree_width), Constraint::Min(1)])
        .split(outer[1]);

    file_tree::render(f, main_area[0], app);
    diff_view::render(f, main_area[1], app, hl);

    status_bar::render_bottom_bar(f, outer[2], app);

    if let Some(ref msg) = app.message {
        status_bar::render_notification(f, f.area(), msg);
    }
}
