use ratatui::style::{Color, Style};
use ratatui::text::Span;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;

const THEME: &str = "base16-ocean.dark";

/// Cached syntax highlighting state, loaded once and reused for all files.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Highlighter {
            // two-face bundles the syntaxes syntect lacks (TOML, TypeScript, Svelte, ...)
            syntax_set: two_face::syntax::extra_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    /// Highlight a single line of code, returning styled spans.
    /// `filename` picks the syntax; `base_style` keeps add/delete backgrounds.
    pub fn highlight_line(&self, line: &str, filename: &str, base_style: Style) -> Vec<Span<'static>> {
        let syntax = self
            .syntax_set
            .find_syntax_for_file(filename)
            .ok()
            .flatten()
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let Some(theme) = self.theme_set.themes.get(THEME) else {
            return vec![Span::styled(line.to_string(), base_style)];
        };
        let mut highlighter = HighlightLines::new(syntax, theme);

        // syntect needs a trailing newline
        let input = format!("{}\n", line.trim_end_matches('\n'));

        match highlighter.highlight_line(&input, &self.syntax_set) {
            Ok(ranges) => ranges
                .into_iter()
                .filter_map(|(syn_style, text)| {
                    let text = text.trim_end_matches('\n');
                    if text.is_empty() {
                        return None;
                    }
                    let fg = Color::Rgb(
                        syn_style.foreground.r,
                        syn_style.foreground.g,
                        syn_style.foreground.b,
                    );
                    Some(Span::styled(text.to_string(), base_style.fg(fg)))
                })
                .collect(),
            Err(_) => vec![Span::styled(line.to_string(), base_style)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlighted_text_round_trips() {
        let hl = Highlighter::new();
        let spans = hl.highlight_line("let x = 1;", "main.rs", Style::default());
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "let x = 1;");
        assert!(spans.len() > 1);
    }

    #[test]
    fn unknown_extension_falls_back_to_plain_text() {
        let hl = Highlighter::new();
        let spans = hl.highlight_line("hello", "notes.unknown-ext", Style::default());
        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "hello");
    }
}
