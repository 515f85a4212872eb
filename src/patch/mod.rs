mod parse;
mod render;

pub use parse::{parse, try_parse};
pub use render::{render_split, render_unified, split_rows, unified_rows, DiffLayout, SplitCell, SplitRow, UnifiedRow};

/// Path used by unified diffs for the missing side of an added or deleted file
pub const NULL_DEVICE: &str = "/dev/null";

/// Follows a hunk line whose text has no trailing newline
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Context,
    Add,
    Delete,
}

impl LineType {
    /// Classify a raw hunk line by its prefix. An empty line counts as
    /// context (some tools strip the leading space of blank context lines).
    pub fn of(raw: &str) -> Option<LineType> {
        match raw.as_bytes().first() {
            None | Some(b' ') => Some(LineType::Context),
            Some(b'+') => Some(LineType::Add),
            Some(b'-') => Some(LineType::Delete),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LineType::Context => " ",
            LineType::Add => "+",
            LineType::Delete => "-",
        }
    }
}

/// Text of a raw hunk line without its prefix
pub fn line_content(raw: &str) -> &str {
    raw.get(1..).unwrap_or("")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
}

impl ChangeType {
    pub fn from_paths(old_path: &str, new_path: &str) -> Self {
        if old_path == NULL_DEVICE {
            ChangeType::Add
        } else if new_path == NULL_DEVICE {
            ChangeType::Delete
        } else {
            ChangeType::Modify
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeType::Add => "+",
            ChangeType::Delete => "-",
            ChangeType::Modify => "~",
        }
    }
}

/// A contiguous changed region. Lines keep their `+`/`-`/` ` prefix;
/// line numbers are derived while rendering, never stored per line.
/// Previews may follow a line with a `\ No newline at end of file` marker,
/// which is neither counted nor rendered as a row.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Text after the closing `@@`, usually the enclosing function
    pub section: String,
    pub lines: Vec<String>,
}

impl DiffHunk {
    pub fn header(&self) -> String {
        let base = format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        );
        if self.section.is_empty() {
            base
        } else {
            format!("{} {}", base, self.section)
        }
    }

    pub fn additions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| LineType::of(l) == Some(LineType::Add))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| LineType::of(l) == Some(LineType::Delete))
            .count()
    }

    /// Format this hunk as patch text
    pub fn to_text(&self) -> String {
        let mut text = self.header();
        text.push('\n');
        for line in &self.lines {
            if line.is_empty() {
                text.push(' ');
            } else {
                text.push_str(line);
            }
            text.push('\n');
        }
        text
    }
}

/// One file section of a patch
#[derive(Debug, Clone, PartialEq)]
pub struct DiffFile {
    pub old_path: String,
    pub new_path: String,
    pub change_type: ChangeType,
    pub hunks: Vec<DiffHunk>,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffFile {
    pub fn new(old_path: &str, new_path: &str) -> Self {
        DiffFile {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
            change_type: ChangeType::from_paths(old_path, new_path),
            hunks: Vec::new(),
            additions: 0,
            deletions: 0,
        }
    }

    /// Append a hunk and fold its counts into the file totals
    pub fn push_hunk(&mut self, hunk: DiffHunk) {
        self.additions += hunk.additions();
        self.deletions += hunk.deletions();
        self.hunks.push(hunk);
    }

    /// The path worth showing: the old one for deletions, the new one otherwise
    pub fn display_path(&self) -> &str {
        match self.change_type {
            ChangeType::Delete => &self.old_path,
            _ => &self.new_path,
        }
    }

    /// Format the whole file section as patch text
    pub fn to_text(&self) -> String {
        let old = if self.old_path == NULL_DEVICE {
            NULL_DEVICE.to_string()
        } else {
            format!("a/{}", self.old_path)
        };
        let new = if self.new_path == NULL_DEVICE {
            NULL_DEVICE.to_string()
        } else {
            format!("b/{}", self.new_path)
        };
        let mut text = format!("--- {}\n+++ {}\n", old, new);
        for hunk in &self.hunks {
            text.push_str(&hunk.to_text());
        }
        text
    }
}
