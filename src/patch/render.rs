use super::{line_content, DiffFile, DiffHunk, LineType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffLayout {
    #[default]
    Unified,
    Split,
}

impl DiffLayout {
    pub fn toggle(self) -> Self {
        match self {
            DiffLayout::Unified => DiffLayout::Split,
            DiffLayout::Split => DiffLayout::Unified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiffLayout::Unified => "UNIFIED",
            DiffLayout::Split => "SPLIT",
        }
    }
}

/// One row of the unified stream
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRow<'a> {
    pub line_type: LineType,
    pub old_num: Option<usize>,
    pub new_num: Option<usize>,
    pub content: &'a str,
    /// The line is the last one of its side and lacks a trailing newline
    pub no_newline: bool,
}

/// One side of a split row
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCell<'a> {
    pub line_type: LineType,
    pub num: usize,
    pub content: &'a str,
    pub no_newline: bool,
}

/// A split row. Every source line occupies exactly one row: context fills
/// both sides, a deletion only the left, an addition only the right.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRow<'a> {
    pub left: Option<SplitCell<'a>>,
    pub right: Option<SplitCell<'a>>,
}

/// Running line numbers for one render pass over a hunk
struct Counters {
    old: usize,
    new: usize,
}

impl Counters {
    fn seeded(hunk: &DiffHunk) -> Self {
        Counters {
            old: hunk.old_start,
            new: hunk.new_start,
        }
    }

    /// Advance past one line, returning the (old, new) numbers it occupies
    fn step(&mut self, line_type: LineType) -> (Option<usize>, Option<usize>) {
        match line_type {
            LineType::Context => {
                let nums = (Some(self.old), Some(self.new));
                self.old += 1;
                self.new += 1;
                nums
            }
            LineType::Delete => {
                let nums = (Some(self.old), None);
                self.old += 1;
                nums
            }
            LineType::Add => {
                let nums = (None, Some(self.new));
                self.new += 1;
                nums
            }
        }
    }
}

/// Unified rows for a hunk. Lines with an unknown prefix are skipped.
pub fn unified_rows(hunk: &DiffHunk) -> Vec<UnifiedRow<'_>> {
    let mut counters = Counters::seeded(hunk);
    let lines = &hunk.lines;
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let line_type = LineType::of(raw)?;
            let (old_num, new_num) = counters.step(line_type);
            Some(UnifiedRow {
                line_type,
                old_num,
                new_num,
                content: line_content(raw),
                no_newline: lines.get(i + 1).is_some_and(|next| next.starts_with('\\')),
            })
        })
        .collect()
}

/// Split rows for a hunk, aligned index-for-index with the unified stream
pub fn split_rows(hunk: &DiffHunk) -> Vec<SplitRow<'_>> {
    unified_rows(hunk)
        .into_iter()
        .map(|row| {
            let left = row.old_num.map(|num| SplitCell {
                line_type: row.line_type,
                num,
                content: row.content,
                no_newline: row.no_newline,
            });
            let right = row.new_num.map(|num| SplitCell {
                line_type: row.line_type,
                num,
                content: row.content,
                no_newline: row.no_newline,
            });
            SplitRow { left, right }
        })
        .collect()
}

/// Unified rows per hunk, in hunk order
pub fn render_unified(file: &DiffFile) -> Vec<Vec<UnifiedRow<'_>>> {
    file.hunks.iter().map(unified_rows).collect()
}

/// Split rows per hunk, in hunk order
pub fn render_split(file: &DiffFile) -> Vec<Vec<SplitRow<'_>>> {
    file.hunks.iter().map(split_rows).collect()
}
