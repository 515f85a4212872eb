use super::{DiffFile, DiffHunk, LineType, NULL_DEVICE};
use crate::error::ParseError;

/// Parse unified diff text into per-file sections.
///
/// Never fails: malformed input is logged and yields an empty list, so
/// callers treat the result as "no diff loaded" rather than showing a
/// partial one.
pub fn parse(raw: &str) -> Vec<DiffFile> {
    match try_parse(raw) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Failed to parse patch: {}", e);
            Vec::new()
        }
    }
}

/// Parse unified diff text, reporting the first structural problem.
///
/// File sections start at a `--- old` / `+++ new` header pair. Hunk bodies
/// are consumed by the counts in their `@@` header, so a deleted line that
/// happens to read `-- x` is never mistaken for a new file header. Lines
/// outside hunks (git preamble, commit messages) are ignored.
pub fn try_parse(raw: &str) -> Result<Vec<DiffFile>, ParseError> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current: Option<DiffFile> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        // File header pair: --- a/path / +++ b/path
        if let Some(old) = line.strip_prefix("--- ") {
            let new = lines
                .get(i + 1)
                .and_then(|l| l.strip_prefix("+++ "))
                .ok_or(ParseError::MissingNewHeader { line: i + 1 })?;
            if let Some(file) = current.take() {
                files.push(file);
            }
            current = Some(DiffFile::new(&clean_path(old, "a/"), &clean_path(new, "b/")));
            i += 2;
            continue;
        }

        // Hunk header: @@ -old_start,old_count +new_start,new_count @@ section
        if line.starts_with("@@") {
            let file = current
                .as_mut()
                .ok_or(ParseError::HunkOutsideFile { line: i + 1 })?;
            let mut hunk = parse_hunk_header(line).ok_or_else(|| ParseError::BadHunkHeader {
                line: i + 1,
                text: line.to_string(),
            })?;
            i += 1;
            i = read_hunk_body(&lines, i, &mut hunk)?;
            file.push_hunk(hunk);
            continue;
        }

        i += 1;
    }

    if let Some(file) = current {
        files.push(file);
    }

    if files.is_empty() && !raw.trim().is_empty() {
        return Err(ParseError::NoFileSections);
    }
    Ok(files)
}

/// Consume exactly the lines announced by the hunk header, starting at `i`.
/// Returns the index of the first line after the hunk.
fn read_hunk_body(lines: &[&str], mut i: usize, hunk: &mut DiffHunk) -> Result<usize, ParseError> {
    let mut old_left = hunk.old_count;
    let mut new_left = hunk.new_count;

    while old_left > 0 || new_left > 0 {
        let Some(&body) = lines.get(i) else {
            return Err(ParseError::TruncatedHunk {
                line: i + 1,
                old_left,
                new_left,
            });
        };

        // Skip "\ No newline at end of file"
        if body.starts_with('\\') {
            i += 1;
            continue;
        }

        let fits = match LineType::of(body) {
            Some(LineType::Context) => old_left > 0 && new_left > 0,
            Some(LineType::Delete) => old_left > 0,
            Some(LineType::Add) => new_left > 0,
            None => false,
        };
        if !fits {
            if body.starts_with("@@") || body.starts_with("--- ") || body.starts_with("diff ") {
                return Err(ParseError::TruncatedHunk {
                    line: i + 1,
                    old_left,
                    new_left,
                });
            }
            return Err(ParseError::UnexpectedLine {
                line: i + 1,
                text: body.to_string(),
            });
        }

        match LineType::of(body) {
            Some(LineType::Context) => {
                old_left -= 1;
                new_left -= 1;
            }
            Some(LineType::Delete) => old_left -= 1,
            Some(LineType::Add) => new_left -= 1,
            None => {}
        }
        hunk.lines.push(body.to_string());
        i += 1;
    }

    while lines.get(i).is_some_and(|l| l.starts_with('\\')) {
        i += 1;
    }
    Ok(i)
}

/// Strip a trailing tab-separated timestamp and the conventional side prefix
fn clean_path(raw: &str, prefix: &str) -> String {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == NULL_DEVICE {
        return path.to_string();
    }
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// Parse a hunk header like "@@ -10,4 +10,15 @@ fn foo()"
fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    // Find the range info between @@ markers
    let after_first = line.strip_prefix("@@ ")?;
    let end_idx = after_first.find(" @@")?;
    let range_str = &after_first[..end_idx];
    let section = after_first[end_idx + 3..].trim().to_string();

    // Parse "-old_start,old_count +new_start,new_count"
    let parts: Vec<&str> = range_str.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }

    let (old_start, old_count) = parse_range(parts[0].strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(parts[1].strip_prefix('+')?)?;

    Some(DiffHunk {
        old_start,
        old_count,
        new_start,
        new_count,
        section,
        lines: Vec::new(),
    })
}

/// Parse "start,count" or just "start" (count defaults to 1)
fn parse_range(s: &str) -> Option<(usize, usize)> {
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::ChangeType;

    #[test]
    fn parses_single_file_scenario() {
        let raw = "--- a/f.txt\n+++ b/f.txt\n@@ -1,2 +1,3 @@\n context\n-old\n+new1\n+new2\n";
        let files = parse(raw);
        assert_eq!(files.len(), 1);
        let f = &files[0];
        assert_eq!(f.old_path, "f.txt");
        assert_eq!(f.new_path, "f.txt");
        assert_eq!(f.change_type, ChangeType::Modify);
        assert_eq!(f.additions, 2);
        assert_eq!(f.deletions, 1);
        assert_eq!(f.hunks.len(), 1);
        assert_eq!(f.hunks[0].lines, vec![" context", "-old", "+new1", "+new2"]);
    }

    #[test]
    fn parses_git_diff_with_preamble() {
        let raw = r#"diff --git a/src/main.rs b/src/main.rs
index abc123..def456 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@ fn main()
 fn main() {
+    println!("hello");
     let x = 1;
 }
"#;
        let files = parse(raw);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path, "src/main.rs");
        assert_eq!(files[0].additions, 1);
        assert_eq!(files[0].deletions, 0);
        assert_eq!(files[0].hunks[0].section, "fn main()");
        assert_eq!(files[0].hunks[0].lines.len(), 4);
    }

    #[test]
    fn new_and_deleted_files_from_null_device() {
        let raw = "--- /dev/null\n+++ b/new.rs\n@@ -0,0 +1,2 @@\n+fn hello() {}\n+fn world() {}\n\
                   --- a/old.rs\n+++ /dev/null\n@@ -1 +0,0 @@\n-gone\n";
        let files = parse(raw);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].change_type, ChangeType::Add);
        assert_eq!(files[0].old_path, "/dev/null");
        assert_eq!(files[0].additions, 2);
        assert_eq!(files[1].change_type, ChangeType::Delete);
        assert_eq!(files[1].display_path(), "old.rs");
        assert_eq!(files[1].deletions, 1);
    }

    #[test]
    fn file_counts_equal_prefixed_lines_across_sections() {
        let raw = "--- a/one.rs\n+++ b/one.rs\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n@@ -10,2 +10,1 @@\n-x\n-y\n+z\n\
                   --- a/two.rs\n+++ b/two.rs\n@@ -5,1 +5,3 @@\n keep\n+p\n+q\n";
        let files = parse(raw);
        assert_eq!(files.len(), 2);
        for file in &files {
            let adds: usize = file.hunks.iter().flat_map(|h| &h.lines).filter(|l| l.starts_with('+')).count();
            let dels: usize = file.hunks.iter().flat_map(|h| &h.lines).filter(|l| l.starts_with('-')).count();
            assert_eq!(file.additions, adds);
            assert_eq!(file.deletions, dels);
        }
        assert_eq!((files[0].additions, files[0].deletions), (2, 3));
        assert_eq!((files[1].additions, files[1].deletions), (2, 0));
        assert_eq!(files[0].hunks[1].old_start, 10);
    }

    #[test]
    fn deleted_line_resembling_header_stays_in_hunk() {
        let raw = "--- a/sql.txt\n+++ b/sql.txt\n@@ -1,2 +1,1 @@\n--- comment\n keep\n";
        let files = try_parse(raw).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].deletions, 1);
        assert_eq!(files[0].hunks[0].lines[0], "--- comment");
    }

    #[test]
    fn strips_timestamps_after_tab() {
        let raw = "--- a/f.c\t2024-01-01 00:00:00\n+++ b/f.c\t2024-01-02 00:00:00\n@@ -1 +1 @@\n-a\n+b\n";
        let files = try_parse(raw).unwrap();
        assert_eq!(files[0].old_path, "f.c");
        assert_eq!(files[0].new_path, "f.c");
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let raw = "--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+b\n\\ No newline at end of file\n";
        let files = try_parse(raw).unwrap();
        assert_eq!(files[0].hunks[0].lines, vec!["-a", "+b"]);
    }

    #[test]
    fn blank_line_inside_hunk_is_context() {
        let raw = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
        let files = try_parse(raw).unwrap();
        assert_eq!(files[0].hunks[0].lines.len(), 4);
    }

    #[test]
    fn truncated_hunk_is_an_error() {
        let raw = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n";
        assert!(matches!(
            try_parse(raw),
            Err(ParseError::TruncatedHunk { old_left: 2, new_left: 2, .. })
        ));
        assert!(parse(raw).is_empty());
    }

    #[test]
    fn malformed_inputs_yield_empty_list() {
        let cases = [
            "--- a/f\nnot a header\n",
            "--- a/f\n+++ b/f\n@@ garbage @@\n",
            "@@ -1 +1 @@\n-a\n+b\n",
            "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n?weird\n",
            "just some prose, no diff here\n",
        ];
        for raw in cases {
            assert!(try_parse(raw).is_err(), "{raw:?} should fail");
            assert!(parse(raw).is_empty());
        }
    }

    #[test]
    fn empty_input_is_no_diff_not_an_error() {
        assert_eq!(try_parse("").unwrap(), Vec::new());
        assert_eq!(try_parse("\n  \n").unwrap(), Vec::new());
    }

    #[test]
    fn parse_hunk_header_defaults_count_to_one() {
        let h = parse_hunk_header("@@ -10 +12 @@").unwrap();
        assert_eq!((h.old_start, h.old_count, h.new_start, h.new_count), (10, 1, 12, 1));
        let h = parse_hunk_header("@@ -10,4 +10,15 @@ impl Foo").unwrap();
        assert_eq!(h.new_count, 15);
        assert_eq!(h.section, "impl Foo");
    }
}
