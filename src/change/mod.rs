mod agent;
mod write;

pub use agent::AgentRewriter;
pub use write::{save_download, WriteCapability, WriteCapabilityMap, WriteHandle};

use crate::catalog::FileCatalog;
use crate::error::{ChangeError, ReconstructionError};
use crate::patch::{DiffFile, DiffHunk, NO_NEWLINE_MARKER};
use similar::{ChangeTag, TextDiff};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Lines of unchanged context around each preview hunk
pub const PREVIEW_CONTEXT: usize = 3;

pub const REWRITE_SYSTEM_PROMPT: &str = "You apply a proposed change to a source file. \
The proposed change may be a fragment or a partial snippet. Merge it into the original \
and reply with the complete updated file only, as plain text, with no explanation and no \
surrounding code fence.";

// ── Types ──

/// The original/proposed pair under review
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub path: String,
    pub original: String,
    /// Fully reconstructed file body; empty while reconstructing
    pub new_content: String,
    pub is_reconstructing: bool,
}

/// Everything the rewrite collaborator needs to reconstruct one file
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    /// Matches the answer to the request that is still outstanding
    pub id: u64,
    pub system_prompt: String,
    pub path: String,
    pub original: String,
    pub fragment: String,
}

/// The AI rewrite collaborator: turns an original file plus a proposed
/// fragment into a complete replacement body.
pub trait Rewriter {
    fn rewrite(&self, request: &RewriteRequest) -> Result<String, ReconstructionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeState {
    Idle,
    Reconstructing { id: u64, change: PendingChange },
    Reviewing(PendingChange),
    /// A direct write failed; kept until the user retries via download or acknowledges
    WriteFailed { change: PendingChange, message: String },
}

impl ChangeState {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeState::Idle => "idle",
            ChangeState::Reconstructing { .. } => "reconstructing",
            ChangeState::Reviewing(_) => "reviewing",
            ChangeState::WriteFailed { .. } => "write failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Written(String),
    Downloaded(PathBuf),
}

// ── Controller ──

/// Drives one rewrite at a time through reconstruct → review → commit.
///
/// The catalog is only touched by a successful commit; every failure or
/// cancellation leaves it as it was.
#[derive(Debug)]
pub struct ChangeController {
    state: ChangeState,
    next_id: u64,
}

impl Default for ChangeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeController {
    pub fn new() -> Self {
        ChangeController {
            state: ChangeState::Idle,
            next_id: 1,
        }
    }

    pub fn state(&self) -> &ChangeState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ChangeState::Idle
    }

    /// The change in flight, whatever its stage
    pub fn pending(&self) -> Option<&PendingChange> {
        match &self.state {
            ChangeState::Idle => None,
            ChangeState::Reconstructing { change, .. }
            | ChangeState::Reviewing(change)
            | ChangeState::WriteFailed { change, .. } => Some(change),
        }
    }

    /// Start reconstructing `path` from a proposed fragment.
    /// Only one change may be in flight; anything but `Idle` is `Busy`.
    pub fn begin(
        &mut self,
        catalog: &FileCatalog,
        path: &str,
        fragment: &str,
    ) -> Result<RewriteRequest, ChangeError> {
        if let Some(current) = self.pending() {
            return Err(ChangeError::Busy {
                path: current.path.clone(),
            });
        }
        let record = catalog
            .get(path)
            .ok_or_else(|| ChangeError::UnknownPath(path.to_string()))?;
        let original = match (&record.content, record.is_text()) {
            (Some(content), true) => content.clone(),
            _ => return Err(ChangeError::NotText(path.to_string())),
        };

        let id = self.next_id;
        self.next_id += 1;
        self.state = ChangeState::Reconstructing {
            id,
            change: PendingChange {
                path: path.to_string(),
                original: original.clone(),
                new_content: String::new(),
                is_reconstructing: true,
            },
        };
        log::info!("Reconstructing {} (request {})", path, id);

        Ok(RewriteRequest {
            id,
            system_prompt: REWRITE_SYSTEM_PROMPT.to_string(),
            path: path.to_string(),
            original,
            fragment: fragment.to_string(),
        })
    }

    /// Deliver the collaborator's answer for request `id`.
    /// On failure the change is discarded and the controller returns to `Idle`.
    pub fn finish(
        &mut self,
        id: u64,
        result: Result<String, ReconstructionError>,
    ) -> Result<&PendingChange, ChangeError> {
        let mut change = match std::mem::replace(&mut self.state, ChangeState::Idle) {
            ChangeState::Reconstructing { id: current, change } if current == id => change,
            other => {
                self.state = other;
                return Err(ChangeError::WrongState("a reconstruction result"));
            }
        };

        match result {
            Ok(body) => {
                change.new_content = body;
                change.is_reconstructing = false;
                log::info!("Reviewing change to {}", change.path);
                self.state = ChangeState::Reviewing(change);
                match &self.state {
                    ChangeState::Reviewing(change) => Ok(change),
                    _ => Err(ChangeError::WrongState("a reconstruction result")),
                }
            }
            Err(source) => {
                log::warn!("Reconstruction of {} failed: {}", change.path, source);
                Err(ChangeError::Reconstruction {
                    path: change.path,
                    source,
                })
            }
        }
    }

    /// Begin and finish in one blocking call
    pub fn reconstruct_with<R: Rewriter + ?Sized>(
        &mut self,
        rewriter: &R,
        catalog: &FileCatalog,
        path: &str,
        fragment: &str,
    ) -> Result<&PendingChange, ChangeError> {
        let request = self.begin(catalog, path, fragment)?;
        let result = rewriter.rewrite(&request);
        self.finish(request.id, result)
    }

    /// Line diff of the change under review (or awaiting retry)
    pub fn preview(&self) -> Option<DiffFile> {
        match &self.state {
            ChangeState::Reviewing(change) | ChangeState::WriteFailed { change, .. } => {
                Some(line_diff(&change.path, &change.original, &change.new_content))
            }
            _ => None,
        }
    }

    /// Commit the change under review.
    ///
    /// A direct handle is used when one exists; otherwise the new content is
    /// saved as a download. Both update the catalog. A failed direct write
    /// moves to `WriteFailed` and never falls back on its own.
    pub fn confirm(
        &mut self,
        catalog: &mut FileCatalog,
        caps: &WriteCapabilityMap,
        download_dir: &Path,
    ) -> Result<CommitOutcome, ChangeError> {
        let change = match std::mem::replace(&mut self.state, ChangeState::Idle) {
            ChangeState::Reviewing(change) => change,
            other => {
                self.state = other;
                return Err(ChangeError::WrongState("confirmation"));
            }
        };
        log::info!("Committing change to {}", change.path);

        let outcome = match caps.get(&change.path) {
            WriteCapability::Direct(handle) => handle
                .write(&change.original, &change.new_content)
                .map(|()| CommitOutcome::Written(change.path.clone())),
            WriteCapability::Unavailable => {
                save_download(download_dir, &change.path, &change.new_content)
                    .map(CommitOutcome::Downloaded)
            }
        };

        match outcome {
            Ok(outcome) => {
                apply_to_catalog(catalog, &change);
                Ok(outcome)
            }
            Err(e) => {
                log::warn!("Write-back of {} failed: {}", change.path, e);
                self.state = ChangeState::WriteFailed {
                    change,
                    message: e.to_string(),
                };
                Err(e.into())
            }
        }
    }

    /// Decline the change under review, or abandon an outstanding
    /// reconstruction. The catalog is untouched.
    pub fn cancel(&mut self) -> bool {
        match &self.state {
            ChangeState::Reviewing(change) | ChangeState::Reconstructing { change, .. } => {
                log::info!("Cancelled change to {}", change.path);
                self.state = ChangeState::Idle;
                true
            }
            _ => false,
        }
    }

    /// After a failed direct write, save the change as a download instead
    pub fn retry_via_download(
        &mut self,
        catalog: &mut FileCatalog,
        download_dir: &Path,
    ) -> Result<PathBuf, ChangeError> {
        let (change, message) = match std::mem::replace(&mut self.state, ChangeState::Idle) {
            ChangeState::WriteFailed { change, message } => (change, message),
            other => {
                self.state = other;
                return Err(ChangeError::WrongState("a download retry"));
            }
        };

        match save_download(download_dir, &change.path, &change.new_content) {
            Ok(target) => {
                apply_to_catalog(catalog, &change);
                Ok(target)
            }
            Err(e) => {
                log::warn!("Download of {} failed: {}", change.path, e);
                self.state = ChangeState::WriteFailed { change, message };
                Err(e.into())
            }
        }
    }

    /// Discard a failed change once the user has seen the error
    pub fn acknowledge_failure(&mut self) -> bool {
        if let ChangeState::WriteFailed { change, .. } = &self.state {
            log::info!("Discarded failed change to {}", change.path);
            self.state = ChangeState::Idle;
            return true;
        }
        false
    }
}

fn apply_to_catalog(catalog: &mut FileCatalog, change: &PendingChange) {
    if !catalog.update_content(&change.path, &change.new_content) {
        log::warn!("{} left the catalog before its change was committed", change.path);
    }
}

// ── Preview ──

/// Compute a unified line diff between two bodies, directly as hunks
pub fn line_diff(path: &str, original: &str, new_content: &str) -> DiffFile {
    let diff = TextDiff::from_lines(original, new_content);
    let mut file = DiffFile::new(path, path);

    for group in diff.grouped_ops(PREVIEW_CONTEXT) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let mut hunk = DiffHunk {
            old_start: hunk_start(&old_range),
            old_count: old_range.len(),
            new_start: hunk_start(&new_range),
            new_count: new_range.len(),
            section: String::new(),
            lines: Vec::new(),
        };
        for op in &group {
            for change in diff.iter_changes(op) {
                let prefix = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                let value = change.value();
                let text = value.strip_suffix('\n').unwrap_or(value);
                hunk.lines.push(format!("{}{}", prefix, text));
                if change.missing_newline() {
                    hunk.lines.push(NO_NEWLINE_MARKER.to_string());
                }
            }
        }
        file.push_hunk(hunk);
    }
    file
}

/// 1-based start line; an empty range names the line before it
fn hunk_start(range: &Range<usize>) -> usize {
    if range.is_empty() {
        range.start
    } else {
        range.start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FileKind, FileRecord};
    use crate::patch::{unified_rows, LineType};
    use std::cell::Cell;
    use std::fs;

    struct FakeRewriter {
        reply: Result<String, String>,
        calls: Cell<usize>,
    }

    impl FakeRewriter {
        fn ok(body: &str) -> Self {
            FakeRewriter {
                reply: Ok(body.to_string()),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            FakeRewriter {
                reply: Err("model unavailable".to_string()),
                calls: Cell::new(0),
            }
        }
    }

    impl Rewriter for FakeRewriter {
        fn rewrite(&self, request: &RewriteRequest) -> Result<String, ReconstructionError> {
            self.calls.set(self.calls.get() + 1);
            assert!(!request.fragment.is_empty());
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(msg) => Err(ReconstructionError::Failed {
                    command: "fake".into(),
                    status: "exit status: 1".into(),
                    stderr: msg.clone(),
                }),
            }
        }
    }

    const ORIGINAL: &str = "fn a() {}\nfn b() {}\nfn c() {}\n";
    const REWRITTEN: &str = "fn a() {}\nfn b() { 2 }\nfn c() {}\n";

    fn catalog() -> FileCatalog {
        let mut rec = FileRecord::text("src/lib.rs", ORIGINAL);
        rec.selected = true;
        FileCatalog::new(vec![
            rec,
            FileRecord::without_content("logo.png", FileKind::Binary, 10),
        ])
    }

    fn reviewing(catalog: &FileCatalog) -> ChangeController {
        let mut ctl = ChangeController::new();
        ctl.reconstruct_with(&FakeRewriter::ok(REWRITTEN), catalog, "src/lib.rs", "fn b() { 2 }")
            .unwrap();
        ctl
    }

    #[test]
    fn reconstruction_moves_to_reviewing() {
        let catalog = catalog();
        let ctl = reviewing(&catalog);
        let pending = ctl.pending().unwrap();
        assert_eq!(pending.original, ORIGINAL);
        assert_eq!(pending.new_content, REWRITTEN);
        assert!(!pending.is_reconstructing);
        assert_eq!(ctl.state().label(), "reviewing");
    }

    #[test]
    fn begin_marks_change_as_reconstructing() {
        let catalog = catalog();
        let mut ctl = ChangeController::new();
        let request = ctl.begin(&catalog, "src/lib.rs", "x").unwrap();
        assert_eq!(request.original, ORIGINAL);
        assert_eq!(request.system_prompt, REWRITE_SYSTEM_PROMPT);
        assert!(ctl.pending().unwrap().is_reconstructing);
        assert!(ctl.preview().is_none());
    }

    #[test]
    fn second_request_while_busy_is_rejected() {
        let catalog = catalog();
        let mut ctl = ChangeController::new();
        ctl.begin(&catalog, "src/lib.rs", "x").unwrap();
        let err = ctl.begin(&catalog, "src/lib.rs", "y").unwrap_err();
        assert!(matches!(err, ChangeError::Busy { .. }));

        let rewriter = FakeRewriter::ok(REWRITTEN);
        assert!(ctl.reconstruct_with(&rewriter, &catalog, "src/lib.rs", "y").is_err());
        assert_eq!(rewriter.calls.get(), 0);
    }

    #[test]
    fn unknown_and_binary_paths_are_rejected() {
        let catalog = catalog();
        let mut ctl = ChangeController::new();
        assert!(matches!(
            ctl.begin(&catalog, "nope.rs", "x"),
            Err(ChangeError::UnknownPath(_))
        ));
        assert!(matches!(
            ctl.begin(&catalog, "logo.png", "x"),
            Err(ChangeError::NotText(_))
        ));
        assert!(ctl.is_idle());
    }

    #[test]
    fn reconstruction_failure_returns_to_idle_with_content_unchanged() {
        let mut catalog = catalog();
        let before = catalog.snapshot();
        let mut ctl = ChangeController::new();
        let err = ctl
            .reconstruct_with(&FakeRewriter::failing(), &catalog, "src/lib.rs", "x")
            .unwrap_err();
        assert!(matches!(err, ChangeError::Reconstruction { .. }));
        assert!(err.to_string().contains("src/lib.rs"));
        assert!(ctl.is_idle());
        assert_eq!(catalog.snapshot(), before);

        // the controller is usable again
        let dir = tempfile::tempdir().unwrap();
        ctl.reconstruct_with(&FakeRewriter::ok(REWRITTEN), &catalog, "src/lib.rs", "x")
            .unwrap();
        ctl.confirm(&mut catalog, &WriteCapabilityMap::new(), dir.path())
            .unwrap();
    }

    #[test]
    fn stale_result_for_abandoned_request_is_ignored() {
        let catalog = catalog();
        let mut ctl = ChangeController::new();
        let first = ctl.begin(&catalog, "src/lib.rs", "x").unwrap();
        assert!(ctl.cancel());
        let second = ctl.begin(&catalog, "src/lib.rs", "y").unwrap();

        assert!(matches!(
            ctl.finish(first.id, Ok("old answer".into())),
            Err(ChangeError::WrongState(_))
        ));
        let pending = ctl.finish(second.id, Ok(REWRITTEN.into())).unwrap();
        assert_eq!(pending.new_content, REWRITTEN);
    }

    #[test]
    fn preview_is_a_line_diff_of_the_change() {
        let catalog = catalog();
        let ctl = reviewing(&catalog);
        let diff = ctl.preview().unwrap();
        assert_eq!(diff.display_path(), "src/lib.rs");
        assert_eq!((diff.additions, diff.deletions), (1, 1));
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3));
        assert_eq!((hunk.new_start, hunk.new_count), (1, 3));
        assert_eq!(
            hunk.lines,
            vec![" fn a() {}", "-fn b() {}", "+fn b() { 2 }", " fn c() {}"]
        );

        let rows = unified_rows(hunk);
        assert_eq!(rows[2].line_type, LineType::Add);
        assert_eq!(rows[2].new_num, Some(2));
    }

    #[test]
    fn line_diff_limits_context_and_numbers_insertions() {
        let original: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let updated = original.replace("line 10\n", "line 10\ninserted\n");
        let diff = line_diff("f.txt", &original, &updated);
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (8, 6));
        assert_eq!((hunk.new_start, hunk.new_count), (8, 7));
        assert!(line_diff("f.txt", &original, &original).hunks.is_empty());

        let from_empty = line_diff("new.txt", "", "a\nb\n");
        assert_eq!(from_empty.hunks[0].old_start, 0);
        assert_eq!(from_empty.hunks[0].new_start, 1);
        assert_eq!(from_empty.additions, 2);
    }

    #[test]
    fn line_diff_marks_a_missing_final_newline() {
        let diff = line_diff("f.txt", "a\nb", "a\nb\n");
        let lines = &diff.hunks[0].lines;
        assert_eq!(lines, &vec![" a", "-b", NO_NEWLINE_MARKER, "+b"]);
        assert_eq!((diff.additions, diff.deletions), (1, 1));

        let rows = unified_rows(&diff.hunks[0]);
        assert_eq!(rows.len(), 3);
        assert!(rows[1].no_newline);
        assert!(!rows[2].no_newline);
    }

    #[test]
    fn line_diff_keeps_carriage_returns_visible() {
        let diff = line_diff("f.txt", "a\r\n", "a\n");
        assert_eq!(diff.hunks[0].lines, vec!["-a\r", "+a"]);
    }

    #[test]
    fn confirm_without_handle_downloads_and_updates_catalog() {
        let mut catalog = catalog();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = reviewing(&catalog);

        let outcome = ctl
            .confirm(&mut catalog, &WriteCapabilityMap::new(), dir.path())
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Downloaded(dir.path().join("lib.rs")));
        assert_eq!(fs::read_to_string(dir.path().join("lib.rs")).unwrap(), REWRITTEN);

        let rec = catalog.get("src/lib.rs").unwrap();
        assert_eq!(rec.content.as_deref(), Some(REWRITTEN));
        assert_eq!(rec.size_bytes, REWRITTEN.len() as u64);
        assert!(rec.selected);
        assert!(ctl.is_idle());
    }

    #[test]
    fn confirm_with_handle_writes_in_place() {
        let project = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), ORIGINAL).unwrap();
        let caps = WriteCapabilityMap::acquire(project.path(), ["src/lib.rs"]);

        let mut catalog = catalog();
        let mut ctl = reviewing(&catalog);
        let outcome = ctl.confirm(&mut catalog, &caps, project.path()).unwrap();
        assert_eq!(outcome, CommitOutcome::Written("src/lib.rs".into()));
        assert_eq!(fs::read_to_string(project.path().join("src/lib.rs")).unwrap(), REWRITTEN);
        assert_eq!(catalog.get("src/lib.rs").unwrap().content.as_deref(), Some(REWRITTEN));
    }

    #[test]
    fn cancel_leaves_catalog_identical() {
        let catalog = catalog();
        let before = catalog.snapshot();
        let version = catalog.version();
        let mut ctl = reviewing(&catalog);
        assert!(ctl.cancel());
        assert!(ctl.is_idle());
        assert_eq!(catalog.snapshot(), before);
        assert_eq!(catalog.version(), version);
        assert!(!ctl.cancel());
    }

    #[test]
    fn direct_write_failure_waits_for_user() {
        let project = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), ORIGINAL).unwrap();
        let caps = WriteCapabilityMap::acquire(project.path(), ["src/lib.rs"]);
        fs::remove_file(project.path().join("src/lib.rs")).unwrap();

        let mut catalog = catalog();
        let before = catalog.snapshot();
        let mut ctl = reviewing(&catalog);
        let err = ctl.confirm(&mut catalog, &caps, project.path()).unwrap_err();
        assert!(matches!(err, ChangeError::Write(_)));
        assert_eq!(catalog.snapshot(), before);
        assert!(matches!(ctl.state(), ChangeState::WriteFailed { .. }));

        // no silent fallback: nothing was downloaded, and a new change is refused
        assert!(!project.path().join("lib.rs").exists());
        assert!(matches!(
            ctl.begin(&catalog, "src/lib.rs", "x"),
            Err(ChangeError::Busy { .. })
        ));
        assert!(ctl.preview().is_some());

        assert!(ctl.acknowledge_failure());
        assert!(ctl.is_idle());
        assert_eq!(catalog.snapshot(), before);
    }

    #[test]
    fn retry_via_download_after_write_failure() {
        let project = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), "changed on disk\n").unwrap();
        let caps = WriteCapabilityMap::acquire(project.path(), ["src/lib.rs"]);

        let mut catalog = catalog();
        let mut ctl = reviewing(&catalog);
        let err = ctl.confirm(&mut catalog, &caps, downloads.path()).unwrap_err();
        assert!(err.to_string().contains("changed on disk"));

        let target = ctl.retry_via_download(&mut catalog, downloads.path()).unwrap();
        assert_eq!(target, downloads.path().join("lib.rs"));
        assert_eq!(catalog.get("src/lib.rs").unwrap().content.as_deref(), Some(REWRITTEN));
        assert!(ctl.is_idle());
    }

    #[test]
    fn operations_out_of_order_are_wrong_state() {
        let mut catalog = catalog();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = ChangeController::new();
        assert!(matches!(
            ctl.confirm(&mut catalog, &WriteCapabilityMap::new(), dir.path()),
            Err(ChangeError::WrongState(_))
        ));
        assert!(matches!(
            ctl.retry_via_download(&mut catalog, dir.path()),
            Err(ChangeError::WrongState(_))
        ));
        assert!(!ctl.acknowledge_failure());
        assert!(ctl.is_idle());
    }
}
