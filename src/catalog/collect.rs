use super::{FileKind, FileRecord};
use crate::error::CollectionError;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Bytes inspected for a NUL when deciding whether a file is binary
const BINARY_SNIFF_LEN: usize = 8000;

/// Options for a collection pass
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Substring patterns matched against the relative path; any hit skips the entry
    pub ignore: Vec<String>,
    /// Files above this size are recorded as oversized with no content
    pub max_file_bytes: u64,
    /// Mark every text file selected
    pub select_by_default: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            max_file_bytes: 512 * 1024,
            select_by_default: true,
        }
    }
}

impl CollectOptions {
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.ignore
            .iter()
            .any(|p| !p.is_empty() && rel_path.contains(p.as_str()))
    }
}

/// Result of a collection pass: all readable records plus per-entry failures.
/// The records are meant to be swapped into the catalog in one step.
#[derive(Debug, Default)]
pub struct Collection {
    pub records: Vec<FileRecord>,
    pub errors: Vec<CollectionError>,
}

/// Walk `root` and build a record for every non-ignored file.
/// Unreadable entries are logged and skipped; the walk continues.
pub fn collect(root: &Path, opts: &CollectOptions) -> Collection {
    let mut out = Collection::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            // Directories are tested with a trailing slash so "target/" prunes the walk
            match relative_path(root, e.path()) {
                Some(rel) => !opts.is_ignored(&format!("{}/", rel)),
                None => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| relative_path(root, p))
                    .unwrap_or_default();
                let err = CollectionError::Walk {
                    path,
                    message: e.to_string(),
                };
                log::warn!("Skipping entry: {}", err);
                out.errors.push(err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(rel) = relative_path(root, entry.path()) else {
            continue;
        };
        if opts.is_ignored(&rel) {
            continue;
        }

        match read_record(entry.path(), &rel, opts) {
            Ok(mut record) => {
                record.selected = opts.select_by_default && record.is_text();
                out.records.push(record);
            }
            Err(source) => {
                let err = CollectionError::Read { path: rel, source };
                log::warn!("Skipping entry: {}", err);
                out.errors.push(err);
            }
        }
    }

    log::info!(
        "Collected {} files under {} ({} skipped)",
        out.records.len(),
        root.display(),
        out.errors.len()
    );
    out
}

fn read_record(abs: &Path, rel: &str, opts: &CollectOptions) -> std::io::Result<FileRecord> {
    let size = std::fs::metadata(abs)?.len();
    if size > opts.max_file_bytes {
        return Ok(FileRecord::without_content(rel, FileKind::Oversized, size));
    }

    let mut bytes = Vec::with_capacity(size as usize);
    std::fs::File::open(abs)?.read_to_end(&mut bytes)?;

    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return Ok(FileRecord::without_content(rel, FileKind::Binary, size));
    }

    match String::from_utf8(bytes) {
        Ok(content) => Ok(FileRecord::text(rel, &content)),
        Err(_) => Ok(FileRecord::without_content(rel, FileKind::Binary, size)),
    }
}

/// Forward-slash path of `path` relative to `root`
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn collects_text_binary_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.rs", b"fn main() {}\n");
        write(dir.path(), "logo.png", &[0x89, b'P', b'N', b'G', 0, 1, 2]);
        write(dir.path(), "big.txt", &vec![b'a'; 64]);

        let opts = CollectOptions {
            max_file_bytes: 32,
            ..CollectOptions::default()
        };
        let out = collect(dir.path(), &opts);
        assert!(out.errors.is_empty());

        let paths: Vec<&str> = out.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["big.txt", "logo.png", "src/main.rs"]);

        let big = &out.records[0];
        assert_eq!(big.kind, FileKind::Oversized);
        assert!(big.content.is_none());
        assert_eq!(big.size_bytes, 64);

        let logo = &out.records[1];
        assert_eq!(logo.kind, FileKind::Binary);
        assert!(!logo.selected);

        let main = &out.records[2];
        assert_eq!(main.kind, FileKind::Text);
        assert_eq!(main.language, "rust");
        assert_eq!(main.line_count, 1);
        assert!(main.selected);
    }

    #[test]
    fn ignore_patterns_match_substrings() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/pkg/index.js", b"x");
        write(dir.path(), "target/debug/out.txt", b"x");
        write(dir.path(), "src/lib.rs", b"x");
        write(dir.path(), "src/lib.rs.orig", b"x");

        let opts = CollectOptions {
            ignore: vec!["node_modules".into(), "target/".into(), ".orig".into()],
            ..CollectOptions::default()
        };
        let out = collect(dir.path(), &opts);
        let paths: Vec<&str> = out.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs"]);
    }

    #[test]
    fn invalid_utf8_is_binary() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "latin1.txt", &[b'c', b'a', b'f', 0xE9]);
        let out = collect(dir.path(), &CollectOptions::default());
        assert_eq!(out.records[0].kind, FileKind::Binary);
    }

    #[test]
    fn select_by_default_off_leaves_everything_unselected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", b"# hi\n");
        let opts = CollectOptions {
            select_by_default: false,
            ..CollectOptions::default()
        };
        let out = collect(dir.path(), &opts);
        assert!(!out.records[0].selected);
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/p");
        assert_eq!(
            relative_path(root, &root.join("a").join("b.rs")).as_deref(),
            Some("a/b.rs")
        );
        assert_eq!(relative_path(root, root), None);
    }
}
