mod collect;
mod language;

pub use collect::{collect, CollectOptions, Collection};
pub(crate) use collect::relative_path;
pub use language::language_for_path;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a collected entry can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Binary,
    /// Larger than the collection size limit; content is omitted
    Oversized,
}

/// One file under the project root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Forward-slash separated, relative to the project root
    pub path: String,
    pub size_bytes: u64,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub line_count: usize,
    pub language: String,
    #[serde(default)]
    pub selected: bool,
}

impl FileRecord {
    pub fn text(path: &str, content: &str) -> Self {
        FileRecord {
            path: path.to_string(),
            size_bytes: content.len() as u64,
            kind: FileKind::Text,
            content: Some(content.to_string()),
            line_count: content.lines().count(),
            language: language_for_path(path).to_string(),
            selected: false,
        }
    }

    pub fn without_content(path: &str, kind: FileKind, size_bytes: u64) -> Self {
        FileRecord {
            path: path.to_string(),
            size_bytes,
            kind,
            content: None,
            line_count: 0,
            language: language_for_path(path).to_string(),
            selected: false,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == FileKind::Text
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// The flat, authoritative map of path → record for the open project.
///
/// Records keep the order they were loaded in. Every mutation bumps
/// `version`; derived views (tree, serialized context, token counts) are
/// recomputed from the current records rather than cached.
#[derive(Debug, Default, Clone)]
pub struct FileCatalog {
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
    version: u64,
}

impl FileCatalog {
    pub fn new(records: Vec<FileRecord>) -> Self {
        let mut catalog = FileCatalog::default();
        catalog.replace(records);
        catalog
    }

    /// Swap in a whole new set of records at once.
    /// Duplicate paths keep their first occurrence.
    pub fn replace(&mut self, records: Vec<FileRecord>) {
        let mut next = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for mut record in records {
            if index.contains_key(&record.path) {
                log::warn!("Duplicate catalog path dropped: {}", record.path);
                continue;
            }
            if !record.is_text() {
                record.selected = false;
            }
            index.insert(record.path.clone(), next.len());
            next.push(record);
        }
        self.records = next;
        self.index = index;
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.index.get(path).map(|&i| &self.records[i])
    }

    /// Bulk toggle. Non-text records are never selected.
    /// Returns how many records actually changed.
    pub fn set_selection<S: AsRef<str>>(&mut self, paths: &[S], selected: bool) -> usize {
        let mut changed = 0;
        for path in paths {
            let Some(&i) = self.index.get(path.as_ref()) else {
                continue;
            };
            let record = &mut self.records[i];
            if record.is_text() && record.selected != selected {
                record.selected = selected;
                changed += 1;
            }
        }
        if changed > 0 {
            self.version += 1;
        }
        changed
    }

    /// Replace a text record's content after a successful write-back.
    /// `selected` is left as it was.
    pub fn update_content(&mut self, path: &str, content: &str) -> bool {
        let Some(&i) = self.index.get(path) else {
            return false;
        };
        let record = &mut self.records[i];
        record.content = Some(content.to_string());
        record.size_bytes = content.len() as u64;
        record.line_count = content.lines().count();
        record.kind = FileKind::Text;
        self.version += 1;
        true
    }

    pub fn selected_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter().filter(|r| r.is_text() && r.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.selected_records().count()
    }

    pub fn text_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_text()).count()
    }

    /// Serializable copy of the current records
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.records.clone()
    }

    /// Re-apply selection flags from a previous load of the same project.
    /// Paths that no longer exist are ignored.
    pub fn carry_selection_from(&mut self, previous: &[FileRecord]) {
        let mut on = Vec::new();
        let mut off = Vec::new();
        for record in previous {
            if record.selected {
                on.push(record.path.as_str());
            } else {
                off.push(record.path.as_str());
            }
        }
        self.set_selection(&on, true);
        self.set_selection(&off, false);
    }

    /// Sorted list of languages present among text records
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.is_text())
            .map(|r| r.language.clone())
            .collect();
        langs.sort();
        langs.dedup();
        langs
    }
}
