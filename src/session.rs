use crate::catalog::{FileCatalog, FileRecord};
use crate::context::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Persisted project state. Write handles are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub root: String,
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub specification: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    pub last_updated: String,
}

impl Session {
    /// Snapshot the catalog of the project at `root`
    pub fn capture(root: &Path, name: &str, catalog: &FileCatalog, format: OutputFormat) -> Self {
        Session {
            id: session_id(root),
            name: name.to_string(),
            root: root.to_string_lossy().to_string(),
            files: catalog.snapshot(),
            summary: String::new(),
            specification: String::new(),
            output_format: format,
            last_updated: crate::app::chrono_now(),
        }
    }

    /// Keep free-text fields from an earlier save of the same project
    pub fn carry_notes_from(&mut self, previous: &Session) {
        self.summary = previous.summary.clone();
        self.specification = previous.specification.clone();
    }

    /// Rebuild the catalog from the saved records
    pub fn to_catalog(&self) -> FileCatalog {
        FileCatalog::new(self.files.clone())
    }
}

/// First 16 hex chars of the SHA-256 of the canonical project root
pub fn session_id(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// One JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SessionStore { dir: dir.into() }
    }

    /// `<data_dir>/ctxforge/sessions`
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| SessionStore::new(d.join("ctxforge").join("sessions")))
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, session: &Session) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(&session.id);
        let json = serde_json::to_string_pretty(session)?;

        // Write atomically
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        log::info!("Saved session {} ({} files)", session.id, session.files.len());
        Ok(path)
    }

    /// `Ok(None)` when no session was ever saved under `id`
    pub fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(session))
    }

    pub fn load_for_root(&self, root: &Path) -> Result<Option<Session>> {
        self.load(&session_id(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileKind;

    fn catalog() -> FileCatalog {
        let mut a = FileRecord::text("src/a.rs", "fn a() {}\n");
        a.selected = true;
        let b = FileRecord::text("src/b.rs", "fn b() {}\n");
        let img = FileRecord::without_content("img.png", FileKind::Binary, 100);
        FileCatalog::new(vec![a, b, img])
    }

    #[test]
    fn session_id_is_stable_hex() {
        let dir = tempfile::tempdir().unwrap();
        let id = session_id(dir.path());
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, session_id(dir.path()));
        assert_ne!(id, session_id(&dir.path().join("other")));
    }

    #[test]
    fn save_then_load_restores_catalog_and_format() {
        let project = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(store_dir.path().join("sessions"));

        let catalog = catalog();
        let session = Session::capture(project.path(), "demo", &catalog, OutputFormat::Xml);
        let path = store.save(&session).unwrap();
        assert_eq!(path, store.path_for(&session.id));

        let loaded = store.load_for_root(project.path()).unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.output_format, OutputFormat::Xml);

        let restored = loaded.to_catalog();
        assert_eq!(restored.snapshot(), catalog.snapshot());
        assert_eq!(restored.selected_count(), 1);
    }

    #[test]
    fn wire_format_is_camel_case() {
        let project = tempfile::tempdir().unwrap();
        let session = Session::capture(project.path(), "demo", &catalog(), OutputFormat::Json);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["outputFormat"], "json");
        assert!(value["lastUpdated"].is_string());
        assert_eq!(value["files"][0]["sizeBytes"], 10);
    }

    #[test]
    fn missing_session_is_none() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(store_dir.path());
        assert!(store.load("0123456789abcdef").unwrap().is_none());
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(store_dir.path());
        std::fs::write(store.path_for("bad"), "{not json").unwrap();
        assert!(store.load("bad").is_err());
    }

    #[test]
    fn notes_survive_resave() {
        let project = tempfile::tempdir().unwrap();
        let mut first = Session::capture(project.path(), "demo", &catalog(), OutputFormat::Markdown);
        first.summary = "auth refactor".into();
        let mut second = Session::capture(project.path(), "demo", &catalog(), OutputFormat::Markdown);
        second.carry_notes_from(&first);
        assert_eq!(second.summary, "auth refactor");
    }
}
