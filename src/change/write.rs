use crate::error::WriteError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A live, path-addressable write grant for one file under the project root
#[derive(Debug, Clone, PartialEq)]
pub struct WriteHandle {
    path: String,
    target: PathBuf,
}

impl WriteHandle {
    /// Replace the file with `content`.
    ///
    /// Refuses when the file on disk no longer matches `original`. The new
    /// body goes to a sibling temp file that is renamed over the target, so
    /// readers see either the old or the new file, never a partial one.
    pub fn write(&self, original: &str, content: &str) -> Result<(), WriteError> {
        let on_disk = fs::read(&self.target).map_err(|source| WriteError::Direct {
            path: self.path.clone(),
            source,
        })?;
        if digest(&on_disk) != digest(original.as_bytes()) {
            return Err(WriteError::Stale {
                path: self.path.clone(),
            });
        }

        let name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = self.target.with_file_name(format!(".{}.cf-tmp", name));

        fs::write(&tmp, content).map_err(|source| WriteError::Direct {
            path: self.path.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &self.target) {
            let _ = fs::remove_file(&tmp);
            return Err(WriteError::Direct {
                path: self.path.clone(),
                source,
            });
        }
        log::info!("Wrote {}", self.target.display());
        Ok(())
    }
}

/// How a confirmed change can reach storage
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCapability {
    Direct(WriteHandle),
    Unavailable,
}

/// Write handles granted at project open, keyed by catalog path.
/// Never persisted: a resumed session starts empty.
#[derive(Debug, Default, Clone)]
pub struct WriteCapabilityMap {
    handles: HashMap<String, WriteHandle>,
}

impl WriteCapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a handle for every path that exists under `root` and is not read-only.
    pub fn acquire<'a, I>(root: &Path, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut handles = HashMap::new();
        for path in paths {
            let target = root.join(path);
            match fs::metadata(&target) {
                Ok(meta) if meta.is_file() && !meta.permissions().readonly() => {
                    handles.insert(
                        path.to_string(),
                        WriteHandle {
                            path: path.to_string(),
                            target,
                        },
                    );
                }
                Ok(_) => log::info!("No write access to {}", path),
                Err(e) => log::warn!("Cannot stat {}: {}", target.display(), e),
            }
        }
        log::info!("Acquired {} write handles", handles.len());
        WriteCapabilityMap { handles }
    }

    pub fn get(&self, path: &str) -> WriteCapability {
        match self.handles.get(path) {
            Some(handle) => WriteCapability::Direct(handle.clone()),
            None => WriteCapability::Unavailable,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Save `content` as a downloadable artifact named after the last segment of `path`.
///
/// Existing files in `dir` are never replaced: a taken name gets a numbered
/// suffix (`name (1).ext`, `name (2).ext`, ...).
pub fn save_download(dir: &Path, path: &str, content: &str) -> Result<PathBuf, WriteError> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let fail = |target: &Path, source| WriteError::Download {
        path: path.to_string(),
        target: target.display().to_string(),
        source,
    };
    fs::create_dir_all(dir).map_err(|e| fail(dir, e))?;

    for attempt in 0..MAX_DOWNLOAD_SUFFIX {
        let target = dir.join(numbered_name(name, attempt));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(fail(&target, e)),
        };
        file.write_all(content.as_bytes()).map_err(|e| fail(&target, e))?;
        log::info!("Saved {} to {}", path, target.display());
        return Ok(target);
    }

    let target = dir.join(name);
    Err(fail(
        &target,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free download name left"),
    ))
}

const MAX_DOWNLOAD_SUFFIX: usize = 1000;

/// `file.ts` for attempt 0, then `file (1).ts`, `file (2).ts`, ...
fn numbered_name(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, attempt, ext),
        _ => format!("{} ({})", name, attempt),
    }
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
