use std::io;
use thiserror::Error;

/// A single entry under the project root could not be collected.
/// Collection continues with the remaining entries.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk {path}: {message}")]
    Walk { path: String, message: String },
}

impl CollectionError {
    pub fn path(&self) -> &str {
        match self {
            CollectionError::Read { path, .. } | CollectionError::Walk { path, .. } => path,
        }
    }
}

/// Patch text does not follow the unified-diff convention.
/// Line numbers are 1-based positions in the raw patch text.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: '---' header is not followed by a '+++' header")]
    MissingNewHeader { line: usize },

    #[error("line {line}: malformed hunk header '{text}'")]
    BadHunkHeader { line: usize, text: String },

    #[error("line {line}: hunk appears before any file header")]
    HunkOutsideFile { line: usize },

    #[error("line {line}: hunk ended early ({old_left} old / {new_left} new lines missing)")]
    TruncatedHunk {
        line: usize,
        old_left: usize,
        new_left: usize,
    },

    #[error("line {line}: unexpected line inside hunk '{text}'")]
    UnexpectedLine { line: usize, text: String },

    #[error("no file sections found")]
    NoFileSections,
}

/// The AI rewrite collaborator failed to produce a reconstructed file body.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("rewrite returned no content")]
    EmptyOutput,

    #[error("rewrite I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// A write-back through a direct write handle failed. Never downgraded to the
/// download path silently; the caller offers the fallback explicitly.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write {path}: {source}; retry via download")]
    Direct {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} changed on disk since the rewrite was proposed; retry via download")]
    Stale { path: String },

    #[error("cannot save download for {path} to {target}: {source}")]
    Download {
        path: String,
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Failures of the change review state machine.
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("a change for {path} is already in progress")]
    Busy { path: String },

    #[error("{0} is not in the catalog")]
    UnknownPath(String),

    #[error("{0} is not a text file")]
    NotText(String),

    #[error("no change is awaiting {0}")]
    WrongState(&'static str),

    #[error("reconstruction of {path} failed: {source}")]
    Reconstruction {
        path: String,
        #[source]
        source: ReconstructionError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),
}
