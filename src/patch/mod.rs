//! Exact-string file patchers
//!
//! Maintenance edits to templates and scripts are expressed as string
//! operations anchored on text that must already be in the file. A missing
//! anchor is reported and skipped; it is never an error.

pub mod manifest;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use manifest::{FilePatch, Manifest};

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Replace every occurrence of `find`
    Replace { find: String, replace: String },
    /// Insert `content` before the last occurrence of `anchor`, only when
    /// `require_marker` (if any) is present
    InsertBeforeLast {
        anchor: String,
        content: String,
        #[serde(default)]
        require_marker: Option<String>,
    },
    /// Replace the text between the first `start` and the following `end`,
    /// keeping both markers
    ReplaceBetween {
        start: String,
        end: String,
        replacement: String,
    },
}

impl PatchOp {
    pub fn describe(&self) -> String {
        fn preview(s: &str) -> String {
            let line = s.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
            line.chars().take(40).collect()
        }
        match self {
            PatchOp::Replace { find, .. } => format!("replace '{}'", preview(find)),
            PatchOp::InsertBeforeLast { anchor, .. } => format!("insert before last '{}'", preview(anchor)),
            PatchOp::ReplaceBetween { start, end, .. } => {
                format!("replace between '{}' and '{}'", preview(start), preview(end))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    Applied { count: usize },
    AnchorMissing,
    AlreadyApplied,
}

/// Apply one operation, returning the new content and what happened
pub fn apply(content: &str, op: &PatchOp) -> (String, PatchOutcome) {
    match op {
        PatchOp::Replace { find, replace } => {
            if find.is_empty() {
                return (content.to_string(), PatchOutcome::AnchorMissing);
            }
            // A replacement that wraps its anchor leaves the anchor behind
            if !replace.is_empty() && replace.contains(find.as_str()) && content.contains(replace.as_str()) {
                return (content.to_string(), PatchOutcome::AlreadyApplied);
            }
            let count = content.matches(find.as_str()).count();
            if count > 0 {
                return (content.replace(find.as_str(), replace), PatchOutcome::Applied { count });
            }
            let outcome = if !replace.is_empty() && content.contains(replace.as_str()) {
                PatchOutcome::AlreadyApplied
            } else {
                PatchOutcome::AnchorMissing
            };
            (content.to_string(), outcome)
        }
        PatchOp::InsertBeforeLast {
            anchor,
            content: insert,
            require_marker,
        } => {
            if !insert.is_empty() && content.contains(insert.as_str()) {
                return (content.to_string(), PatchOutcome::AlreadyApplied);
            }
            if let Some(marker) = require_marker {
                if !content.contains(marker.as_str()) {
                    return (content.to_string(), PatchOutcome::AnchorMissing);
                }
            }
            match content.rfind(anchor.as_str()).filter(|_| !anchor.is_empty()) {
                Some(pos) => {
                    let mut out = String::with_capacity(content.len() + insert.len());
                    out.push_str(&content[..pos]);
                    out.push_str(insert);
                    out.push_str(&content[pos..]);
                    (out, PatchOutcome::Applied { count: 1 })
                }
                None => (content.to_string(), PatchOutcome::AnchorMissing),
            }
        }
        PatchOp::ReplaceBetween { start, end, replacement } => {
            let Some(start_pos) = content.find(start.as_str()).filter(|_| !start.is_empty()) else {
                return (content.to_string(), PatchOutcome::AnchorMissing);
            };
            let inner_start = start_pos + start.len();
            let Some(end_offset) = content[inner_start..].find(end.as_str()).filter(|_| !end.is_empty()) else {
                return (content.to_string(), PatchOutcome::AnchorMissing);
            };
            let inner_end = inner_start + end_offset;
            if &content[inner_start..inner_end] == replacement {
                return (content.to_string(), PatchOutcome::AlreadyApplied);
            }
            let mut out = String::with_capacity(content.len() + replacement.len());
            out.push_str(&content[..inner_start]);
            out.push_str(replacement);
            out.push_str(&content[inner_end..]);
            (out, PatchOutcome::Applied { count: 1 })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcomes: Vec<PatchOutcome>,
    pub changed: bool,
}

fn run(path: &Path, ops: &[PatchOp], write: bool) -> Result<FileReport, PatchError> {
    let original = std::fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut content = original.clone();
    let mut outcomes = Vec::with_capacity(ops.len());
    for op in ops {
        let (next, outcome) = apply(&content, op);
        match outcome {
            PatchOutcome::Applied { count } => {
                tracing::info!("{}: {} ({} change(s))", path.display(), op.describe(), count)
            }
            PatchOutcome::AlreadyApplied => {
                tracing::info!("{}: {} already applied", path.display(), op.describe())
            }
            PatchOutcome::AnchorMissing => {
                tracing::warn!("{}: {} - anchor not found, no changes made", path.display(), op.describe())
            }
        }
        content = next;
        outcomes.push(outcome);
    }

    let changed = content != original;
    if changed && write {
        write_atomic(path, &content)?;
    }
    Ok(FileReport {
        path: path.to_path_buf(),
        outcomes,
        changed,
    })
}

fn write_atomic(path: &Path, content: &str) -> Result<(), PatchError> {
    let write_err = |source| PatchError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Apply `ops` in order and write the file if anything changed
pub fn patch_file(path: &Path, ops: &[PatchOp]) -> Result<FileReport, PatchError> {
    run(path, ops, true)
}

/// Like [`patch_file`] without writing
pub fn preview_file(path: &Path, ops: &[PatchOp]) -> Result<FileReport, PatchError> {
    run(path, ops, false)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn absent_anchor_leaves_content_unchanged(content in "[a-z ]{0,40}", anchor in "[A-Z]{1,5}") {
            let op = PatchOp::InsertBeforeLast { anchor, content: "X".into(), require_marker: None };
            let (out, outcome) = apply(&content, &op);
            prop_assert_eq!(out, content);
            prop_assert_eq!(outcome, PatchOutcome::AnchorMissing);
        }

        #[test]
        fn replace_is_idempotent(content in "[ab]{0,30}") {
            let op = PatchOp::Replace { find: "a".into(), replace: "c".into() };
            let (once, _) = apply(&content, &op);
            let (twice, _) = apply(&once, &op);
            prop_assert_eq!(once, twice);
        }
    }
}
