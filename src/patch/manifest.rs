//! Patch manifests
//!
//! ```yaml
//! patches:
//!   - file: templates/report.html
//!     description: JSON styling for uploaded reports
//!     ops:
//!       - op: insert_before_last
//!         anchor: "</style>"
//!         require_marker: ".original-content-readable"
//!         content: ".json-key { font-weight: bold; }"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{patch_file, preview_file, FileReport, PatchError, PatchOp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    /// Relative paths resolve against the manifest's directory
    pub file: PathBuf,
    #[serde(default)]
    pub description: Option<String>,
    pub ops: Vec<PatchOp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub patches: Vec<FilePatch>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Manifest {
    pub fn from_yaml(raw: &str, base_dir: &Path) -> Result<Self, PatchError> {
        let mut manifest: Manifest = serde_yaml::from_str(raw)?;
        manifest.base_dir = base_dir.to_path_buf();
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, PatchError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_yaml(&raw, &base)
    }

    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }

    /// Apply every patch; one file failing does not stop the others
    pub fn apply(&self, dry_run: bool) -> Vec<Result<FileReport, PatchError>> {
        self.patches
            .iter()
            .map(|patch| {
                let path = self.resolve(&patch.file);
                if let Some(description) = &patch.description {
                    tracing::info!("{}: {}", path.display(), description);
                }
                if dry_run {
                    preview_file(&path, &patch.ops)
                } else {
                    patch_file(&path, &patch.ops)
                }
            })
            .collect()
    }
}
