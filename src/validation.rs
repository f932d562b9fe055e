//! Pre-run checks against the output directory.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::ConversionOptions;
use crate::manifest::gallery_path;

/// Subdirectory of the user-chosen folder that a run actually writes to
pub const EXPORTED_DIR_NAME: &str = "exported";

/// What a run would overwrite if it started now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputConflicts {
    pub gallery_json_exists: bool,
    pub duplicate_files: Vec<String>,
}

impl OutputConflicts {
    pub fn has_conflicts(&self) -> bool {
        self.gallery_json_exists || !self.duplicate_files.is_empty()
    }
}

/// The directory a run writes to, given the user's chosen base directory
pub fn resolve_effective_output_dir(base_output_dir: &Path) -> PathBuf {
    base_output_dir.join(EXPORTED_DIR_NAME)
}

/// Probe `options.output_dir` for an existing manifest and expected outputs.
///
/// Read-only; a missing directory simply has no conflicts.
pub fn detect_output_conflicts(
    options: &ConversionOptions,
    expected_output_names: &[String],
) -> OutputConflicts {
    let output_dir = &options.output_dir;
    let gallery_json_exists = gallery_path(output_dir).exists();
    let duplicate_files = expected_output_names
        .iter()
        .filter(|name| output_dir.join(name.as_str()).exists())
        .cloned()
        .collect();

    OutputConflicts {
        gallery_json_exists,
        duplicate_files,
    }
}
