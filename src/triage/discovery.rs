//! Resolution of command line targets into the list of files to analyze.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AnalysisError, Result};

/// Fail on the first literal input that does not exist.
///
/// Only the paths the user named are checked; files found later inside
/// expanded directories are not.
pub fn validate_inputs(inputs: &[PathBuf]) -> Result<()> {
    match inputs.iter().find(|path| !path.exists()) {
        Some(path) => Err(AnalysisError::MissingInput { path: path.clone() }),
        None => Ok(()),
    }
}

/// Turn the user's inputs into analysis targets.
///
/// Without `recursive` the inputs are returned untouched, directories
/// included. With it, each directory is replaced by its immediate
/// non-directory children; nested directories are not entered. Top-level
/// order is preserved, order within one directory is whatever the file
/// system yields.
pub fn resolve_targets(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    if !recursive {
        return inputs.to_vec();
    }

    let mut targets = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.is_dir() {
            let before = targets.len();
            expand_directory(input, &mut targets);
            debug!(
                "Expanded {} into {} targets",
                input.display(),
                targets.len() - before
            );
        } else {
            targets.push(input.clone());
        }
    }
    targets
}

fn expand_directory(dir: &Path, targets: &mut Vec<PathBuf>) {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter();

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                debug!("Skipping subdirectory {}", entry.path().display());
            }
            Ok(entry) => targets.push(entry.into_path()),
            Err(e) => warn!("Skipping unreadable entry in {}: {}", dir.display(), e),
        }
    }
}
