//! Component discovery.
//!
//! Recursively scans a directory for `.aspc` files for batch compilation.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of component sources.
pub const COMPONENT_EXTENSION: &str = "aspc";

/// Every `.aspc` file under `dir`, sorted by path. A missing directory yields
/// nothing; unreadable entries are skipped with a warning.
pub fn find_component_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if !dir.exists() {
        return files;
    }

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("[aspc] skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == COMPONENT_EXTENSION) {
            files.push(path.to_path_buf());
        }
    }

    files
}
