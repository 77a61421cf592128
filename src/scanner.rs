use std::path::{Path, PathBuf};

use crate::error::WatchError;

/// Collect the directories to watch for the given roots.
///
/// In non-recursive mode the roots are returned as given. In recursive mode each
/// root is walked depth-first, root first, and every descendant directory is
/// included unless its name starts with `.` (hidden directories and everything
/// beneath them are skipped). Symlinked directories are not followed.
///
/// Any directory that cannot be listed fails the whole scan: an incomplete watch
/// set is never returned.
pub fn scan_directories(roots: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, WatchError> {
    if !recursive {
        return Ok(roots.to_vec());
    }

    let mut directories = Vec::new();
    for root in roots {
        collect_directories(root, &mut directories)?;
    }
    Ok(directories)
}

fn collect_directories(root: &Path, directories: &mut Vec<PathBuf>) -> Result<(), WatchError> {
    // Only the hidden-entry filter: .gitignore and friends must not shrink the watch set.
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for result in walker {
        let entry = result.map_err(|err| WatchError::DirectoryRead {
            path: error_path(&err).unwrap_or(root).to_path_buf(),
            reason: err.to_string(),
        })?;

        // A symlinked root is followed; symlinked descendants are not.
        let is_dir = if entry.depth() == 0 {
            entry.path().is_dir()
        } else {
            entry.file_type().is_some_and(|ft| ft.is_dir())
        };
        if entry.depth() == 0 && !is_dir {
            return Err(WatchError::DirectoryRead {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        if is_dir {
            directories.push(entry.into_path());
        }
    }

    Ok(())
}

/// Whether the final path component starts with `.`.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Dig the offending path out of a walk error, if it carries one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}
