pub mod event;

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::scanner::scan_directories;

use event::{ChangeEvent, classify};

/// The directories currently registered with the OS notification mechanism.
///
/// Every directory is registered non-recursively; recursion is expressed by the
/// scanner's directory list. Removal is handled by a full [`WatchSet::rebuild`]
/// rather than a targeted unwatch.
pub struct WatchSet {
    roots: Vec<PathBuf>,
    recursive: bool,
    directories: Vec<PathBuf>,
    sender: mpsc::UnboundedSender<ChangeEvent>,
    /// Keep alive: dropping the watcher releases every registration.
    watcher: Option<RecommendedWatcher>,
}

impl WatchSet {
    /// Scan `roots` and register every resulting directory.
    ///
    /// Classified events are forwarded into `sender`. Any scan or registration
    /// failure is returned: a partially registered set is never handed out.
    pub fn build(
        roots: &[PathBuf],
        recursive: bool,
        sender: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Result<Self, WatchError> {
        // notify reports absolute paths; keep ours comparable.
        let roots = roots
            .iter()
            .map(|root| {
                std::path::absolute(root).map_err(|err| WatchError::DirectoryRead {
                    path: root.clone(),
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut set = Self {
            roots,
            recursive,
            directories: Vec::new(),
            sender,
            watcher: None,
        };
        set.rebuild()?;
        Ok(set)
    }

    /// Discard every registration, rescan the roots and register the result.
    pub fn rebuild(&mut self) -> Result<(), WatchError> {
        self.watcher = None;
        self.directories.clear();

        let directories = scan_directories(&self.roots, self.recursive)?;
        let mut watcher = new_watcher(self.sender.clone())?;
        for dir in &directories {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Register {
                    path: dir.clone(),
                    source,
                })?;
        }

        tracing::debug!("[watcher] watching {} directories", directories.len());
        self.watcher = Some(watcher);
        self.directories = directories;
        Ok(())
    }

    /// Register a single directory that appeared at runtime.
    ///
    /// Best-effort: a failure is logged and reported as `false`. The new
    /// directory's own subdirectories are not discovered until the next rebuild.
    pub fn add_directory(&mut self, path: &Path) -> bool {
        if self.contains(path) {
            return true;
        }
        let Some(watcher) = self.watcher.as_mut() else {
            tracing::warn!("[watcher] cannot watch {}: watcher disposed", path.display());
            return false;
        };

        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tracing::debug!("[watcher] watching {}", path.display());
                self.directories.push(path.to_path_buf());
                true
            }
            Err(err) => {
                tracing::warn!("[watcher] failed to watch {}: {err}", path.display());
                false
            }
        }
    }

    /// Whether `path` is currently registered.
    pub fn contains(&self, path: &Path) -> bool {
        self.directories.iter().any(|dir| dir == path)
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Release the notification handle.
    pub fn dispose(mut self) {
        self.watcher = None;
        tracing::debug!("[watcher] disposed");
    }
}

/// Create a notify watcher whose callback classifies and forwards events.
///
/// The callback runs on notify's event thread, which also answers `watch`
/// calls: it must never wait on the dispatcher, hence the unbounded channel.
fn new_watcher(
    sender: mpsc::UnboundedSender<ChangeEvent>,
) -> Result<RecommendedWatcher, WatchError> {
    notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        for event in classify(result) {
            if sender.send(event).is_err() {
                return; // receiver dropped, shutdown
            }
        }
    })
    .map_err(WatchError::Init)
}
