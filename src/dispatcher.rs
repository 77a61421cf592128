use std::ops::ControlFlow;
use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::block_in_place;
use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;
use crate::scanner::is_hidden;
use crate::supervisor::ProcessControl;
use crate::watcher::WatchSet;
use crate::watcher::event::ChangeEvent;

/// Consumes change events one at a time and applies the watch/restart policy.
///
/// | event              | condition                | action                     |
/// |--------------------|--------------------------|----------------------------|
/// | Created            | path is a visible dir    | add it to the watch set    |
/// | Removed            | path was a watched dir   | rebuild the watch set      |
/// | Written / Renamed  | path is a file           | restart the process        |
/// | Error              |                          | log and keep going         |
///
/// There is no debouncing: every write is a restart, and restarts run serially
/// because the loop waits for each one to finish. Watch-set updates walk the
/// filesystem and wait on notify, so they run under `block_in_place` and need
/// the multi-threaded runtime.
pub struct Dispatcher<P> {
    watch_set: WatchSet,
    process: P,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    run_flag: CancellationToken,
}

impl<P: ProcessControl> Dispatcher<P> {
    pub fn new(
        watch_set: WatchSet,
        process: P,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        run_flag: CancellationToken,
    ) -> Self {
        Self {
            watch_set,
            process,
            events,
            run_flag,
        }
    }

    #[cfg(test)]
    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    /// Process events until the run flag is cleared, the event source closes,
    /// or the supervisor stops. Errors returned here are fatal.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let result = loop {
            let event = tokio::select! {
                biased;
                _ = self.run_flag.cancelled() => break Ok(()),
                event = self.events.recv() => event,
            };
            let Some(event) = event else {
                break Ok(());
            };

            match self.handle(event).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        tracing::debug!("[dispatcher] stopped");
        self.watch_set.dispose();
        result
    }

    /// Apply the policy to a single event.
    pub async fn handle(&mut self, event: ChangeEvent) -> anyhow::Result<ControlFlow<()>> {
        match event {
            ChangeEvent::Created(path) => {
                if path.is_dir() && !is_hidden(&path) {
                    self.add_directory(&path);
                }
            }
            ChangeEvent::Removed(path) => {
                if self.watch_set.contains(&path) {
                    self.rebuild(&path)?;
                }
            }
            ChangeEvent::Renamed(path) if self.watch_set.contains(&path) => {
                self.rebuild(&path)?;
            }
            ChangeEvent::Renamed(path) if path.is_dir() => {
                self.add_directory(&path);
            }
            ChangeEvent::Written(path) | ChangeEvent::Renamed(path) => {
                if !path.is_dir() {
                    return self.restart(&path).await;
                }
            }
            ChangeEvent::Error(message) => {
                tracing::error!("[watcher] error: {message}");
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn rebuild(&mut self, gone: &Path) -> anyhow::Result<()> {
        tracing::debug!("[dispatcher] {} went away, rebuilding watch set", gone.display());
        block_in_place(|| self.watch_set.rebuild())?;
        Ok(())
    }

    fn add_directory(&mut self, path: &Path) {
        block_in_place(|| self.watch_set.add_directory(path));
    }

    async fn restart(&mut self, path: &Path) -> anyhow::Result<ControlFlow<()>> {
        tracing::info!("modified file: {}", path.display());
        tracing::info!("restarting ...");

        match self.process.restart().await {
            Ok(pid) => {
                tracing::debug!("[dispatcher] process restarted as pid {pid}");
                Ok(ControlFlow::Continue(()))
            }
            Err(ProcessError::Stopped) => Ok(ControlFlow::Break(())),
            Err(err @ ProcessError::Launch { .. }) => Err(err.into()),
            Err(err) => {
                tracing::error!("restart failed: {err}");
                Ok(ControlFlow::Continue(()))
            }
        }
    }
}
