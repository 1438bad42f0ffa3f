//! Bridges the watcher backend's own background thread into a single
//! synchronous callback on a dedicated runner thread, applying a second,
//! runner-level debounce window on top of the backend's own.
//!
//! This is the one place the async/OS-event world and the synchronous
//! build pipeline meet. `start`/`stop` are each idempotent.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::WatchSettings;
use crate::ignore_filter::IgnoreFilter;

use super::backend::{Backend, FileWatcher};
use super::{ChangeBatch, WatchError, WatchEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct WatcherRunner {
    root: PathBuf,
    settings: WatchSettings,
    ignore_filter: Arc<IgnoreFilter>,
    backend: Backend,
    on_changes: Arc<dyn Fn(ChangeBatch) + Send + Sync>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WatcherRunner {
    pub fn new(
        root: PathBuf,
        settings: WatchSettings,
        ignore_filter: Arc<IgnoreFilter>,
        backend: Backend,
        on_changes: impl Fn(ChangeBatch) + Send + Sync + 'static,
    ) -> Self {
        Self {
            root,
            settings,
            ignore_filter,
            backend,
            on_changes: Arc::new(on_changes),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<(), WatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let watcher = FileWatcher::new(&self.root, &self.settings, self.ignore_filter.clone(), self.backend)?;
        let running = self.running.clone();
        let on_changes = self.on_changes.clone();
        let runner_debounce = Duration::from_millis(self.settings.runner_debounce_ms);

        let join = std::thread::spawn(move || {
            run_loop(watcher, running, on_changes, runner_debounce);
        });

        *self.handle.lock().unwrap() = Some(join);
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore_filter::IgnoreFilter;

    fn runner(root: PathBuf) -> WatcherRunner {
        // Polling keeps this deterministic across sandboxes that may not
        // grant native inotify/FSEvents watches.
        let settings = WatchSettings {
            poll: true,
            ..WatchSettings::default()
        };
        let ignore_filter = Arc::new(IgnoreFilter::new(&root, &[], &[], &[], true, 100).unwrap());
        WatcherRunner::new(root, settings, ignore_filter, Backend::Fallback, |_batch| {})
    }

    #[test]
    fn start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path().to_path_buf());

        runner.start().unwrap();
        assert!(runner.is_running());
        // A second start while already running must not spawn a second
        // thread or return an error.
        runner.start().unwrap();
        assert!(runner.is_running());

        runner.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path().to_path_buf());

        runner.start().unwrap();
        runner.stop();
        assert!(!runner.is_running());
        // A second stop on an already-stopped runner must not block or panic.
        runner.stop();
        assert!(!runner.is_running());
    }
}

fn run_loop(
    watcher: FileWatcher,
    running: Arc<AtomicBool>,
    on_changes: Arc<dyn Fn(ChangeBatch) + Send + Sync>,
    debounce: Duration,
) {
    let mut pending: Option<(ChangeBatch, Instant)> = None;

    while running.load(Ordering::SeqCst) {
        let wait = pending
            .as_ref()
            .map(|(_, since)| debounce.saturating_sub(since.elapsed()).min(POLL_INTERVAL))
            .unwrap_or(POLL_INTERVAL);

        match watcher.recv_timeout(wait) {
            Some(WatchEvent::Changes(raw)) => {
                let batch = ChangeBatch {
                    paths: raw.paths,
                    event_types: raw.event_types,
                };
                match &mut pending {
                    Some((acc, _)) => acc.merge(batch),
                    None => pending = Some((batch, Instant::now())),
                }
            }
            Some(WatchEvent::Error(message)) => {
                eprintln!("[hotsite] watcher backend error: {message}");
            }
            None => {}
        }

        if let Some((_, since)) = &pending
            && since.elapsed() >= debounce
        {
            let (batch, _) = pending.take().unwrap();
            if !batch.is_empty() {
                on_changes(batch);
            }
        }
    }
}
