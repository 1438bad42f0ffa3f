//! Native/polling file-watching backend.
//!
//! Wraps `notify-debouncer-full`, exactly as production dev servers in
//! this ecosystem do, but emits the raw `(paths, event_types)` shape this
//! crate's `ChangeBatch` needs rather than a pre-classified change type —
//! classification of *what kind* of change a path represents is
//! `BuildTrigger`'s job, not the watcher's.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{
    Config as NotifyConfig, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
};
use notify_debouncer_full::{
    new_debouncer, new_debouncer_opt, DebounceEventResult, Debouncer, RecommendedCache,
};

use crate::config::WatchSettings;
use crate::ignore_filter::IgnoreFilter;

use super::EventType;

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

#[derive(Debug)]
pub struct RawChangeBatch {
    pub paths: BTreeSet<PathBuf>,
    pub event_types: BTreeSet<EventType>,
}

#[derive(Debug)]
pub enum WatchEvent {
    Changes(RawChangeBatch),
    Error(String),
}

/// Which concrete backend is in effect. Chosen from `watch_backend` at
/// construction; `auto` prefers `Native` and falls back silently to
/// `Fallback` if the native backend fails to initialize (e.g. the host
/// has exhausted its inotify instance limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Auto,
    Native,
    Fallback,
}

impl Backend {
    pub fn from_env() -> Self {
        match std::env::var("HOTSITE_WATCH_BACKEND").as_deref() {
            Ok("native") => Backend::Native,
            Ok("fallback") => Backend::Fallback,
            _ => Backend::Auto,
        }
    }
}

pub enum FileWatcher {
    Native {
        _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
        rx: Receiver<WatchEvent>,
    },
    Polling {
        _debouncer: Debouncer<PollWatcher, RecommendedCache>,
        rx: Receiver<WatchEvent>,
    },
}

impl FileWatcher {
    pub fn new(
        root: &Path,
        settings: &WatchSettings,
        ignore_filter: std::sync::Arc<IgnoreFilter>,
        backend: Backend,
    ) -> Result<Self, WatchError> {
        let use_polling = settings.poll || backend == Backend::Fallback;

        match Self::build(root, settings, ignore_filter.clone(), use_polling) {
            Ok(watcher) => Ok(watcher),
            Err(err) if backend == Backend::Auto && !use_polling => {
                eprintln!(
                    "[hotsite] native file watcher failed ({err}), falling back to polling"
                );
                Self::build(root, settings, ignore_filter, true)
            }
            Err(err) => Err(err),
        }
    }

    fn build(
        root: &Path,
        settings: &WatchSettings,
        ignore_filter: std::sync::Arc<IgnoreFilter>,
        use_polling: bool,
    ) -> Result<Self, WatchError> {
        let debounce_timeout = Duration::from_millis(settings.debounce_ms);
        let (tx, rx) = mpsc::channel();

        let callback = move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut paths = BTreeSet::new();
                let mut event_types = BTreeSet::new();

                for event in &events {
                    if !is_relevant_event(&event.kind) {
                        continue;
                    }
                    let event_type = EventType::from_notify(&event.kind);
                    for path in &event.paths {
                        if ignore_filter.is_ignored(path) {
                            continue;
                        }
                        paths.insert(path.clone());
                        event_types.insert(event_type);
                    }
                }

                if !paths.is_empty() {
                    let _ = tx.send(WatchEvent::Changes(RawChangeBatch { paths, event_types }));
                }
            }
            Err(errors) => {
                for e in errors {
                    let _ = tx.send(WatchEvent::Error(e.to_string()));
                }
            }
        };

        if use_polling {
            let poll_interval = Duration::from_millis(settings.poll_interval_ms);
            let notify_config = NotifyConfig::default().with_poll_interval(poll_interval);

            let mut debouncer = new_debouncer_opt::<_, PollWatcher, RecommendedCache>(
                debounce_timeout,
                None,
                callback,
                RecommendedCache::default(),
                notify_config,
            )?;

            if root.exists() {
                debouncer.watch(root, RecursiveMode::Recursive)?;
            }

            Ok(FileWatcher::Polling {
                _debouncer: debouncer,
                rx,
            })
        } else {
            let mut debouncer = new_debouncer(debounce_timeout, None, callback)?;

            if root.exists() {
                debouncer.watch(root, RecursiveMode::Recursive)?;
            }

            Ok(FileWatcher::Native {
                _debouncer: debouncer,
                rx,
            })
        }
    }

    pub fn recv(&self) -> Option<WatchEvent> {
        match self {
            FileWatcher::Native { rx, .. } => rx.recv().ok(),
            FileWatcher::Polling { rx, .. } => rx.recv().ok(),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatchEvent> {
        let rx = match self {
            FileWatcher::Native { rx, .. } => rx,
            FileWatcher::Polling { rx, .. } => rx,
        };
        match rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
    )
}
