//! File watching: OS events in, debounced `ChangeBatch`es out.

pub mod backend;
pub mod runner;

use std::collections::BTreeSet;
use std::path::PathBuf;

use notify::event::ModifyKind;
use notify::EventKind;
use serde::{Deserialize, Serialize};

pub use backend::{Backend, FileWatcher, WatchError, WatchEvent};
pub use runner::WatcherRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl EventType {
    pub fn from_notify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => EventType::Created,
            EventKind::Remove(_) => EventType::Deleted,
            EventKind::Modify(ModifyKind::Name(_)) => EventType::Moved,
            _ => EventType::Modified,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub paths: BTreeSet<PathBuf>,
    pub event_types: BTreeSet<EventType>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn merge(&mut self, other: ChangeBatch) {
        self.paths.extend(other.paths);
        self.event_types.extend(other.event_types);
    }
}
