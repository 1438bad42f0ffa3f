//! Process-wide state shared between the watcher/build thread and every
//! HTTP worker: whether a build is in progress, and the set of connected
//! SSE clients to notify when one finishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::reload::{ReloadAction, ReloadDecision};

pub type ClientId = u64;

const CLIENT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Serialize)]
struct ReloadPayload<'a> {
    action: &'a str,
    reason: &'a str,
    paths: &'a [std::path::PathBuf],
}

pub struct DevState {
    build_in_progress: AtomicBool,
    sse_clients: DashMap<ClientId, mpsc::Sender<String>>,
    next_client_id: AtomicU64,
}

impl DevState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            build_in_progress: AtomicBool::new(false),
            sse_clients: DashMap::new(),
            next_client_id: AtomicU64::new(0),
        })
    }

    pub fn is_build_in_progress(&self) -> bool {
        self.build_in_progress.load(Ordering::SeqCst)
    }

    pub fn set_build_in_progress(&self, value: bool) {
        self.build_in_progress.store(value, Ordering::SeqCst);
    }

    /// Registers a new SSE client and returns its id plus the receiving
    /// half of its bounded queue. The caller (the SSE handler) owns the
    /// receiver for the lifetime of the connection and must `unsubscribe`
    /// on disconnect.
    pub fn subscribe(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.sse_clients.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ClientId) {
        self.sse_clients.remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.sse_clients.len()
    }

    /// Snapshots the client set and enqueues the payload on each. A
    /// client whose queue is full or closed is silently skipped — stale
    /// clients are pruned lazily when their handler loop exits.
    pub fn broadcast_reload(&self, decision: &ReloadDecision) {
        let action = match decision.action {
            ReloadAction::None => return,
            ReloadAction::CssOnly => "css-only",
            ReloadAction::Reload => "reload",
        };

        let payload = ReloadPayload {
            action,
            reason: &decision.reason,
            paths: &decision.changed_paths,
        };

        let Ok(data) = serde_json::to_string(&payload) else {
            return;
        };

        for entry in self.sse_clients.iter() {
            let _ = entry.value().try_send(data.clone());
        }
    }

    /// Sends a final payload to every client and clears the registry, used
    /// during graceful shutdown so connected browsers stop retrying.
    pub fn close_all(&self) {
        for entry in self.sse_clients.iter() {
            let _ = entry.value().try_send("{\"action\":\"shutdown\"}".to_string());
        }
        self.sse_clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn subscribe_and_broadcast_delivers_payload() {
        let state = DevState::new();
        let (id, mut rx) = state.subscribe();
        assert_eq!(state.client_count(), 1);

        let decision = ReloadDecision {
            action: ReloadAction::Reload,
            reason: "html-or-js-outputs".to_string(),
            changed_paths: vec![PathBuf::from("about/index.html")],
        };
        state.broadcast_reload(&decision);

        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("\"action\":\"reload\""));

        state.unsubscribe(id);
        assert_eq!(state.client_count(), 0);
    }

    #[test]
    fn none_action_never_broadcasts() {
        let state = DevState::new();
        let (_id, mut rx) = state.subscribe();
        let decision = ReloadDecision {
            action: ReloadAction::None,
            reason: "aggregate-only".to_string(),
            changed_paths: vec![],
        };
        state.broadcast_reload(&decision);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn build_in_progress_flag_round_trips() {
        let state = DevState::new();
        assert!(!state.is_build_in_progress());
        state.set_build_in_progress(true);
        assert!(state.is_build_in_progress());
    }
}
