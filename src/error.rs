//! Stable-coded errors for the dev server core.
//!
//! Every variant carries the code a log line or an HTTP 500 body can show
//! a user without leaking internals. Codes are namespaced: `S0xx` for
//! server/process lifecycle, `B0xx` for the build pipeline, `H0xx`/`H7xx`
//! reserved for the rendering engine's own error space so code that
//! matches on `HotsiteError::code()` compiles against one closed type even
//! though this crate never produces an `H7xx` itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum HotsiteError {
    #[error("[S001] port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("[S002] failed to terminate stale process {pid}: {source}")]
    StaleProcessKillFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("[S003] build failed: {0}")]
    BuildFailed(String),

    #[error("[S004] file watcher backend failed to start: {0}")]
    WatcherStartFailed(String),

    #[error("[S005] build hook '{command}' failed: {detail}")]
    HookFailed { command: String, detail: String },

    #[error("[S006] build hook '{command}' timed out after {timeout_secs}s")]
    HookTimedOut { command: String, timeout_secs: u64 },

    #[error("[S007] pid file at {path:?} is stale but the recorded process is unkillable")]
    StalePidFile { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("ignore pattern error: {0}")]
    IgnoreFilter(#[from] crate::ignore_filter::IgnoreFilterError),

    /// Reserved for the rendering engine's own error namespace (URL
    /// collisions during output generation). Never produced by this crate.
    #[error("[H020] url collision: {0}")]
    UrlCollision(String),

    /// Reserved for the rendering engine's own error namespace (an
    /// unresolved cross-reference). Never produced by this crate.
    #[error("[H710] unresolved cross-reference: {0}")]
    UnresolvedXref(String),
}

impl HotsiteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PortInUse { .. } => "S001",
            Self::StaleProcessKillFailed { .. } => "S002",
            Self::BuildFailed(_) => "S003",
            Self::WatcherStartFailed(_) => "S004",
            Self::HookFailed { .. } => "S005",
            Self::HookTimedOut { .. } => "S006",
            Self::StalePidFile { .. } => "S007",
            Self::Io(_) => "S000",
            Self::Config(_) => "S000",
            Self::IgnoreFilter(_) => "S000",
            Self::UrlCollision(_) => "H020",
            Self::UnresolvedXref(_) => "H710",
        }
    }
}

impl IntoResponse for HotsiteError {
    fn into_response(self) -> Response {
        let code = self.code();
        eprintln!("[hotsite] {code} {self}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{code} {self}")).into_response()
    }
}
