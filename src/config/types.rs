//! Configuration types for the `dev_server` section of a site's config file.
//!
//! Full site configuration (sources, theme, markdown) belongs to the
//! rendering engine and is represented here only as `site_root`, the one
//! path this crate actually needs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_backend_debounce_ms() -> u64 {
    100
}

fn default_runner_debounce_ms() -> u64 {
    300
}

fn default_min_notify_interval_ms() -> u64 {
    300
}

fn default_sse_keepalive_secs() -> u64 {
    15
}

fn default_hook_timeout_secs() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Force the polling backend instead of native OS file events.
    #[serde(default)]
    pub poll: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Backend-level debounce, absorbed inside the notify debouncer itself.
    #[serde(default = "default_backend_debounce_ms")]
    pub debounce_ms: u64,
    /// WatcherRunner-level debounce, applied on top of the backend's.
    #[serde(default = "default_runner_debounce_ms")]
    pub runner_debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_backend_debounce_ms(),
            runner_debounce_ms: default_runner_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSettings {
    pub command: String,
    pub cwd: Option<PathBuf>,
    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevServerSettings {
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_regex: Vec<String>,
    /// Run in list order before a build; all must succeed.
    #[serde(default)]
    pub pre_build: Vec<HookSettings>,
    /// Run in list order after a successful build.
    #[serde(default)]
    pub post_build: Vec<HookSettings>,
    /// `auto` resolves to thread isolation; set true to force subprocess isolation.
    #[serde(default)]
    pub process_isolation: bool,
    #[serde(default = "default_min_notify_interval_ms")]
    pub min_notify_interval_ms: u64,
    #[serde(default = "default_sse_keepalive_secs")]
    pub sse_keepalive_secs: u64,
    #[serde(default = "default_true")]
    pub content_hash_filtering: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub open: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            open: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotsiteConfig {
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub dev_server: DevServerSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub site_root: PathBuf,
    pub output_dir: PathBuf,
    pub config: HotsiteConfig,
}
