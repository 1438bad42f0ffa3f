//! The contract this crate uses to invoke the (external, unimplemented
//! here) page-rendering engine, plus the closed set of serializable
//! records that cross thread and process boundaries.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildProfile {
    Dev,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub incremental: bool,
    pub force_sequential: bool,
    pub profile: BuildProfile,
    pub changed_sources: BTreeSet<PathBuf>,
    pub nav_changed_sources: BTreeSet<PathBuf>,
    pub structural_changed: bool,
    pub version_scope: Option<String>,
}

impl BuildOptions {
    pub fn full(changed_sources: BTreeSet<PathBuf>) -> Self {
        Self {
            incremental: false,
            force_sequential: false,
            profile: BuildProfile::Dev,
            changed_sources,
            nav_changed_sources: BTreeSet::new(),
            structural_changed: true,
            version_scope: None,
        }
    }

    pub fn incremental(changed_sources: BTreeSet<PathBuf>, nav_changed_sources: BTreeSet<PathBuf>) -> Self {
        Self {
            incremental: true,
            force_sequential: false,
            profile: BuildProfile::Incremental,
            changed_sources,
            nav_changed_sources,
            structural_changed: false,
            version_scope: None,
        }
    }
}

/// The value that actually crosses a process boundary to a build worker.
/// Must round-trip through `bincode` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub options: BuildOptions,
    pub site_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputType {
    Html,
    Css,
    Js,
    Asset,
    Sitemap,
    Feed,
    SearchIndex,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputPhase {
    Render,
    Asset,
    Postprocess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub path: PathBuf,
    pub output_type: OutputType,
    pub phase: OutputPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadHint {
    CssOnly,
    Full,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    pub pages_built: u64,
    pub build_time_ms: f64,
    pub error_message: Option<String>,
    pub changed_outputs: Vec<OutputRecord>,
    pub reload_hint: Option<ReloadHint>,
}

impl BuildResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            pages_built: 0,
            build_time_ms: 0.0,
            error_message: Some(message.into()),
            changed_outputs: Vec::new(),
            reload_hint: None,
        }
    }
}

/// Summary a rendering engine returns from a build call. Distinct from
/// `BuildResult` because the engine runs in-process (possibly across a
/// worker-thread/process boundary) and doesn't need the `success` framing
/// the executor adds around it.
#[derive(Debug, Clone)]
pub struct BuildStats {
    pub total_pages: u64,
    pub build_time_ms: f64,
    pub changed_outputs: Vec<OutputRecord>,
    pub reload_hint: Option<ReloadHint>,
}

#[derive(thiserror::Error, Debug)]
pub enum RenderEngineError {
    #[error("{0}")]
    Build(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The narrow surface this crate needs from a page-rendering engine.
/// `BuildTrigger` and `BuildExecutor` only ever call through this trait.
pub trait RenderEngine: Send {
    fn build(&mut self, options: &BuildOptions) -> Result<BuildStats, RenderEngineError>;

    /// Reset per-build mutable state on a long-lived instance before a
    /// warm rebuild (content registry, cascade snapshot, page/URL caches).
    fn prepare_for_rebuild(&mut self);

    /// Construct a fresh instance from config, used to recover after a
    /// crash-level build failure that may have corrupted in-process state.
    fn from_config(root_path: &std::path::Path) -> Result<Self, RenderEngineError>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_round_trips_through_bincode() {
        let mut changed_sources = BTreeSet::new();
        changed_sources.insert(PathBuf::from("content/about.md"));
        let mut nav_changed_sources = BTreeSet::new();
        nav_changed_sources.insert(PathBuf::from("content/about.md"));

        let request = BuildRequest {
            options: BuildOptions {
                incremental: true,
                force_sequential: false,
                profile: BuildProfile::Incremental,
                changed_sources,
                nav_changed_sources,
                structural_changed: false,
                version_scope: Some("v2".to_string()),
            },
            site_root: PathBuf::from("/site"),
        };

        let encoded = bincode::serialize(&request).unwrap();
        let decoded: BuildRequest = bincode::deserialize(&encoded).unwrap();
        assert_eq!(request, decoded);
    }

    #[test]
    fn build_result_round_trips_through_bincode() {
        let result = BuildResult {
            success: true,
            pages_built: 3,
            build_time_ms: 12.5,
            error_message: None,
            changed_outputs: vec![OutputRecord {
                path: PathBuf::from("about/index.html"),
                output_type: OutputType::Html,
                phase: OutputPhase::Render,
            }],
            reload_hint: Some(ReloadHint::Full),
        };

        let encoded = bincode::serialize(&result).unwrap();
        let decoded: BuildResult = bincode::deserialize(&encoded).unwrap();
        assert_eq!(result, decoded);
    }

    #[test]
    fn build_result_failure_round_trips_through_bincode() {
        let result = BuildResult::failure("renderer crashed");

        let encoded = bincode::serialize(&result).unwrap();
        let decoded: BuildResult = bincode::deserialize(&encoded).unwrap();
        assert_eq!(result, decoded);
    }
}
