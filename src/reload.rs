//! Maps the set of changed output artifacts to a browser-facing decision:
//! suppress, hot-swap stylesheets, or reload the page.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::render_engine::{OutputPhase, OutputRecord, OutputType, ReloadHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    None,
    CssOnly,
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadDecision {
    pub action: ReloadAction,
    pub reason: String,
    pub changed_paths: Vec<PathBuf>,
}

impl ReloadDecision {
    fn none(reason: impl Into<String>) -> Self {
        Self {
            action: ReloadAction::None,
            reason: reason.into(),
            changed_paths: Vec::new(),
        }
    }

    fn reload(reason: impl Into<String>, changed_paths: Vec<PathBuf>) -> Self {
        Self {
            action: ReloadAction::Reload,
            reason: reason.into(),
            changed_paths,
        }
    }

    fn css_only(reason: impl Into<String>, changed_paths: Vec<PathBuf>) -> Self {
        Self {
            action: ReloadAction::CssOnly,
            reason: reason.into(),
            changed_paths,
        }
    }
}

pub struct EnhancedReloadDecision {
    pub decision: ReloadDecision,
    pub meaningful_change_count: usize,
}

fn is_aggregate_path(path: &Path, ignored_globs: &globset::GlobSet) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    matches!(name.as_str(), "sitemap.xml" | "feed.xml" | "atom.xml" | "llm-full.txt")
        || name.ends_with("search-index.json")
        || ignored_globs.is_match(path)
}

pub struct ReloadController {
    min_notify_interval: Mutex<Duration>,
    last_notify: Mutex<Option<Instant>>,
    ignored_globs: Mutex<globset::GlobSet>,
    baseline: Mutex<HashMap<PathBuf, (u64, String)>>,
    pub use_content_hashes: bool,
}

impl ReloadController {
    pub fn new(min_notify_interval: Duration, use_content_hashes: bool) -> Self {
        Self {
            min_notify_interval: Mutex::new(min_notify_interval),
            last_notify: Mutex::new(None),
            ignored_globs: Mutex::new(globset::GlobSetBuilder::new().build().unwrap()),
            baseline: Mutex::new(HashMap::new()),
            use_content_hashes,
        }
    }

    pub fn set_min_notify_interval(&self, interval: Duration) {
        *self.min_notify_interval.lock().unwrap() = interval;
    }

    pub fn set_ignored_globs(&self, globs: globset::GlobSet) {
        *self.ignored_globs.lock().unwrap() = globs;
    }

    pub fn decide_from_outputs(
        &self,
        records: &[OutputRecord],
        reload_hint: Option<ReloadHint>,
    ) -> ReloadDecision {
        if records.is_empty() {
            if matches!(reload_hint, Some(ReloadHint::None)) {
                return ReloadDecision::none("no-meaningful-records");
            }
            return ReloadDecision::none("no-records");
        }

        let all_css_assets = records
            .iter()
            .all(|r| r.output_type == OutputType::Css && r.phase == OutputPhase::Asset);

        if all_css_assets {
            return ReloadDecision::css_only(
                "css-only-outputs",
                records.iter().map(|r| r.path.clone()).collect(),
            );
        }

        let has_reload_trigger = records
            .iter()
            .any(|r| matches!(r.output_type, OutputType::Html | OutputType::Js));

        if has_reload_trigger {
            return ReloadDecision::reload(
                "html-or-js-outputs",
                records.iter().map(|r| r.path.clone()).collect(),
            );
        }

        ReloadDecision::reload(
            "other-outputs",
            records.iter().map(|r| r.path.clone()).collect(),
        )
    }

    pub fn decide_from_changed_paths(&self, paths: &[PathBuf]) -> ReloadDecision {
        if paths.is_empty() {
            return ReloadDecision::none("no-changes");
        }

        let all_css = paths
            .iter()
            .all(|p| p.extension().is_some_and(|ext| ext == "css"));

        if all_css {
            ReloadDecision::css_only("css-only-paths", paths.to_vec())
        } else {
            ReloadDecision::reload("fallback-paths", paths.to_vec())
        }
    }

    /// Snapshots `(size, sha256)` for every file under `output_dir`, to be
    /// compared against after the build completes.
    pub fn capture_baseline(&self, output_dir: &Path) -> std::io::Result<()> {
        let snapshot = scan_output_dir(output_dir)?;
        *self.baseline.lock().unwrap() = snapshot;
        Ok(())
    }

    pub fn decide_with_content_hashes(&self, output_dir: &Path) -> std::io::Result<EnhancedReloadDecision> {
        let after = scan_output_dir(output_dir)?;
        let baseline = self.baseline.lock().unwrap();
        let ignored_globs = self.ignored_globs.lock().unwrap();

        let mut content_changes = BTreeSet::new();
        let mut asset_changes = BTreeSet::new();
        let mut aggregate_changes = BTreeSet::new();

        for (path, entry) in &after {
            if baseline.get(path) == Some(entry) {
                continue;
            }
            if is_aggregate_path(path, &ignored_globs) {
                aggregate_changes.insert(path.clone());
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("html") | Some("htm") => {
                    content_changes.insert(path.clone());
                }
                Some("css") | Some("js") | Some("png") | Some("jpg") | Some("jpeg") | Some("svg")
                | Some("woff") | Some("woff2") => {
                    asset_changes.insert(path.clone());
                }
                _ => {
                    aggregate_changes.insert(path.clone());
                }
            }
        }

        let meaningful_change_count = content_changes.len() + asset_changes.len();

        let decision = if meaningful_change_count == 0 {
            ReloadDecision::none("aggregate-only")
        } else if content_changes.is_empty() && asset_changes.iter().all(|p| p.extension().is_some_and(|e| e == "css")) {
            ReloadDecision::css_only(
                "content-hash-css-only",
                asset_changes.into_iter().collect(),
            )
        } else {
            let mut changed: Vec<PathBuf> = content_changes.into_iter().chain(asset_changes).collect();
            changed.sort();
            ReloadDecision::reload("content-hash-filtered", changed)
        };

        let _ = aggregate_changes;

        Ok(EnhancedReloadDecision {
            decision,
            meaningful_change_count,
        })
    }

    /// True if a notification may be sent now; also records the send time.
    /// Collapses rapid successive decisions into one per `min_notify_interval`.
    pub fn try_mark_notified(&self) -> bool {
        let interval = *self.min_notify_interval.lock().unwrap();
        let mut last = self.last_notify.lock().unwrap();
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

fn scan_output_dir(output_dir: &Path) -> std::io::Result<HashMap<PathBuf, (u64, String)>> {
    let mut out = HashMap::new();
    if !output_dir.exists() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(output_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path().to_path_buf();
        let bytes = std::fs::read(&path)?;
        let size = bytes.len() as u64;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = hex::encode(hasher.finalize());
        out.insert(path, (size, hash));
    }
    Ok(out)
}

/// The exact cascading fallback used by `BuildTrigger` after a build
/// completes: typed outputs first, then raw changed paths, then a bare
/// "something changed" signal, then a content-hash gate that can still
/// downgrade a `reload` to `none` when only aggregate files moved.
pub fn resolve_reload_decision(
    controller: &ReloadController,
    changed_files: &[PathBuf],
    changed_outputs: &[OutputRecord],
    reload_hint: Option<ReloadHint>,
    output_dir: &Path,
) -> ReloadDecision {
    let mut decision = if !changed_outputs.is_empty() {
        controller.decide_from_outputs(changed_outputs, reload_hint)
    } else if !changed_files.is_empty() {
        controller.decide_from_changed_paths(changed_files)
    } else {
        ReloadDecision::none("no-changes")
    };

    if decision.action == ReloadAction::None && !changed_files.is_empty() && changed_outputs.is_empty() {
        decision = ReloadDecision::reload("source-change-no-outputs", changed_files.to_vec());
    }

    if decision.action == ReloadAction::Reload && controller.use_content_hashes {
        match controller.decide_with_content_hashes(output_dir) {
            Ok(enhanced) if enhanced.meaningful_change_count == 0 => {
                decision = ReloadDecision::none("aggregate-only");
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("[hotsite] content-hash comparison failed: {err}");
            }
        }
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, output_type: OutputType, phase: OutputPhase) -> OutputRecord {
        OutputRecord {
            path: PathBuf::from(path),
            output_type,
            phase,
        }
    }

    #[test]
    fn css_only_outputs_yield_css_only_decision() {
        let controller = ReloadController::new(Duration::from_millis(300), false);
        let records = vec![record("style.css", OutputType::Css, OutputPhase::Asset)];
        let decision = controller.decide_from_outputs(&records, None);
        assert_eq!(decision.action, ReloadAction::CssOnly);
    }

    #[test]
    fn html_outputs_yield_reload_decision() {
        let controller = ReloadController::new(Duration::from_millis(300), false);
        let records = vec![record("about/index.html", OutputType::Html, OutputPhase::Render)];
        let decision = controller.decide_from_outputs(&records, None);
        assert_eq!(decision.action, ReloadAction::Reload);
    }

    #[test]
    fn empty_records_with_none_hint_suppress() {
        let controller = ReloadController::new(Duration::from_millis(300), false);
        let decision = controller.decide_from_outputs(&[], Some(ReloadHint::None));
        assert_eq!(decision.action, ReloadAction::None);
    }

    #[test]
    fn fallback_paths_all_css_is_css_only() {
        let controller = ReloadController::new(Duration::from_millis(300), false);
        let decision = controller.decide_from_changed_paths(&[PathBuf::from("a.css"), PathBuf::from("b.css")]);
        assert_eq!(decision.action, ReloadAction::CssOnly);
    }

    #[test]
    fn fallback_paths_mixed_is_reload() {
        let controller = ReloadController::new(Duration::from_millis(300), false);
        let decision = controller.decide_from_changed_paths(&[PathBuf::from("a.css"), PathBuf::from("b.html")]);
        assert_eq!(decision.action, ReloadAction::Reload);
    }

    #[test]
    fn rate_limit_collapses_rapid_notifications() {
        let controller = ReloadController::new(Duration::from_millis(1000), false);
        assert!(controller.try_mark_notified());
        assert!(!controller.try_mark_notified());
    }

    #[test]
    fn aggregate_only_changes_suppress_reload() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ReloadController::new(Duration::from_millis(300), true);
        std::fs::write(dir.path().join("sitemap.xml"), "v1").unwrap();
        controller.capture_baseline(dir.path()).unwrap();
        std::fs::write(dir.path().join("sitemap.xml"), "v2").unwrap();

        let decision = resolve_reload_decision(
            &controller,
            &[PathBuf::from("content/about.md")],
            &[record("sitemap.xml", OutputType::Sitemap, OutputPhase::Postprocess)],
            None,
            dir.path(),
        );
        assert_eq!(decision.action, ReloadAction::None);
        assert_eq!(decision.reason, "aggregate-only");
    }
}
