//! The heart of the core: classifies every debounced change batch,
//! decides full vs. incremental, runs hooks, drives `BuildExecutor`, and
//! hands the result to `ReloadController`.

pub mod cache;
pub mod classify;
pub mod hooks;

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::HookSettings;
use crate::devstate::DevState;
use crate::executor::BuildExecutor;
use crate::reload::{resolve_reload_decision, ReloadAction, ReloadController};
use crate::render_engine::{BuildOptions, BuildProfile, BuildRequest, RenderEngine};
use crate::watch::{ChangeBatch, EventType};

use classify::Classifier;

const STABILIZATION_DELAY: Duration = Duration::from_millis(100);
const FAILURE_SIGNATURE_HISTORY: usize = 20;

#[derive(Debug, Default)]
struct TriggerState {
    building: bool,
    pending: ChangeBatch,
}

pub struct HookConfig {
    pub pre_build: Vec<HookSettings>,
    pub post_build: Vec<HookSettings>,
}

pub struct BuildTrigger<R: RenderEngine + 'static> {
    site_root: PathBuf,
    output_dir: PathBuf,
    state: Mutex<TriggerState>,
    classifier: Mutex<Classifier>,
    executor: Arc<BuildExecutor<R>>,
    reload_controller: Arc<ReloadController>,
    dev_state: Arc<DevState>,
    hooks: HookConfig,
    recent_failures: Mutex<VecDeque<(String, String)>>,
}

impl<R: RenderEngine + Send + Sync + 'static> BuildTrigger<R> {
    pub fn new(
        site_root: PathBuf,
        output_dir: PathBuf,
        classifier: Classifier,
        executor: Arc<BuildExecutor<R>>,
        reload_controller: Arc<ReloadController>,
        dev_state: Arc<DevState>,
        hooks: HookConfig,
    ) -> Self {
        Self {
            site_root,
            output_dir,
            state: Mutex::new(TriggerState::default()),
            classifier: Mutex::new(classifier),
            executor,
            reload_controller,
            dev_state,
            hooks,
            recent_failures: Mutex::new(VecDeque::with_capacity(FAILURE_SIGNATURE_HISTORY)),
        }
    }

    /// Invoked on every debounced tick from `WatcherRunner`. Returns a
    /// boxed future so it can recurse across the stabilization delay
    /// without unbounded async-fn-in-async-fn nesting.
    pub fn trigger_build<'a>(
        &'a self,
        paths: BTreeSet<PathBuf>,
        event_types: BTreeSet<EventType>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if paths.is_empty() {
                return;
            }

            let batch = ChangeBatch { paths, event_types };

            let should_run = {
                let mut state = self.state.lock().unwrap();
                if state.building {
                    state.pending.merge(batch);
                    false
                } else {
                    state.building = true;
                    let mut current = std::mem::take(&mut state.pending);
                    current.merge(batch);
                    state.pending = current;
                    true
                }
            };

            if !should_run {
                return;
            }

            let current = {
                let mut state = self.state.lock().unwrap();
                std::mem::take(&mut state.pending)
            };

            self.execute_build(current).await;

            let pending = {
                let mut state = self.state.lock().unwrap();
                state.building = false;
                if state.pending.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut state.pending))
                }
            };

            if let Some(pending) = pending {
                tokio::time::sleep(STABILIZATION_DELAY).await;
                self.trigger_build(pending.paths, pending.event_types).await;
            }
        })
    }

    async fn execute_build(&self, batch: ChangeBatch) {
        self.dev_state.set_build_in_progress(true);

        if let Err(err) = self.reload_controller.capture_baseline(&self.output_dir) {
            eprintln!("[hotsite] failed to capture output baseline: {err}");
        }

        let pre_outcomes = hooks::run_hooks(&self.hooks.pre_build, &self.site_root, true).await;
        if let Some(err) = pre_outcomes.iter().find_map(|o| o.as_error()) {
            eprintln!("[hotsite] {} {err}", err.code());
            self.dev_state.set_build_in_progress(false);
            return;
        }

        let classification = {
            let mut classifier = self.classifier.lock().unwrap();
            classifier.classify(&batch.paths, &batch.event_types)
        };

        let options = if classification.needs_full_rebuild {
            BuildOptions::full(batch.paths.clone())
        } else {
            BuildOptions::incremental(batch.paths.clone(), classification.nav_changed_sources.clone())
        };
        let mut options = options;
        options.structural_changed = classification.structural_changed;
        let profile = if classification.needs_full_rebuild {
            BuildProfile::Dev
        } else {
            BuildProfile::Incremental
        };
        options.profile = profile;

        let request = BuildRequest {
            options,
            site_root: self.site_root.clone(),
        };

        let start = std::time::Instant::now();
        let result = self.executor.submit(request).await;
        let changed_files: Vec<PathBuf> = batch.paths.into_iter().collect();

        if result.success {
            println!(
                "[hotsite] build ok: {} pages in {:.0}ms",
                result.pages_built, result.build_time_ms
            );

            let post_outcomes = hooks::run_hooks(&self.hooks.post_build, &self.site_root, false).await;
            for err in post_outcomes.iter().filter_map(|o| o.as_error()) {
                eprintln!("[hotsite] {} {err}", err.code());
            }

            let decision = resolve_reload_decision(
                &self.reload_controller,
                &changed_files,
                &result.changed_outputs,
                result.reload_hint,
                &self.output_dir,
            );

            if decision.action != ReloadAction::None && self.reload_controller.try_mark_notified() {
                self.dev_state.broadcast_reload(&decision);
            }
        } else {
            let message = result.error_message.unwrap_or_default();
            let recurring = self.record_failure(&changed_files, &message);
            eprintln!(
                "[hotsite] build failed ({}recurring): {message}",
                if recurring { "" } else { "not " }
            );
            if let Err(err) = self.executor.reinitialize(&self.site_root) {
                eprintln!("[hotsite] failed to reinitialize renderer after crash: {err}");
            }
        }

        let _ = start.elapsed();
        self.dev_state.set_build_in_progress(false);
    }

    fn record_failure(&self, changed_files: &[PathBuf], message: &str) -> bool {
        let signature = (
            changed_files.first().map(|p| p.display().to_string()).unwrap_or_default(),
            message.to_string(),
        );
        let mut history = self.recent_failures.lock().unwrap();
        let recurring = history.contains(&signature);
        if history.len() >= FAILURE_SIGNATURE_HISTORY {
            history.pop_front();
        }
        history.push_back(signature);
        recurring
    }
}
