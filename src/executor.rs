//! Runs exactly one build at a time, isolated from the server process.
//!
//! Rust has no global interpreter lock, so `auto` always resolves to
//! thread isolation: the build runs on a blocking-pool thread behind a
//! `catch_unwind` boundary, and a panic there can never take the server
//! down. Process isolation is offered as an explicit opt-in for parity
//! with runtimes that need it, and is implemented by re-executing the
//! current binary as a build worker and exchanging `bincode`-framed
//! requests/results over its stdio.

use std::io::Write as _;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use crate::render_engine::{BuildRequest, BuildResult, RenderEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorMode {
    Auto,
    Thread,
    Process,
}

impl ExecutorMode {
    pub fn from_env() -> Self {
        match std::env::var("HOTSITE_BUILD_EXECUTOR").as_deref() {
            Ok("thread") => ExecutorMode::Thread,
            Ok("process") => ExecutorMode::Process,
            _ => ExecutorMode::Auto,
        }
    }

    fn resolve(self) -> ResolvedMode {
        match self {
            ExecutorMode::Process => ResolvedMode::Process,
            ExecutorMode::Thread | ExecutorMode::Auto => ResolvedMode::Thread,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedMode {
    Thread,
    Process,
}

pub struct BuildExecutor<R: RenderEngine + 'static> {
    renderer: Arc<Mutex<R>>,
    mode: ResolvedMode,
    lock: tokio::sync::Mutex<()>,
    timeout: Option<Duration>,
    worker_binary: PathBuf,
    _marker: PhantomData<R>,
}

impl<R: RenderEngine + Send + 'static> BuildExecutor<R> {
    pub fn new(renderer: R, mode: ExecutorMode, timeout: Option<Duration>) -> std::io::Result<Self> {
        Ok(Self {
            renderer: Arc::new(Mutex::new(renderer)),
            mode: mode.resolve(),
            lock: tokio::sync::Mutex::new(()),
            timeout,
            worker_binary: std::env::current_exe()?,
            _marker: PhantomData,
        })
    }

    pub async fn submit(&self, request: BuildRequest) -> BuildResult {
        let _permit = self.lock.lock().await;
        match self.mode {
            ResolvedMode::Thread => self.submit_thread(request).await,
            ResolvedMode::Process => self.submit_process(request).await,
        }
    }

    /// Waits for any in-flight build to finish, then returns. There is no
    /// persistent worker to tear down in thread mode; `wait` controls
    /// only whether we block on the current build lock.
    pub async fn shutdown(&self, wait: bool) {
        if wait {
            let _permit = self.lock.lock().await;
        }
    }

    /// Replaces the long-lived renderer instance with a fresh one built
    /// from `site_root`. Used for recovery after a crash-level build
    /// failure that may have left in-process state corrupted. A no-op in
    /// process-isolation mode, since every build there already gets a
    /// fresh renderer in the child.
    pub fn reinitialize(&self, site_root: &std::path::Path) -> Result<(), crate::render_engine::RenderEngineError> {
        if self.mode != ResolvedMode::Thread {
            return Ok(());
        }
        let fresh = R::from_config(site_root)?;
        *self.renderer.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
        Ok(())
    }

    async fn submit_thread(&self, request: BuildRequest) -> BuildResult {
        let renderer = self.renderer.clone();
        let task = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut guard = renderer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.prepare_for_rebuild();
                guard.build(&request.options)
            }));
            (outcome, start.elapsed())
        });

        let awaited = match self.timeout {
            Some(duration) => match tokio::time::timeout(duration, task).await {
                Ok(joined) => joined,
                Err(_) => return BuildResult::failure("build timed out"),
            },
            None => task.await,
        };

        match awaited {
            Ok((Ok(Ok(stats)), elapsed)) => BuildResult {
                success: true,
                pages_built: stats.total_pages,
                build_time_ms: elapsed.as_secs_f64() * 1000.0,
                error_message: None,
                changed_outputs: stats.changed_outputs,
                reload_hint: stats.reload_hint,
            },
            Ok((Ok(Err(err)), _)) => BuildResult::failure(err.to_string()),
            Ok((Err(panic), _)) => BuildResult::failure(panic_message(panic)),
            Err(join_err) => BuildResult::failure(format!("build worker thread failed: {join_err}")),
        }
    }

    async fn submit_process(&self, request: BuildRequest) -> BuildResult {
        let encoded = match bincode::serialize(&request) {
            Ok(bytes) => bytes,
            Err(err) => return BuildResult::failure(format!("failed to encode build request: {err}")),
        };

        let spawn = Command::new(&self.worker_binary)
            .arg("--build-worker")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn();

        let mut child = match spawn {
            Ok(child) => child,
            Err(err) => return BuildResult::failure(format!("failed to spawn build worker: {err}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            let write = async {
                stdin.write_all(&encoded).await?;
                stdin.shutdown().await
            };
            if let Err(err) = write.await {
                return BuildResult::failure(format!("failed to write build request: {err}"));
            }
        }

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(duration) => match tokio::time::timeout(duration, wait).await {
                Ok(result) => result,
                Err(_) => return BuildResult::failure("build worker timed out"),
            },
            None => wait.await,
        };

        let output = match output {
            Ok(output) => output,
            Err(err) => return BuildResult::failure(format!("build worker wait failed: {err}")),
        };

        if !output.status.success() {
            return BuildResult::failure(format!(
                "build worker exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        match bincode::deserialize::<BuildResult>(&output.stdout) {
            Ok(result) => result,
            Err(err) => BuildResult::failure(format!("failed to decode build result: {err}")),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("build panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("build panicked: {s}")
    } else {
        "build panicked".to_string()
    }
}

/// Entry point for the `--build-worker` subprocess: reads a `BuildRequest`
/// from stdin, runs it against a freshly constructed renderer, and writes
/// the `BuildResult` to stdout. Never called in thread-isolation mode.
pub fn run_build_worker<R: RenderEngine>() -> std::io::Result<()> {
    use std::io::Read as _;

    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;

    let result = match bincode::deserialize::<BuildRequest>(&buf) {
        Ok(request) => {
            let start = Instant::now();
            match R::from_config(&request.site_root) {
                Ok(mut renderer) => match renderer.build(&request.options) {
                    Ok(stats) => BuildResult {
                        success: true,
                        pages_built: stats.total_pages,
                        build_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                        error_message: None,
                        changed_outputs: stats.changed_outputs,
                        reload_hint: stats.reload_hint,
                    },
                    Err(err) => BuildResult::failure(err.to_string()),
                },
                Err(err) => BuildResult::failure(err.to_string()),
            }
        }
        Err(err) => BuildResult::failure(format!("failed to decode build request: {err}")),
    };

    let encoded = bincode::serialize(&result)
        .map_err(|err| std::io::Error::other(format!("failed to encode build result: {err}")))?;
    std::io::stdout().write_all(&encoded)?;
    Ok(())
}
