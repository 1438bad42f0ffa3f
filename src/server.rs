//! Wires every module together into a running dev server: load config,
//! take over from any stale process, start the watcher and HTTP listener,
//! and tear everything down in order on a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HotsiteConfig;
use crate::devstate::DevState;
use crate::error::HotsiteError;
use crate::executor::{BuildExecutor, ExecutorMode};
use crate::ignore_filter::IgnoreFilter;
use crate::pidfile::{self, StalePid};
use crate::reload::ReloadController;
use crate::render_engine::RenderEngine;
use crate::resources::ResourceManager;
use crate::trigger::classify::{Classifier, ClassifierConfig};
use crate::trigger::{BuildTrigger, HookConfig};
use crate::watch::{Backend, WatcherRunner};

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ServeOptions {
    pub site_root: PathBuf,
    pub output_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub bind_override: Option<String>,
    pub port_override: Option<u16>,
    pub open_override: Option<bool>,
    pub watch: bool,
}

pub async fn serve<R: RenderEngine + Sync + 'static>(opts: ServeOptions, renderer: R) -> Result<(), HotsiteError> {
    let mut config = HotsiteConfig::load(opts.config_file.as_deref())?;
    if let Some(bind) = opts.bind_override {
        config.http.bind = bind;
    }
    if let Some(port) = opts.port_override {
        config.http.port = port;
    }
    if let Some(open) = opts.open_override {
        config.http.open = open;
    }

    let resources = Arc::new(ResourceManager::new());

    claim_pid_file(&opts.site_root, &resources)?;

    let dev_state = DevState::new();
    let ignore_filter = Arc::new(IgnoreFilter::from_settings(
        &opts.site_root,
        &opts.output_dir,
        &config.dev_server,
    )?);
    let reload_controller = Arc::new(ReloadController::new(
        Duration::from_millis(config.dev_server.min_notify_interval_ms),
        config.dev_server.content_hash_filtering,
    ));

    let executor_mode = if config.dev_server.process_isolation {
        ExecutorMode::Process
    } else {
        ExecutorMode::from_env()
    };
    let executor = Arc::new(BuildExecutor::new(renderer, executor_mode, None)?);

    let classifier = Classifier::new(ClassifierConfig::default());
    let hooks = HookConfig {
        pre_build: config.dev_server.pre_build.clone(),
        post_build: config.dev_server.post_build.clone(),
    };

    let trigger = Arc::new(BuildTrigger::new(
        opts.site_root.clone(),
        opts.output_dir.clone(),
        classifier,
        executor.clone(),
        reload_controller,
        dev_state.clone(),
        hooks,
    ));

    let mut watcher_runner = None;
    if opts.watch {
        let watcher_trigger = trigger.clone();
        let backend = Backend::from_env();
        let runner = Arc::new(WatcherRunner::new(
            opts.site_root.clone(),
            config.watch.clone(),
            ignore_filter.clone(),
            backend,
            move |batch| {
                let trigger = watcher_trigger.clone();
                tokio::spawn(async move {
                    trigger.trigger_build(batch.paths, batch.event_types).await;
                });
            },
        ));
        runner.start().map_err(|err| HotsiteError::WatcherStartFailed(err.to_string()))?;
        watcher_runner = Some(runner);
    }

    let app = crate::http::build_app(&opts.output_dir, dev_state.clone());
    let listener = tokio::net::TcpListener::bind((config.http.bind.as_str(), config.http.port))
        .await
        .map_err(|_| HotsiteError::PortInUse { port: config.http.port })?;

    println!(
        "[hotsite] serving {} on http://{}:{}",
        opts.output_dir.display(),
        config.http.bind,
        config.http.port
    );

    if config.http.open {
        let _ = open::that(format!("http://{}:{}", config.http.bind, config.http.port));
    }

    let shutdown_signal = wait_for_shutdown_signal();

    let serve_result = tokio::time::timeout(
        SHUTDOWN_DRAIN_TIMEOUT,
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal),
    )
    .await;

    // Shutdown order mirrors the original dev server: stop accepting new
    // file events, wait for any in-flight build, close SSE queues, then
    // clean up whatever's left (the PID file) via the resource stack.
    if let Some(runner) = &watcher_runner {
        runner.stop();
    }
    executor.shutdown(true).await;
    dev_state.close_all();
    resources.cleanup_all();

    match serve_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(HotsiteError::Io(err)),
        Err(_) => Ok(()),
    }
}

fn claim_pid_file(site_root: &std::path::Path, resources: &Arc<ResourceManager>) -> Result<(), HotsiteError> {
    match pidfile::detect(site_root)? {
        StalePid::None => {}
        StalePid::Dead(_) => {}
        StalePid::Live(pid) => {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "a dev server (pid {pid}) appears to already be running for this site; terminate it?"
                ))
                .default(true)
                .interact()
                .unwrap_or(false);

            if confirmed {
                pidfile::terminate(pid).map_err(|source| HotsiteError::StaleProcessKillFailed { pid, source })?;
            } else {
                eprintln!("[hotsite] continuing without terminating pid {pid}; the port may already be bound");
            }
        }
    }

    let path = pidfile::write(site_root)?;
    resources.register("pid-file", move || {
        pidfile::remove(&path);
        Ok(())
    });
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
            _ = sighup.recv() => {}
        }

        println!("[hotsite] shutting down");

        // A second signal forces an immediate exit rather than waiting on
        // in-flight work.
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            std::process::exit(130);
        });
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        println!("[hotsite] shutting down");
    }
}
