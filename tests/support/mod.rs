//! In-memory `RenderEngine` double for integration tests. Records exactly
//! which `BuildOptions` it was invoked with and returns a caller-supplied
//! set of `OutputRecord`s rather than touching the filesystem.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use hotsite::render_engine::{
    BuildOptions, BuildStats, OutputRecord, ReloadHint, RenderEngine, RenderEngineError,
};

#[derive(Clone)]
pub struct Script {
    pub outputs: Vec<OutputRecord>,
    pub reload_hint: Option<ReloadHint>,
    pub fail: bool,
    /// Files the "render" step writes as a side effect, simulating a real
    /// engine regenerating output on disk. `(absolute path, contents)`.
    pub writes: Vec<(PathBuf, String)>,
}

impl Script {
    pub fn ok(outputs: Vec<OutputRecord>, reload_hint: Option<ReloadHint>) -> Self {
        Self {
            outputs,
            reload_hint,
            fail: false,
            writes: Vec::new(),
        }
    }

    pub fn with_writes(mut self, writes: Vec<(PathBuf, String)>) -> Self {
        self.writes = writes;
        self
    }

    pub fn failure() -> Self {
        Self {
            outputs: Vec::new(),
            reload_hint: None,
            fail: true,
            writes: Vec::new(),
        }
    }
}

pub struct FakeRenderEngine {
    pub site_root: PathBuf,
    pub calls: Arc<Mutex<Vec<BuildOptions>>>,
    script: Arc<Mutex<VecDeque<Script>>>,
}

impl FakeRenderEngine {
    pub fn new(site_root: PathBuf, script: Vec<Script>) -> Self {
        Self {
            site_root,
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RenderEngine for FakeRenderEngine {
    fn build(&mut self, options: &BuildOptions) -> Result<BuildStats, RenderEngineError> {
        self.calls.lock().unwrap().push(options.clone());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::ok(Vec::new(), Some(ReloadHint::None)));

        if step.fail {
            return Err(RenderEngineError::Build("scripted failure".to_string()));
        }

        for (path, contents) in &step.writes {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }

        Ok(BuildStats {
            total_pages: step
                .outputs
                .iter()
                .filter(|r| r.output_type == hotsite::render_engine::OutputType::Html)
                .count() as u64,
            build_time_ms: 1.0,
            changed_outputs: step.outputs,
            reload_hint: step.reload_hint,
        })
    }

    fn prepare_for_rebuild(&mut self) {}

    fn from_config(root_path: &std::path::Path) -> Result<Self, RenderEngineError> {
        Ok(Self::new(root_path.to_path_buf(), Vec::new()))
    }
}
