//! Pipeline state registry with asynchronous compilation
//!
//! Pipeline state objects (PSOs) are registered by id with a description,
//! then compiled off-thread so frame building never blocks on shader
//! compilation. A pass whose PSO is still `Loading` is skipped for the
//! frame and picked up once [`PipelineRegistry::poll`] observes the
//! finished compile.

use std::collections::HashMap;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use thiserror::Error;

/// Identifier of a pipeline state object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsoId(pub &'static str);

impl std::fmt::Display for PsoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// PSO compilation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PsoError {
    /// The id was never registered
    #[error("pipeline {0} not registered")]
    NotRegistered(PsoIdOwned),

    /// Compilation failed
    #[error("pipeline {id} failed to compile: {reason}")]
    CompileFailed { id: PsoIdOwned, reason: String },
}

/// Owned id for error payloads
pub type PsoIdOwned = &'static str;

/// Description of a pipeline state object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsoDesc {
    /// Vertex shader entry name
    pub vertex_shader: String,
    /// Fragment shader entry name; `None` for depth-only pipelines
    pub fragment_shader: Option<String>,
    /// Compute shader entry name for compute pipelines
    pub compute_shader: Option<String>,
    /// Whether the pipeline tests and writes depth
    pub depth_enabled: bool,
    /// Whether the pipeline blends its output
    pub blend_enabled: bool,
}

impl PsoDesc {
    /// Raster pipeline writing color with depth testing
    pub fn raster(vertex_shader: &str, fragment_shader: &str) -> Self {
        Self {
            vertex_shader: vertex_shader.to_string(),
            fragment_shader: Some(fragment_shader.to_string()),
            compute_shader: None,
            depth_enabled: true,
            blend_enabled: false,
        }
    }

    /// Depth-only pipeline with no fragment stage
    pub fn depth_only(vertex_shader: &str) -> Self {
        Self {
            vertex_shader: vertex_shader.to_string(),
            fragment_shader: None,
            compute_shader: None,
            depth_enabled: true,
            blend_enabled: false,
        }
    }

    /// Compute pipeline
    pub fn compute(compute_shader: &str) -> Self {
        Self {
            vertex_shader: String::new(),
            fragment_shader: None,
            compute_shader: Some(compute_shader.to_string()),
            depth_enabled: false,
            blend_enabled: false,
        }
    }

    /// Enable blending
    pub fn with_blend(mut self) -> Self {
        self.blend_enabled = true;
        self
    }
}

/// Lifecycle state of a registered PSO
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsoState {
    /// Queued or compiling on the worker
    Loading,
    /// Compiled and usable by passes
    Ready,
    /// Compilation failed; the reason is kept for diagnostics
    Failed(String),
}

enum CompileJob {
    Compile(PsoId, PsoDesc),
    Shutdown,
}

struct CompileResult {
    id: PsoId,
    outcome: Result<(), String>,
}

/// Validate a description the way a device compile would reject it
fn compile(desc: &PsoDesc) -> Result<(), String> {
    if let Some(cs) = &desc.compute_shader {
        if cs.is_empty() {
            return Err("empty compute shader".to_string());
        }
        return Ok(());
    }
    if desc.vertex_shader.is_empty() {
        return Err("missing vertex shader".to_string());
    }
    Ok(())
}

/// Registry of pipeline state objects with an async compile worker
pub struct PipelineRegistry {
    states: HashMap<PsoId, PsoState>,
    jobs: Sender<CompileJob>,
    results: Receiver<CompileResult>,
    pending: usize,
    worker: Option<JoinHandle<()>>,
}

impl PipelineRegistry {
    /// Create a registry and spawn its compile worker
    pub fn new() -> Self {
        let (jobs, job_rx) = unbounded::<CompileJob>();
        let (result_tx, results) = unbounded::<CompileResult>();

        let worker = std::thread::Builder::new()
            .name("pso-compile".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    match job {
                        CompileJob::Compile(id, desc) => {
                            let outcome = compile(&desc);
                            // Receiver gone means the registry dropped mid-compile
                            if result_tx.send(CompileResult { id, outcome }).is_err() {
                                break;
                            }
                        }
                        CompileJob::Shutdown => break,
                    }
                }
            })
            .ok();

        Self {
            states: HashMap::new(),
            jobs,
            results,
            pending: 0,
            worker,
        }
    }

    /// Register a PSO and queue its compilation
    ///
    /// Registering an id that already exists re-queues a compile with the
    /// new description, so hosts can hot-swap pipelines.
    pub fn register(&mut self, id: PsoId, desc: PsoDesc) {
        debug!("queueing pipeline compile for {}", id);
        self.states.insert(id, PsoState::Loading);
        self.pending += 1;
        // Send only fails when the worker thread is gone; compile inline then
        if self.jobs.send(CompileJob::Compile(id, desc.clone())).is_err() {
            let outcome = compile(&desc);
            self.apply(CompileResult { id, outcome });
        }
    }

    fn apply(&mut self, result: CompileResult) {
        self.pending = self.pending.saturating_sub(1);
        let state = match result.outcome {
            Ok(()) => {
                debug!("pipeline {} ready", result.id);
                PsoState::Ready
            }
            Err(reason) => {
                warn!("pipeline {} failed: {}", result.id, reason);
                PsoState::Failed(reason)
            }
        };
        self.states.insert(result.id, state);
    }

    /// Drain finished compiles without blocking
    pub fn poll(&mut self) {
        while let Ok(result) = self.results.try_recv() {
            self.apply(result);
        }
    }

    /// Block until every queued compile has finished
    pub fn wait_idle(&mut self) {
        while self.pending > 0 {
            match self.results.recv() {
                Ok(result) => self.apply(result),
                Err(_) => break,
            }
        }
    }

    /// State of a registered PSO
    pub fn state(&self, id: PsoId) -> Result<&PsoState, PsoError> {
        self.states.get(&id).ok_or(PsoError::NotRegistered(id.0))
    }

    /// Whether a PSO is compiled and usable
    pub fn is_ready(&self, id: PsoId) -> bool {
        matches!(self.states.get(&id), Some(PsoState::Ready))
    }

    /// Number of compiles still in flight
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PipelineRegistry {
    fn drop(&mut self) {
        let _ = self.jobs.send(CompileJob::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
