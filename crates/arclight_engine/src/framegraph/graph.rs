//! Frame graph construction, compilation, and execution

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use log::{debug, trace};
use thiserror::Error;

use crate::gpu::command::CommandContext;
use crate::gpu::device::{GpuError, RenderDevice, SubmitInfo};
use crate::gpu::resources::{ResourceState, TextureDesc, TextureHandle};

/// Frame graph errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameGraphError {
    /// The declared dependencies contain a cycle
    #[error("cyclic pass dependency involving pass '{0}'")]
    CyclicDependency(String),

    /// A pass referenced a resource handle the graph never issued
    #[error("unknown frame resource {0}")]
    UnknownResource(u32),

    /// Device failure during transient allocation or submission
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Handle to a resource registered with the frame graph
///
/// Valid only for the graph that issued it and only for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameResourceHandle(u32);

impl FrameResourceHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a resource comes into existence for this frame
#[derive(Debug)]
enum ResourceOrigin {
    /// Owned by the caller; the graph is told its current state
    Imported {
        texture: TextureHandle,
        state: ResourceState,
    },
    /// Allocated by the graph for this frame only
    Transient { desc: TextureDesc },
}

/// One read or write event on a resource's per-frame timeline
#[derive(Debug, Clone, Copy)]
struct AccessEvent {
    pass: usize,
    state: ResourceState,
    write: bool,
}

struct ResourceEntry {
    origin: ResourceOrigin,
    /// Events in declaration order; compilation turns these into edges
    events: Vec<AccessEvent>,
}

type ExecFn = Box<dyn FnOnce(&dyn Any, &FrameResources, &mut CommandContext)>;

struct PassEntry {
    name: String,
    data: Box<dyn Any>,
    exec: Option<ExecFn>,
    accesses: Vec<(FrameResourceHandle, ResourceState, bool)>,
}

/// Physical textures for the executing frame, indexed by graph handle
pub struct FrameResources {
    textures: Vec<TextureHandle>,
}

impl FrameResources {
    /// Physical texture behind a graph handle
    pub fn texture(&self, handle: FrameResourceHandle) -> TextureHandle {
        self.textures
            .get(handle.index())
            .copied()
            .unwrap_or_else(TextureHandle::invalid)
    }
}

/// Declares one pass's resource accesses during setup
pub struct PassBuilder<'a> {
    graph: &'a mut FrameGraph,
    pass: usize,
}

impl<'a> PassBuilder<'a> {
    /// Import a caller-owned texture, deduplicated by handle
    ///
    /// Importing the same texture from several passes yields the same
    /// graph handle, so their accesses land on one event timeline.
    pub fn import_texture(
        &mut self,
        texture: TextureHandle,
        state: ResourceState,
    ) -> FrameResourceHandle {
        self.graph.import_texture(texture, state)
    }

    /// Allocate a graph-owned texture living only for this frame
    pub fn create_transient(&mut self, desc: TextureDesc) -> FrameResourceHandle {
        self.graph.create_transient(desc)
    }

    /// Declare a read in the given state
    pub fn read(&mut self, resource: FrameResourceHandle, state: ResourceState) {
        self.graph.record_access(self.pass, resource, state, false);
    }

    /// Declare a write in the given state
    pub fn write(&mut self, resource: FrameResourceHandle, state: ResourceState) {
        self.graph.record_access(self.pass, resource, state, true);
    }
}

/// A single-frame graph of passes over shared resources
#[derive(Default)]
pub struct FrameGraph {
    resources: Vec<ResourceEntry>,
    imported: HashMap<TextureHandle, FrameResourceHandle>,
    passes: Vec<PassEntry>,
}

impl FrameGraph {
    /// Create an empty graph for one frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a caller-owned texture at graph level, deduplicated
    ///
    /// The caller states the texture's current device state; the first
    /// access in a different state gets a barrier.
    pub fn import_texture(
        &mut self,
        texture: TextureHandle,
        state: ResourceState,
    ) -> FrameResourceHandle {
        if let Some(existing) = self.imported.get(&texture) {
            return *existing;
        }
        let handle = FrameResourceHandle(self.resources.len() as u32);
        self.resources.push(ResourceEntry {
            origin: ResourceOrigin::Imported { texture, state },
            events: Vec::new(),
        });
        self.imported.insert(texture, handle);
        handle
    }

    /// Allocate a graph-owned texture at graph level
    pub fn create_transient(&mut self, desc: TextureDesc) -> FrameResourceHandle {
        let handle = FrameResourceHandle(self.resources.len() as u32);
        self.resources.push(ResourceEntry {
            origin: ResourceOrigin::Transient { desc },
            events: Vec::new(),
        });
        handle
    }

    fn record_access(
        &mut self,
        pass: usize,
        resource: FrameResourceHandle,
        state: ResourceState,
        write: bool,
    ) {
        if let Some(entry) = self.resources.get_mut(resource.index()) {
            entry.events.push(AccessEvent { pass, state, write });
        }
        if let Some(entry) = self.passes.get_mut(pass) {
            entry.accesses.push((resource, state, write));
        }
    }

    /// Add a pass
    ///
    /// `setup` declares resource accesses and returns the pass's data;
    /// `execute` records commands once the schedule reaches the pass. A
    /// pass that declares no accesses still runs, ordered only by
    /// declaration.
    pub fn add_pass<T, Setup, Exec>(&mut self, name: &str, setup: Setup, execute: Exec)
    where
        T: 'static,
        Setup: FnOnce(&mut PassBuilder) -> T,
        Exec: FnOnce(&T, &FrameResources, &mut CommandContext) + 'static,
    {
        let pass = self.passes.len();
        self.passes.push(PassEntry {
            name: name.to_string(),
            data: Box::new(()),
            exec: None,
            accesses: Vec::new(),
        });

        let data = setup(&mut PassBuilder { graph: self, pass });

        let entry = &mut self.passes[pass];
        entry.data = Box::new(data);
        entry.exec = Some(Box::new(
            move |data: &dyn Any, resources: &FrameResources, ctx: &mut CommandContext| {
                if let Some(data) = data.downcast_ref::<T>() {
                    execute(data, resources, ctx);
                }
            },
        ));
    }

    /// Number of registered passes
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Derive the execution schedule from per-resource event lists
    ///
    /// Edges: each writer precedes the readers after it, and each reader
    /// precedes the next writer. Kahn's algorithm with a min-heap keyed
    /// on declaration index keeps independent passes in declaration
    /// order.
    fn compile(&self) -> Result<Vec<usize>, FrameGraphError> {
        let pass_count = self.passes.len();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); pass_count];
        let mut in_degree = vec![0usize; pass_count];

        let mut add_edge = |from: usize, to: usize, edges: &mut Vec<Vec<usize>>| {
            if from != to && !edges[from].contains(&to) {
                edges[from].push(to);
                in_degree[to] += 1;
            }
        };

        for entry in &self.resources {
            let transient = matches!(entry.origin, ResourceOrigin::Transient { .. });
            let mut last_writer: Option<usize> = None;
            let mut readers_since_write: Vec<usize> = Vec::new();
            // A transient has no pre-frame contents, so a read declared
            // ahead of its first write consumes that writer's output
            // rather than an initial version. Binding those reads to the
            // producer makes a mutual read/write pair show up as a cycle.
            let mut early_readers: Vec<usize> = Vec::new();
            for event in &entry.events {
                if event.write {
                    if let Some(writer) = last_writer {
                        add_edge(writer, event.pass, &mut edges);
                    }
                    for reader in readers_since_write.drain(..) {
                        add_edge(reader, event.pass, &mut edges);
                    }
                    if last_writer.is_none() && transient {
                        for &reader in &early_readers {
                            add_edge(event.pass, reader, &mut edges);
                        }
                        // They read this writer's output, so they also
                        // precede any later writer
                        readers_since_write.append(&mut early_readers);
                    }
                    last_writer = Some(event.pass);
                } else if let Some(writer) = last_writer {
                    add_edge(writer, event.pass, &mut edges);
                    readers_since_write.push(event.pass);
                } else if transient {
                    early_readers.push(event.pass);
                } else {
                    readers_since_write.push(event.pass);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..pass_count)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(pass_count);

        while let Some(Reverse(pass)) = ready.pop() {
            order.push(pass);
            for &next in &edges[pass] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != pass_count {
            // Any pass with remaining in-degree sits on a cycle
            let stuck = (0..pass_count)
                .find(|&i| in_degree[i] > 0)
                .map(|i| self.passes[i].name.clone())
                .unwrap_or_default();
            return Err(FrameGraphError::CyclicDependency(stuck));
        }
        Ok(order)
    }

    /// Compile, allocate, record, and submit the frame
    ///
    /// Transients with disjoint pass lifetimes share physical textures.
    /// All transient allocations are returned to the device once the
    /// submission is recorded; imported resources keep their final state.
    pub fn execute(mut self, device: &mut RenderDevice) -> Result<SubmitInfo, FrameGraphError> {
        let order = self.compile()?;
        debug!("frame graph: {} passes scheduled", order.len());

        // Transient lifetime in schedule positions
        let mut first_use = vec![usize::MAX; self.resources.len()];
        let mut last_use = vec![0usize; self.resources.len()];
        for (position, &pass) in order.iter().enumerate() {
            for &(resource, _, _) in &self.passes[pass].accesses {
                let i = resource.index();
                first_use[i] = first_use[i].min(position);
                last_use[i] = last_use[i].max(position);
            }
        }

        let mut physical: Vec<TextureHandle> = Vec::with_capacity(self.resources.len());
        for entry in &self.resources {
            physical.push(match &entry.origin {
                ResourceOrigin::Imported { texture, .. } => *texture,
                ResourceOrigin::Transient { .. } => TextureHandle::invalid(),
            });
        }

        // Tracked state per physical texture for barrier insertion
        let mut tracked: HashMap<TextureHandle, ResourceState> = HashMap::new();
        for entry in &self.resources {
            if let ResourceOrigin::Imported { texture, state } = entry.origin {
                tracked.insert(texture, state);
            }
        }

        let mut pool: Vec<(TextureDesc, TextureHandle)> = Vec::new();
        let mut owned: Vec<TextureHandle> = Vec::new();
        let mut ctx = CommandContext::new();

        for (position, &pass) in order.iter().enumerate() {
            // Materialize transients first used here, aliasing freed ones
            for (i, entry) in self.resources.iter().enumerate() {
                let ResourceOrigin::Transient { desc } = &entry.origin else {
                    continue;
                };
                if first_use[i] != position {
                    continue;
                }
                let texture = match pool.iter().position(|(d, _)| d == desc) {
                    Some(slot) => {
                        let (_, texture) = pool.swap_remove(slot);
                        trace!("aliasing transient {} onto {:?}", i, texture);
                        texture
                    }
                    None => {
                        let texture = device.create_texture(*desc)?;
                        owned.push(texture);
                        tracked.insert(texture, ResourceState::Common);
                        texture
                    }
                };
                physical[i] = texture;
            }

            // Barriers for every access whose state differs from tracked
            let accesses = self.passes[pass].accesses.clone();
            for (resource, state, _) in &accesses {
                let texture = physical[resource.index()];
                if !texture.is_valid() {
                    return Err(FrameGraphError::UnknownResource(resource.0));
                }
                let current = tracked.get(&texture).copied().unwrap_or(ResourceState::Common);
                if current != *state {
                    ctx.texture_barrier(texture, current, *state);
                    tracked.insert(texture, *state);
                }
            }

            let entry = &mut self.passes[pass];
            trace!("executing pass '{}'", entry.name);
            let resources = FrameResources {
                textures: physical.clone(),
            };
            if let Some(exec) = entry.exec.take() {
                exec(entry.data.as_ref(), &resources, &mut ctx);
            }

            // Return transients whose last use just retired to the pool
            for (i, entry) in self.resources.iter().enumerate() {
                if let ResourceOrigin::Transient { desc } = &entry.origin {
                    if last_use[i] == position && first_use[i] != usize::MAX {
                        pool.push((*desc, physical[i]));
                    }
                }
            }
        }

        let info = device.submit(ctx)?;
        for texture in owned {
            device.destroy_texture(texture)?;
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RendererConfig;
    use crate::gpu::resources::{TextureFormat, TextureUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn device() -> RenderDevice {
        RenderDevice::new(&RendererConfig::default())
    }

    fn target_desc() -> TextureDesc {
        TextureDesc::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        )
    }

    /// Record the order passes actually executed in
    fn order_probe(log: &Arc<std::sync::Mutex<Vec<&'static str>>>, name: &'static str)
    -> impl FnOnce(&(), &FrameResources, &mut CommandContext) + 'static {
        let log = Arc::clone(log);
        move |_, _, _| log.lock().unwrap().push(name)
    }

    #[test]
    fn test_writer_precedes_reader() {
        let mut device = device();
        let mut graph = FrameGraph::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut first = None;
        graph.add_pass(
            "producer",
            |builder| {
                let t = builder.create_transient(target_desc());
                builder.write(t, ResourceState::RenderTarget);
                first = Some(t);
            },
            order_probe(&log, "producer"),
        );
        let t = first.expect("transient created in setup");

        graph.add_pass(
            "consumer",
            |builder| {
                builder.read(t, ResourceState::ShaderResource);
            },
            order_probe(&log, "consumer"),
        );

        graph.execute(&mut device).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["producer", "consumer"]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let mut device = device();
        let mut graph = FrameGraph::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        graph.add_pass("a", |_| (), order_probe(&log, "a"));
        graph.add_pass("b", |_| (), order_probe(&log, "b"));
        graph.add_pass("c", |_| (), order_probe(&log, "c"));

        graph.execute(&mut device).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut device = device();
        let mut graph = FrameGraph::new();

        let mut handles = (None, None);
        graph.add_pass(
            "first",
            |builder| {
                let a = builder.create_transient(target_desc());
                let b = builder.create_transient(target_desc());
                handles = (Some(a), Some(b));
                builder.read(b, ResourceState::ShaderResource);
                builder.write(a, ResourceState::RenderTarget);
            },
            |_: &(), _, _| {},
        );
        let (a, b) = (handles.0.unwrap(), handles.1.unwrap());
        graph.add_pass(
            "second",
            |builder| {
                builder.read(a, ResourceState::ShaderResource);
                builder.write(b, ResourceState::RenderTarget);
            },
            |_: &(), _, _| {},
        );

        assert!(matches!(
            graph.execute(&mut device),
            Err(FrameGraphError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_read_declared_before_write_binds_to_producer() {
        // A transient has no initial contents, so a consumer declared
        // ahead of the producer still runs after it
        let mut device = device();
        let mut graph = FrameGraph::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let t = graph.create_transient(target_desc());
        graph.add_pass(
            "consumer",
            |builder| builder.read(t, ResourceState::ShaderResource),
            order_probe(&log, "consumer"),
        );
        graph.add_pass(
            "producer",
            |builder| builder.write(t, ResourceState::RenderTarget),
            order_probe(&log, "producer"),
        );

        graph.execute(&mut device).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["producer", "consumer"]);
    }

    #[test]
    fn test_barrier_inserted_between_write_and_read() {
        let mut device = device();
        let target = device.create_texture(target_desc()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut graph = FrameGraph::new();
        let c = Arc::clone(&counter);
        graph.add_pass(
            "draw",
            |builder| builder.import_texture(target, ResourceState::Common),
            move |_, _, _| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        // Same texture, deduplicated import
        graph.add_pass(
            "draw_into",
            |builder| {
                let t = builder.import_texture(target, ResourceState::Common);
                builder.write(t, ResourceState::RenderTarget);
                t
            },
            |_, _, _| {},
        );
        graph.add_pass(
            "sample",
            |builder| {
                let t = builder.import_texture(target, ResourceState::Common);
                builder.read(t, ResourceState::ShaderResource);
                t
            },
            |_, _, _| {},
        );

        graph.execute(&mut device).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // Device tracked both transitions: Common -> RenderTarget -> ShaderResource
        assert_eq!(
            device.texture_state(target),
            Ok(ResourceState::ShaderResource)
        );
    }

    #[test]
    fn test_disjoint_transients_alias() {
        // Budget fits exactly one 64x64 RGBA target; the second transient
        // only fits if it aliases the first one's memory
        let mut device = RenderDevice::new(&RendererConfig {
            memory_budget: 16 * 1024,
            ..RendererConfig::default()
        });

        let mut graph = FrameGraph::new();
        let mut first = None;
        graph.add_pass(
            "pass_a",
            |builder| {
                let t = builder.create_transient(target_desc());
                builder.write(t, ResourceState::RenderTarget);
                first = Some(t);
            },
            |_: &(), _, _| {},
        );
        let a = first.unwrap();
        graph.add_pass(
            "pass_b",
            |builder| {
                // a's last use; its memory is free for later transients
                builder.read(a, ResourceState::ShaderResource);
            },
            |_: &(), _, _| {},
        );
        let mut second = None;
        graph.add_pass(
            "pass_c",
            |builder| {
                let t = builder.create_transient(target_desc());
                builder.write(t, ResourceState::RenderTarget);
                second = Some(t);
            },
            |_: &(), _, _| {},
        );
        let b = second.unwrap();
        graph.add_pass(
            "pass_d",
            |builder| {
                builder.read(b, ResourceState::ShaderResource);
            },
            |_: &(), _, _| {},
        );

        graph.execute(&mut device).unwrap();
        assert_eq!(device.memory_used(), 0);
    }

    #[test]
    fn test_pass_data_reaches_execute() {
        let mut device = device();
        let mut graph = FrameGraph::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&seen);

        graph.add_pass(
            "with_data",
            |_| 42usize,
            move |data: &usize, _, _| {
                probe.store(*data, Ordering::SeqCst);
            },
        );
        graph.execute(&mut device).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_commands_recorded_in_schedule_order() {
        let mut device = device();
        let target = device.create_texture(target_desc()).unwrap();

        let mut graph = FrameGraph::new();
        graph.add_pass(
            "clear",
            |builder| {
                let t = builder.import_texture(target, ResourceState::Common);
                builder.write(t, ResourceState::RenderTarget);
                t
            },
            |t: &FrameResourceHandle, resources, ctx| {
                ctx.clear_target(resources.texture(*t), [0.0; 4]);
            },
        );

        let info = graph.execute(&mut device).unwrap();
        // One barrier plus one clear
        assert_eq!(info.command_count, 2);
    }
}
