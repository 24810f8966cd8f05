//! World renderer pass chain

use bytemuck::cast_slice;
use log::debug;
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::framegraph::{FrameGraph, FrameGraphError, FrameResourceHandle};
use crate::gpu::device::{GpuError, RenderDevice, SubmitInfo};
use crate::gpu::pso::{PipelineRegistry, PsoDesc, PsoId};
use crate::gpu::resources::{
    BufferDesc, BufferHandle, BufferUsage, ResourceState, TextureDesc, TextureFormat,
    TextureHandle, TextureUsage,
};
use crate::renderer::gbuffer::GBuffer;
use crate::renderer::lights::{light_map_size, GpuPointLight};
use crate::scene::camera::Camera;
use crate::scene::registry::{SceneError, SceneRegistry};
use crate::transform::{TransformError, TransformGraph};

/// Depth pre-pass pipeline
pub const PSO_DEPTH_PREPASS: PsoId = PsoId("depth_prepass");
/// G-buffer fill pipeline
pub const PSO_GBUFFER: PsoId = PsoId("gbuffer_fill");
/// Tiled light gathering compute pipeline
pub const PSO_LIGHT_GATHER: PsoId = PsoId("light_gather");
/// Deferred shading pipeline
pub const PSO_DEFERRED_SHADE: PsoId = PsoId("deferred_shade");
/// Forward pipeline for transparents
pub const PSO_FORWARD_TRANSPARENT: PsoId = PsoId("forward_transparent");

/// Mesh GUID of the shared fullscreen triangle
const FULLSCREEN_TRIANGLE: u64 = 0;

/// Largest light count the light buffer holds per frame
const MAX_POINT_LIGHTS: usize = 1024;

/// World rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    /// Device-level failure
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Frame graph compilation or execution failure
    #[error(transparent)]
    Graph(#[from] FrameGraphError),

    /// Scene query failure
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Transform graph failure resolving a light or entity node
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Draw list and readiness captured at frame-build time
#[derive(Debug, Clone)]
struct RasterPassData {
    targets: Vec<FrameResourceHandle>,
    depth: Option<FrameResourceHandle>,
    pso: PsoId,
    ready: bool,
    meshes: Vec<u64>,
}

/// Renders the world through the deferred pass chain
pub struct WorldRenderer {
    gbuffer: GBuffer,
    light_map: TextureHandle,
    light_buffer: BufferHandle,
    output: TextureHandle,
    light_buffer_state: ResourceState,
    width: u32,
    height: u32,
}

impl WorldRenderer {
    /// Create the renderer, allocating persistent targets and queueing
    /// every pipeline for asynchronous compilation
    ///
    /// Construction never waits on the compiles; the first frames simply
    /// skip passes whose pipeline is still loading.
    pub fn new(
        device: &mut RenderDevice,
        pipelines: &mut PipelineRegistry,
        config: &RendererConfig,
    ) -> Result<Self, RenderError> {
        pipelines.register(PSO_DEPTH_PREPASS, PsoDesc::depth_only("vs_depth"));
        pipelines.register(PSO_GBUFFER, PsoDesc::raster("vs_world", "ps_gbuffer"));
        pipelines.register(PSO_LIGHT_GATHER, PsoDesc::compute("cs_light_gather"));
        pipelines.register(PSO_DEFERRED_SHADE, PsoDesc::raster("vs_fullscreen", "ps_shade"));
        pipelines.register(
            PSO_FORWARD_TRANSPARENT,
            PsoDesc::raster("vs_world", "ps_forward").with_blend(),
        );

        let gbuffer = GBuffer::new(device, config.width, config.height)?;
        let (tiles_x, tiles_y) = light_map_size(config.width, config.height);
        let light_map = device.create_texture(TextureDesc::new_2d(
            tiles_x,
            tiles_y,
            TextureFormat::Rg32Uint,
            TextureUsage::STORAGE | TextureUsage::SAMPLED,
        ))?;
        let light_buffer = device.create_buffer(BufferDesc {
            size: MAX_POINT_LIGHTS * std::mem::size_of::<GpuPointLight>(),
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;
        let output = device.create_texture(TextureDesc::new_2d(
            config.width,
            config.height,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        ))?;

        Ok(Self {
            gbuffer,
            light_map,
            light_buffer,
            output,
            light_buffer_state: ResourceState::Common,
            width: config.width,
            height: config.height,
        })
    }

    /// Final shaded output target
    pub fn output(&self) -> TextureHandle {
        self.output
    }

    /// Persistent geometry buffer
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    fn add_raster_pass(graph: &mut FrameGraph, name: &str, data: RasterPassData) {
        graph.add_pass(
            name,
            move |builder| {
                for &target in &data.targets {
                    builder.write(target, ResourceState::RenderTarget);
                }
                if let Some(depth) = data.depth {
                    builder.write(depth, ResourceState::DepthWrite);
                }
                data
            },
            |data: &RasterPassData, resources, ctx| {
                if !data.ready {
                    debug!("pipeline {} not ready, skipping {} draws", data.pso, data.meshes.len());
                    return;
                }
                ctx.begin_pass(
                    data.targets.iter().map(|&t| resources.texture(t)).collect(),
                    data.depth.map(|d| resources.texture(d)),
                );
                ctx.bind_pipeline(data.pso);
                for &mesh in &data.meshes {
                    ctx.draw(mesh);
                }
                ctx.end_pass();
            },
        );
    }

    /// Cull, build the pass chain, and submit one frame
    pub fn render_world(
        &mut self,
        device: &mut RenderDevice,
        pipelines: &mut PipelineRegistry,
        scene: &SceneRegistry,
        transforms: &mut TransformGraph,
        camera: &Camera,
    ) -> Result<SubmitInfo, RenderError> {
        pipelines.poll();

        let visible = scene.compute_visible_set(transforms, camera)?;
        let mesh_list = |entities: &[crate::scene::registry::EntityHandle]| {
            entities
                .iter()
                .filter_map(|&e| {
                    let drawable = scene.drawable(e).ok()?;
                    scene.mesh_guid(drawable.mesh)
                })
                .collect::<Vec<u64>>()
        };
        let opaque = mesh_list(&visible.opaque);
        let transparent = mesh_list(&visible.transparent);

        let mut lights = Vec::new();
        for handle in scene.gather_point_lights(transforms, camera)? {
            let light = scene.point_light(handle)?;
            let position = transforms.world_position(light.node)?;
            lights.push(GpuPointLight::new(
                light.color.into(),
                light.intensity,
                position.into(),
                light.radius,
            ));
            if lights.len() == MAX_POINT_LIGHTS {
                break;
            }
        }
        debug!(
            "frame: {} opaque, {} transparent, {} lights",
            opaque.len(),
            transparent.len(),
            lights.len()
        );

        device.begin_frame()?;
        let mut graph = FrameGraph::new();

        // Persistent targets carry their state across frames, so imports
        // report whatever the device currently tracks
        let mut import = |graph: &mut FrameGraph, texture: TextureHandle| {
            device
                .texture_state(texture)
                .map(|state| graph.import_texture(texture, state))
        };
        let albedo = import(&mut graph, self.gbuffer.albedo)?;
        let normal = import(&mut graph, self.gbuffer.normal)?;
        let mria = import(&mut graph, self.gbuffer.mria)?;
        let depth = import(&mut graph, self.gbuffer.depth)?;
        let output = import(&mut graph, self.output)?;
        let light_map = import(&mut graph, self.light_map)?;

        // Clear pass owns the first write to every persistent target
        graph.add_pass(
            "clear",
            |builder| {
                for target in [albedo, normal, mria, output] {
                    builder.write(target, ResourceState::RenderTarget);
                }
                builder.write(depth, ResourceState::DepthWrite);
                [albedo, normal, mria, output, depth]
            },
            |targets: &[FrameResourceHandle; 5], resources, ctx| {
                for &t in &targets[..4] {
                    ctx.clear_target(resources.texture(t), [0.0, 0.0, 0.0, 0.0]);
                }
                ctx.clear_depth(resources.texture(targets[4]), 1.0);
            },
        );

        Self::add_raster_pass(
            &mut graph,
            "depth_prepass",
            RasterPassData {
                targets: Vec::new(),
                depth: Some(depth),
                pso: PSO_DEPTH_PREPASS,
                ready: pipelines.is_ready(PSO_DEPTH_PREPASS),
                meshes: opaque.clone(),
            },
        );

        Self::add_raster_pass(
            &mut graph,
            "gbuffer",
            RasterPassData {
                targets: vec![albedo, normal, mria],
                depth: Some(depth),
                pso: PSO_GBUFFER,
                ready: pipelines.is_ready(PSO_GBUFFER),
                meshes: opaque,
            },
        );

        // Light upload + tiled gather: one thread group per light map tile
        {
            let light_buffer = self.light_buffer;
            let buffer_state = self.light_buffer_state;
            let gather_ready = pipelines.is_ready(PSO_LIGHT_GATHER);
            let (tiles_x, tiles_y) = light_map_size(self.width, self.height);
            graph.add_pass(
                "light_gather",
                |builder| {
                    builder.read(depth, ResourceState::ShaderResource);
                    builder.write(light_map, ResourceState::UnorderedAccess);
                    lights
                },
                move |lights: &Vec<GpuPointLight>, _, ctx| {
                    ctx.buffer_barrier(light_buffer, buffer_state, ResourceState::CopyDest);
                    ctx.upload_buffer(light_buffer, 0, cast_slice(lights).to_vec());
                    ctx.buffer_barrier(
                        light_buffer,
                        ResourceState::CopyDest,
                        ResourceState::ShaderResource,
                    );
                    if gather_ready {
                        ctx.bind_pipeline(PSO_LIGHT_GATHER);
                        ctx.dispatch(tiles_x, tiles_y, 1);
                    } else {
                        debug!("pipeline {} not ready, skipping gather", PSO_LIGHT_GATHER);
                    }
                },
            );
        }

        // Deferred shading samples the G-buffer and light map
        {
            let ready = pipelines.is_ready(PSO_DEFERRED_SHADE);
            graph.add_pass(
                "deferred_shade",
                |builder| {
                    builder.read(albedo, ResourceState::ShaderResource);
                    builder.read(normal, ResourceState::ShaderResource);
                    builder.read(mria, ResourceState::ShaderResource);
                    builder.read(depth, ResourceState::ShaderResource);
                    builder.read(light_map, ResourceState::ShaderResource);
                    builder.write(output, ResourceState::RenderTarget);
                    output
                },
                move |output: &FrameResourceHandle, resources, ctx| {
                    if !ready {
                        debug!("pipeline {} not ready, skipping shade", PSO_DEFERRED_SHADE);
                        return;
                    }
                    ctx.begin_pass(vec![resources.texture(*output)], None);
                    ctx.bind_pipeline(PSO_DEFERRED_SHADE);
                    ctx.draw(FULLSCREEN_TRIANGLE);
                    ctx.end_pass();
                },
            );
        }

        // Transparents render forward on top of the shaded output,
        // testing against the pre-pass depth
        {
            let ready = pipelines.is_ready(PSO_FORWARD_TRANSPARENT);
            graph.add_pass(
                "forward_transparent",
                |builder| {
                    builder.read(light_map, ResourceState::ShaderResource);
                    builder.write(output, ResourceState::RenderTarget);
                    builder.write(depth, ResourceState::DepthWrite);
                    (output, depth, transparent)
                },
                move |(output, depth, meshes): &(
                    FrameResourceHandle,
                    FrameResourceHandle,
                    Vec<u64>,
                ),
                      resources,
                      ctx| {
                    if !ready || meshes.is_empty() {
                        return;
                    }
                    ctx.begin_pass(
                        vec![resources.texture(*output)],
                        Some(resources.texture(*depth)),
                    );
                    ctx.bind_pipeline(PSO_FORWARD_TRANSPARENT);
                    for &mesh in meshes {
                        ctx.draw(mesh);
                    }
                    ctx.end_pass();
                },
            );
        }

        let info = graph.execute(device)?;
        self.light_buffer_state = ResourceState::ShaderResource;
        device.end_frame(info.fence);
        Ok(info)
    }

    /// Release every persistent allocation
    pub fn destroy(self, device: &mut RenderDevice) -> Result<(), RenderError> {
        self.gbuffer.destroy(device)?;
        device.destroy_texture(self.light_map)?;
        device.destroy_texture(self.output)?;
        device.destroy_buffer(self.light_buffer)?;
        Ok(())
    }
}
