//! Pass setup for the deferred pipeline.

use std::sync::Arc;

use crate::controls::Control;
use crate::device::{GpuBuffer, GpuTexture};
use crate::error::{GraphError, PassError};
use crate::render_graph::{
    BufferDesc, PassHandle, RenderGraph, ResourceDescriptor, ResourceHandle, StageDriver, StageView,
    StagedPrecompute, TextureDesc, TextureFormat,
};
use crate::scene::{CameraUniformData, FrameScene, GpuLightData};
use crate::scheduler::DrawScheduler;

use super::DeferredConfig;

/// The presentation target, owned by the windowing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backbuffer {
    pub width: u32,
    pub height: u32,
}

/// Bloom parameters, read fresh by the bloom pass every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub threshold: f32,
    /// Zero skips the blur entirely
    pub intensity: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            intensity: 0.3,
        }
    }
}

/// Handles of every pass the pipeline adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredPasses {
    pub ibl: PassHandle,
    pub geometry: PassHandle,
    pub lighting: PassHandle,
    pub skybox: PassHandle,
    pub bloom: PassHandle,
    pub present: PassHandle,
}

/// Handles returned by [`build_deferred_graph`].
#[derive(Debug, Clone)]
pub struct DeferredPipeline {
    pub scene: ResourceHandle<FrameScene>,
    pub backbuffer: ResourceHandle<Backbuffer>,
    pub hdr_output: ResourceHandle<GpuTexture>,
    pub passes: DeferredPasses,
    bloom: Control<BloomSettings>,
    ibl: StageView,
}

impl DeferredPipeline {
    /// Hand the graph this frame's scene snapshot.
    pub fn update_scene(&self, graph: &mut RenderGraph, scene: Arc<FrameScene>) -> Result<(), GraphError> {
        graph.set_external(self.scene, scene)
    }

    /// Enable or disable bloom. Changes the graph shape.
    pub fn set_bloom_enabled(&self, graph: &mut RenderGraph, enabled: bool) -> Result<(), GraphError> {
        graph.set_pass_enabled(self.passes.bloom, enabled)
    }

    pub fn bloom_settings(&self) -> &Control<BloomSettings> {
        &self.bloom
    }

    /// Progress of the image-based lighting precompute.
    pub fn ibl(&self) -> &StageView {
        &self.ibl
    }
}

#[derive(Clone)]
struct GeometryData {
    scene: ResourceHandle<FrameScene>,
    gbuffer: ResourceHandle<GpuTexture>,
    depth: ResourceHandle<GpuTexture>,
    camera: ResourceHandle<GpuBuffer>,
}

#[derive(Clone)]
struct LightingData {
    scene: ResourceHandle<FrameScene>,
    gbuffer: ResourceHandle<GpuTexture>,
    depth: ResourceHandle<GpuTexture>,
    irradiance: ResourceHandle<GpuTexture>,
    camera: ResourceHandle<GpuBuffer>,
    lights: ResourceHandle<GpuBuffer>,
    hdr: ResourceHandle<GpuTexture>,
}

#[derive(Clone)]
struct SkyboxData {
    irradiance: ResourceHandle<GpuTexture>,
    hdr: ResourceHandle<GpuTexture>,
    ibl: StageView,
}

#[derive(Clone)]
struct BloomData {
    hdr: ResourceHandle<GpuTexture>,
    blur: ResourceHandle<GpuTexture>,
    settings: Control<BloomSettings>,
}

#[derive(Clone)]
struct PresentData {
    hdr: ResourceHandle<GpuTexture>,
    backbuffer: ResourceHandle<Backbuffer>,
}

fn texture(width: u32, height: u32, format: TextureFormat) -> ResourceDescriptor {
    ResourceDescriptor::Texture(TextureDesc::new(width, height, format))
}

fn run_ibl_stage(
    driver: &StageDriver,
    irradiance: ResourceHandle<GpuTexture>,
    ctx: &mut crate::render_graph::PassContext<'_>,
) -> Result<(), PassError> {
    let Some(stage) = driver.current() else {
        return Ok(());
    };
    let target = ctx.get(irradiance)?;
    let groups = (target.width / 8).max(1);
    let commands = ctx.commands();
    commands.begin_pass(format!("IBL {stage}"));
    commands.dispatch(groups, groups, 6);
    commands.end_pass();
    driver.advance();
    Ok(())
}

/// Add the deferred pipeline to `graph`.
///
/// Declares the `Scene` and `Backbuffer` external slots and every pass. The
/// device must register texture and buffer factories before the first frame.
pub fn build_deferred_graph(
    graph: &mut RenderGraph,
    config: &DeferredConfig,
) -> Result<DeferredPipeline, GraphError> {
    let (width, height) = (config.width, config.height);
    let scene = graph.declare_external("Scene", Arc::new(FrameScene::new()))?;
    let backbuffer = graph.declare_external("Backbuffer", Arc::new(Backbuffer { width, height }))?;

    let (driver, ibl_view) = StagedPrecompute::new("IBL precompute", config.ibl_stages.clone());
    let (ibl, irradiance) = graph.add_callback_pass(
        "IblPrecompute",
        |builder| {
            builder.create::<GpuTexture>(
                "IrradianceMap",
                ResourceDescriptor::Texture(
                    TextureDesc::new(64, 64, TextureFormat::Rgba16Float).with_mip_levels(5),
                ),
            )
        },
        move |irradiance, ctx| run_ibl_stage(&driver, *irradiance, ctx),
    )?;

    let (geometry, geo) = graph.add_callback_pass(
        "Geometry",
        |builder| {
            builder.request_deferred_context();
            Ok(GeometryData {
                scene: builder.read(scene)?,
                gbuffer: builder.create("GBuffer", texture(width, height, TextureFormat::Rgba16Float))?,
                depth: builder.create("Depth", texture(width, height, TextureFormat::Depth32Float))?,
                camera: builder.create(
                    "CameraUniforms",
                    ResourceDescriptor::Buffer(BufferDesc::new(
                        std::mem::size_of::<CameraUniformData>() as u64,
                    )),
                )?,
            })
        },
        |data, ctx| {
            let scene = ctx.get(data.scene)?;
            let camera = scene.cameras().first().copied().unwrap_or_default();
            let uniforms = camera.uniform_data();

            let commands = ctx.commands();
            commands.write_buffer(data.camera.id(), bytemuck::bytes_of(&uniforms));
            commands.clear(data.gbuffer.id(), [0.0; 4]);
            commands.clear(data.depth.id(), [1.0, 0.0, 0.0, 0.0]);

            let schedule = DrawScheduler::schedule(scene.material_groups(), ctx.pool().num_threads());
            let buffers = ctx.record_draws(&schedule)?;
            log::trace!(
                "Geometry: {} draws over {} buffers",
                schedule.total_items(),
                buffers
            );
            Ok(())
        },
    )?;

    let max_lights = config.max_lights as usize;
    let (lighting, lit) = graph.add_callback_pass(
        "Lighting",
        |builder| {
            Ok(LightingData {
                scene: builder.read(scene)?,
                gbuffer: builder.read(geo.gbuffer)?,
                depth: builder.read(geo.depth)?,
                irradiance: builder.read(irradiance)?,
                camera: builder.read(geo.camera)?,
                lights: builder.create(
                    "LightBuffer",
                    ResourceDescriptor::Buffer(BufferDesc::new(
                        (max_lights * std::mem::size_of::<GpuLightData>()) as u64,
                    )),
                )?,
                hdr: builder.create("HDROutput", texture(width, height, TextureFormat::Rgba16Float))?,
            })
        },
        move |data, ctx| {
            let scene = ctx.get(data.scene)?;
            let lights: Vec<GpuLightData> = scene
                .lights()
                .iter()
                .take(max_lights)
                .map(|light| light.to_gpu_data())
                .collect();
            let hdr = ctx.get(data.hdr)?;
            let (x, y) = (hdr.width.div_ceil(16), hdr.height.div_ceil(16));

            let commands = ctx.commands();
            commands.write_buffer(data.lights.id(), bytemuck::cast_slice(&lights));
            commands.begin_pass("Lighting");
            for input in [data.gbuffer.id(), data.depth.id(), data.irradiance.id(), data.camera.id()] {
                commands.marker(format!("bind {input}"));
            }
            commands.dispatch(x, y, 1);
            commands.end_pass();
            Ok(())
        },
    )?;

    let (skybox, _) = graph.add_callback_pass(
        "Skybox",
        |builder| {
            Ok(SkyboxData {
                irradiance: builder.read(irradiance)?,
                hdr: builder.write(lit.hdr)?,
                ibl: ibl_view.clone(),
            })
        },
        |data, ctx| {
            data.ibl.require_complete()?;
            ctx.get(data.irradiance)?;
            let commands = ctx.commands();
            commands.begin_pass("Skybox");
            commands.marker(format!("sample {}", data.irradiance.id()));
            commands.marker(format!("target {}", data.hdr.id()));
            commands.dispatch(1, 1, 1);
            commands.end_pass();
            Ok(())
        },
    )?;

    let settings = Control::new(BloomSettings::default());
    let (bloom, _) = graph.add_callback_pass(
        "Bloom",
        |builder| {
            Ok(BloomData {
                blur: builder.create(
                    "BloomBlur",
                    texture((width / 2).max(1), (height / 2).max(1), TextureFormat::Rgba16Float),
                )?,
                hdr: builder.write(lit.hdr)?,
                settings: settings.clone(),
            })
        },
        |data, ctx| {
            let BloomSettings { threshold, intensity } = data.settings.get();
            if intensity <= 0.0 {
                ctx.commands().marker("bloom skipped");
                return Ok(());
            }
            let commands = ctx.commands();
            commands.begin_pass(format!("Bloom threshold={threshold} intensity={intensity}"));
            commands.blit(data.hdr.id(), data.blur.id());
            commands.dispatch(1, 1, 1);
            commands.blit(data.blur.id(), data.hdr.id());
            commands.end_pass();
            Ok(())
        },
    )?;
    if !config.enable_bloom {
        graph.set_pass_enabled(bloom, false)?;
    }

    let (present, _) = graph.add_callback_pass(
        "Present",
        |builder| {
            Ok(PresentData {
                hdr: builder.read(lit.hdr)?,
                backbuffer: builder.write(backbuffer)?,
            })
        },
        |data, ctx| {
            let target = ctx.get(data.backbuffer)?;
            let commands = ctx.commands();
            commands.marker(format!("present {}x{}", target.width, target.height));
            commands.blit(data.hdr.id(), data.backbuffer.id());
            Ok(())
        },
    )?;
    graph.set_cull_immune(present, true)?;
    graph.mark_frame_output(backbuffer)?;

    Ok(DeferredPipeline {
        scene,
        backbuffer,
        hdr_output: lit.hdr,
        passes: DeferredPasses {
            ibl,
            geometry,
            lighting,
            skybox,
            bloom,
            present,
        },
        bloom: settings,
        ibl: ibl_view,
    })
}
