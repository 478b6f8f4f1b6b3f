//! Headless demo: runs the deferred pipeline on the dummy device and prints
//! per-frame reports.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example headless -- --frames 5 --drawables 2000 --dot graph.dot
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glam::Vec3;

use frame_graph::device::DummyDevice;
use frame_graph::pipeline::{build_deferred_graph, DeferredConfig};
use frame_graph::scene::{Camera, Drawable, FrameScene, Light, MaterialId, MeshId};
use frame_graph::render_graph::to_dot;
use frame_graph::{RenderGraph, Renderer, RendererConfig};

/// Frame graph headless demo.
#[derive(Parser, Debug)]
#[command(
    name = "headless",
    about = "Runs the deferred pipeline on a dummy device",
    version
)]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value = "5")]
    frames: u32,

    /// Number of drawables in the scene.
    #[arg(long, default_value = "1000")]
    drawables: u32,

    /// Number of distinct materials.
    #[arg(long, default_value = "8")]
    materials: u32,

    /// Recording workers (defaults to the device capacity).
    #[arg(long)]
    workers: Option<usize>,

    /// Disable the bloom pass after the first frame.
    #[arg(long)]
    no_bloom: bool,

    /// Write the compiled graph in Graphviz DOT format to this path.
    #[arg(long)]
    dot: Option<PathBuf>,
}

fn build_scene(drawables: u32, materials: u32, frame: u32) -> FrameScene {
    let angle = frame as f32 * 0.1;
    let camera = Camera::looking_at(Vec3::new(angle.sin() * 10.0, 4.0, angle.cos() * 10.0), Vec3::ZERO);
    let lights = vec![
        Light::directional(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 3.0),
        Light::point(Vec3::new(0.0, 3.0, 0.0), Vec3::new(1.0, 0.6, 0.3), 20.0, 15.0),
    ];
    let drawables = (0..drawables)
        .map(|i| Drawable::new(MeshId(i % 64), MaterialId(i % materials.max(1))))
        .collect();

    let mut scene = FrameScene::new();
    scene.refresh(vec![camera], lights, drawables);
    scene
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    frame_graph::init();

    let args = Args::parse();

    let device = DummyDevice::new(4);
    let mut graph = RenderGraph::new();
    device.register_factories(&mut graph);
    let pipeline = build_deferred_graph(&mut graph, &DeferredConfig::default())?;

    let config = RendererConfig {
        worker_threads: args.workers,
        abort_on_frame_error: true,
        gpu_profiling: true,
        log_compiled_order: true,
    };
    let mut renderer = Renderer::new(device, graph, config);
    renderer.prepare()?;

    for frame in 0..args.frames {
        let scene = build_scene(args.drawables, args.materials, frame);
        pipeline.update_scene(renderer.graph_mut(), Arc::new(scene))?;
        if frame == 1 && args.no_bloom {
            pipeline.set_bloom_enabled(renderer.graph_mut(), false)?;
        }

        let report = renderer.render_frame()?;
        println!(
            "frame {}: {} submitted, {} pending, {} failed, {} buffers, cpu {:?}",
            report.frame_index,
            report.submitted_passes(),
            report.pending_passes(),
            report.failed_passes(),
            report.buffers_submitted,
            report.cpu_time()
        );
        for pass in &report.passes {
            println!(
                "    {:<14} {:?} on {:?} ({:?})",
                pass.name, pass.status, pass.thread, pass.cpu_time
            );
        }
        for timing in &report.gpu_timings {
            println!(
                "    gpu {:<20} {:?} x{}",
                timing.label, timing.duration, timing.samples
            );
        }
    }

    if let Some(path) = &args.dot {
        let graph = renderer.graph();
        std::fs::write(path, to_dot(graph, graph.compiled()))?;
        println!("Wrote {}", path.display());
    }

    let device = renderer.shutdown();
    println!(
        "{} presents, {} textures, {} buffers created",
        device.presents(),
        device.stats().textures_created(),
        device.stats().buffers_created()
    );
    Ok(())
}
