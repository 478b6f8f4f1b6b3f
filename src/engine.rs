//! Main engine orchestrator

use crate::device::RenderDevice;
use crate::error::{FrameError, GraphError};
use crate::profiling::GpuProfiler;
use crate::render_graph::{FrameReport, RenderGraph};
use crate::thread_pool::WorkerPool;

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Recording workers; defaults to the device's parallel recording capacity
    pub worker_threads: Option<usize>,
    /// Return frame errors instead of showing a placeholder frame
    pub abort_on_frame_error: bool,
    /// Insert GPU timestamp queries around every pass
    pub gpu_profiling: bool,
    /// Log the pass order at info level after each compilation
    pub log_compiled_order: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            abort_on_frame_error: cfg!(debug_assertions),
            gpu_profiling: false,
            log_compiled_order: false,
        }
    }
}

/// Top-level frame driver.
///
/// Owns the device, the graph and the worker pool, and threads them through
/// every frame explicitly.
pub struct Renderer<D: RenderDevice> {
    device: D,
    graph: RenderGraph,
    pool: WorkerPool,
    profiler: Option<GpuProfiler>,
    config: RendererConfig,
    frame_index: u64,
}

impl<D: RenderDevice> Renderer<D> {
    pub fn new(device: D, graph: RenderGraph, config: RendererConfig) -> Self {
        let threads = config
            .worker_threads
            .unwrap_or_else(|| device.parallel_recording_capacity());
        let profiler = config
            .gpu_profiling
            .then(|| GpuProfiler::new(device.timestamp_period_ns()));
        log::info!(
            "Renderer on '{}' with {} recording workers{}",
            device.name(),
            threads.max(1),
            if profiler.is_some() { ", GPU profiling on" } else { "" }
        );
        Self {
            device,
            graph,
            pool: WorkerPool::new(threads),
            profiler,
            config,
            frame_index: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Mutable graph access, for toggles and external updates between frames.
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn profiler(&self) -> Option<&GpuProfiler> {
        self.profiler.as_ref()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Index of the next frame.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Compile the graph ahead of the first frame.
    pub fn prepare(&mut self) -> Result<(), GraphError> {
        self.compile_if_dirty()
    }

    fn compile_if_dirty(&mut self) -> Result<(), GraphError> {
        if !self.graph.is_dirty() {
            return Ok(());
        }
        self.graph.compile()?;
        if self.config.log_compiled_order {
            let order = self.graph.compiled_pass_names()?;
            log::info!("Pass order: {}", order.join(" -> "));
        }
        Ok(())
    }

    fn run_frame(&mut self) -> Result<FrameReport, FrameError> {
        let report = self.graph.execute(
            &mut self.device,
            &self.pool,
            self.profiler.as_ref(),
            self.frame_index,
        )?;
        self.device.present()?;
        Ok(report)
    }

    /// Render one frame.
    ///
    /// Compile errors are always returned. Realization and device errors are
    /// returned when `abort_on_frame_error` is set, otherwise the device
    /// shows a placeholder frame and the report says so.
    pub fn render_frame(&mut self) -> Result<FrameReport, FrameError> {
        crate::profile_scope!("render_frame");
        self.compile_if_dirty()?;

        let mut report = match self.run_frame() {
            Ok(report) => report,
            Err(err @ FrameError::Compile(_)) => return Err(err),
            Err(err) if self.config.abort_on_frame_error => {
                log::error!("Frame {} aborted: {}", self.frame_index, err);
                return Err(err);
            }
            Err(err) => {
                log::warn!(
                    "Frame {} failed, showing placeholder: {}",
                    self.frame_index,
                    err
                );
                self.device.submit_placeholder()?;
                FrameReport {
                    frame_index: self.frame_index,
                    placeholder: true,
                    ..FrameReport::default()
                }
            }
        };

        if let Some(profiler) = &self.profiler {
            profiler.resolve(&self.device.resolve_timestamps());
            report.gpu_timings = profiler.take_timings();
        }

        crate::frame_mark!();
        self.frame_index += 1;
        Ok(report)
    }

    /// Release graph-owned objects and hand the device back.
    pub fn shutdown(mut self) -> D {
        let released = self.graph.teardown();
        log::debug!("Renderer shut down, {released} resources released");
        self.device
    }
}
