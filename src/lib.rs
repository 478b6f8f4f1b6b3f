//! Frame Graph - a render graph execution engine
//!
//! Rendering work is declared once as named passes that read, write and
//! create typed resources. Every frame the graph is compiled (only when its
//! shape changed), dead passes are culled, resources are realized on first
//! use and passes are recorded inline or on worker threads. Command buffers
//! reach the device strictly in compiled order.
//!
//! # Features
//! - Typed resource handles and lazily realized, factory-constructed resources
//! - Stable topological ordering, reachability culling and read validation
//! - Parallel deferred recording with ordered submission
//! - Greedy draw scheduling that balances items and minimizes material switches
//! - Cross-thread GPU timestamp profiling
//! - Runtime controls and pass toggles
//! - Graphviz export of the graph
//!
//! # Example
//!
//! ```
//! use frame_graph::device::DummyDevice;
//! use frame_graph::pipeline::{build_deferred_graph, DeferredConfig};
//! use frame_graph::{RenderGraph, Renderer, RendererConfig};
//!
//! let device = DummyDevice::new(4);
//! let mut graph = RenderGraph::new();
//! device.register_factories(&mut graph);
//! build_deferred_graph(&mut graph, &DeferredConfig::default()).unwrap();
//!
//! let mut renderer = Renderer::new(device, graph, RendererConfig::default());
//! let report = renderer.render_frame().unwrap();
//! assert_eq!(report.passes.last().map(|p| p.name.as_str()), Some("Present"));
//! ```

pub mod command;
pub mod controls;
pub mod device;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod profiling;
pub mod render_graph;
pub mod scene;
pub mod scheduler;
pub mod thread_pool;

pub use command::{Command, CommandBuffer, RecordingContext, RecordingThread};
pub use controls::Control;
pub use device::RenderDevice;
pub use engine::{Renderer, RendererConfig};
pub use error::{DeviceError, FrameError, GraphError, PassError, RealizeError};
pub use profiling::{GpuProfiler, GpuTiming};
pub use render_graph::{
    BufferDesc, CompiledGraph, DescriptorKind, FrameReport, GraphResource, PassBuilder,
    PassContext, PassHandle, PassStatus, RecordMode, RenderGraph, ResourceDescriptor,
    ResourceHandle, ResourceId, ResourceKind, SamplerDesc, TextureDesc, TextureFormat,
};
pub use scheduler::{DrawSchedule, DrawScheduler};
pub use thread_pool::WorkerPool;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the engine version. Call once after installing a logger.
pub fn init() {
    log::info!("frame-graph v{}", VERSION);
}
