//! Device collaborator interface.
//!
//! The graph never creates device objects or talks to a queue itself. It
//! realizes resources through factories the device registers, and hands
//! finished command buffers to a [`RenderDevice`] in compiled pass order.

mod dummy;

pub use dummy::{DummyDevice, DummyStats};

use crate::command::CommandBuffer;
use crate::error::DeviceError;
use crate::profiling::TimestampSample;
use crate::render_graph::{
    FilterMode, GraphResource, ResourceKind, TextureFormat,
};

/// The primary queue and presentation surface.
pub trait RenderDevice {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// How many deferred recording contexts can record at once.
    fn parallel_recording_capacity(&self) -> usize;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period_ns(&self) -> f32 {
        1.0
    }

    /// Submit one command buffer to the primary queue.
    fn submit(&mut self, buffer: CommandBuffer) -> Result<(), DeviceError>;

    /// Present the frame output.
    fn present(&mut self) -> Result<(), DeviceError>;

    /// Submit a black frame in place of a frame that failed.
    fn submit_placeholder(&mut self) -> Result<(), DeviceError>;

    /// Timestamps written by buffers submitted since the last call.
    fn resolve_timestamps(&mut self) -> Vec<TimestampSample> {
        Vec::new()
    }
}

/// A realized texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuTexture {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl GraphResource for GpuTexture {
    const KIND: ResourceKind = ResourceKind::Texture;
}

/// A realized buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuBuffer {
    pub id: u64,
    pub size: u64,
}

impl GraphResource for GpuBuffer {
    const KIND: ResourceKind = ResourceKind::Buffer;
}

/// A realized sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuSampler {
    pub id: u64,
    pub filter: FilterMode,
}

impl GraphResource for GpuSampler {
    const KIND: ResourceKind = ResourceKind::Sampler;
}
