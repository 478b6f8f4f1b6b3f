//! Dummy device for testing and development.
//!
//! This device doesn't perform actual GPU operations. It keeps every submitted
//! command buffer, counts presents and placeholder frames, and synthesizes
//! monotonically increasing timestamps so the whole engine can run headless.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::command::CommandBuffer;
use crate::error::DeviceError;
use crate::profiling::TimestampSample;
use crate::render_graph::{DescriptorKind, RenderGraph, ResourceDescriptor};

use super::{GpuBuffer, GpuSampler, GpuTexture, RenderDevice};

/// Counters shared between the device and the factories it registers.
#[derive(Debug, Default)]
pub struct DummyStats {
    next_object: AtomicU64,
    textures_created: AtomicUsize,
    buffers_created: AtomicUsize,
    samplers_created: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    realized_names: Mutex<Vec<String>>,
}

impl DummyStats {
    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::SeqCst)
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::SeqCst)
    }

    pub fn samplers_created(&self) -> usize {
        self.samplers_created.load(Ordering::SeqCst)
    }

    /// Names passed to the factories, in realization order.
    pub fn realized_names(&self) -> Vec<String> {
        self.realized_names.lock().clone()
    }

    /// How many times the resource named `name` was constructed.
    pub fn realizations_of(&self, name: &str) -> usize {
        self.realized_names
            .lock()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    fn begin_create(&self, name: &str) -> Result<u64, DeviceError> {
        if self.failing.lock().contains(name) {
            log::trace!("DummyDevice: simulating out of memory for '{name}'");
            return Err(DeviceError::OutOfMemory);
        }
        self.realized_names.lock().push(name.to_string());
        Ok(self.next_object.fetch_add(1, Ordering::SeqCst))
    }
}

/// Dummy device.
#[derive(Debug)]
pub struct DummyDevice {
    capacity: usize,
    stats: Arc<DummyStats>,
    submitted: Vec<CommandBuffer>,
    pending_timestamps: Vec<TimestampSample>,
    clock: u64,
    presents: usize,
    placeholders: usize,
    fail_submission: bool,
}

impl DummyDevice {
    /// Create a dummy device reporting `capacity` parallel recording contexts.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stats: Arc::new(DummyStats::default()),
            submitted: Vec::new(),
            pending_timestamps: Vec::new(),
            clock: 0,
            presents: 0,
            placeholders: 0,
            fail_submission: false,
        }
    }

    pub fn stats(&self) -> &Arc<DummyStats> {
        &self.stats
    }

    /// Make realization of the resource named `name` fail with out of memory.
    pub fn fail_realization_of(&self, name: &str) {
        self.stats.failing.lock().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.stats.failing.lock().clear();
    }

    /// Make every following submission fail.
    pub fn set_fail_submission(&mut self, fail: bool) {
        self.fail_submission = fail;
    }

    /// Register texture, buffer and sampler factories on `graph`.
    pub fn register_factories(&self, graph: &mut RenderGraph) {
        let stats = Arc::clone(&self.stats);
        graph.register_factory(DescriptorKind::Texture, move |name, desc| {
            let ResourceDescriptor::Texture(desc) = desc else {
                return Err(DeviceError::ResourceCreationFailed(format!(
                    "'{name}' is not a texture descriptor"
                )));
            };
            let id = stats.begin_create(name)?;
            stats.textures_created.fetch_add(1, Ordering::SeqCst);
            log::trace!(
                "DummyDevice: creating texture '{name}' ({}x{})",
                desc.width,
                desc.height
            );
            Ok(GpuTexture {
                id,
                width: desc.width,
                height: desc.height,
                format: desc.format,
            })
        });

        let stats = Arc::clone(&self.stats);
        graph.register_factory(DescriptorKind::Buffer, move |name, desc| {
            let ResourceDescriptor::Buffer(desc) = desc else {
                return Err(DeviceError::ResourceCreationFailed(format!(
                    "'{name}' is not a buffer descriptor"
                )));
            };
            let id = stats.begin_create(name)?;
            stats.buffers_created.fetch_add(1, Ordering::SeqCst);
            log::trace!("DummyDevice: creating buffer '{name}' (size: {})", desc.size);
            Ok(GpuBuffer {
                id,
                size: desc.size,
            })
        });

        let stats = Arc::clone(&self.stats);
        graph.register_factory(DescriptorKind::Sampler, move |name, desc| {
            let ResourceDescriptor::Sampler(desc) = desc else {
                return Err(DeviceError::ResourceCreationFailed(format!(
                    "'{name}' is not a sampler descriptor"
                )));
            };
            let id = stats.begin_create(name)?;
            stats.samplers_created.fetch_add(1, Ordering::SeqCst);
            Ok(GpuSampler {
                id,
                filter: desc.filter,
            })
        });
    }

    /// Every buffer submitted so far, in submission order.
    pub fn submitted(&self) -> &[CommandBuffer] {
        &self.submitted
    }

    /// Labels of submitted buffers, in submission order.
    pub fn submitted_labels(&self) -> Vec<&str> {
        self.submitted.iter().map(CommandBuffer::label).collect()
    }

    pub fn clear_submitted(&mut self) {
        self.submitted.clear();
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    pub fn placeholder_frames(&self) -> usize {
        self.placeholders
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new(4)
    }
}

impl RenderDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy Device"
    }

    fn parallel_recording_capacity(&self) -> usize {
        self.capacity
    }

    fn submit(&mut self, buffer: CommandBuffer) -> Result<(), DeviceError> {
        if self.fail_submission {
            return Err(DeviceError::SubmissionFailed(buffer.label().to_string()));
        }
        // Every command takes one tick
        for (query, point) in buffer.timestamps().collect::<Vec<_>>() {
            self.clock += 1;
            self.pending_timestamps.push(TimestampSample {
                query,
                point,
                ticks: self.clock,
            });
        }
        self.clock += buffer.len() as u64;
        log::trace!(
            "DummyDevice: submitted '{}' ({} commands)",
            buffer.label(),
            buffer.len()
        );
        self.submitted.push(buffer);
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.presents += 1;
        Ok(())
    }

    fn submit_placeholder(&mut self) -> Result<(), DeviceError> {
        self.placeholders += 1;
        Ok(())
    }

    fn resolve_timestamps(&mut self) -> Vec<TimestampSample> {
        std::mem::take(&mut self.pending_timestamps)
    }
}
