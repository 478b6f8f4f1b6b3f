//! Context handed to execute callbacks.

use std::any::Any;

use crate::command::{CommandBuffer, RecordingContext, RecordingThread};
use crate::error::PassError;
use crate::profiling::{GpuProfiler, GpuScope};
use crate::render_graph::pass::{PassHandle, PassNode};
use crate::render_graph::resource::{ResourceHandle, ResourceRegistry};
use crate::scheduler::DrawSchedule;
use crate::thread_pool::WorkerPool;

/// Everything an execute callback may touch while recording one pass.
///
/// Resources are read-only here: they were realized on the primary thread
/// before any recording started. Commands go into the pass's own recording
/// context, which is deferred when the pass runs on a worker.
pub struct PassContext<'a> {
    pass: PassHandle,
    node: &'a PassNode,
    resources: &'a ResourceRegistry,
    pool: &'a WorkerPool,
    profiler: Option<&'a GpuProfiler>,
    frame_index: u64,
    recorder: RecordingContext,
    finished: Vec<CommandBuffer>,
    gpu_scope: Option<GpuScope>,
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(
        pass: PassHandle,
        node: &'a PassNode,
        resources: &'a ResourceRegistry,
        pool: &'a WorkerPool,
        profiler: Option<&'a GpuProfiler>,
        frame_index: u64,
        thread: RecordingThread,
    ) -> Self {
        let mut recorder = RecordingContext::new(node.name(), thread);
        let gpu_scope = profiler.map(|p| p.begin(&mut recorder, node.name()));
        Self {
            pass,
            node,
            resources,
            pool,
            profiler,
            frame_index,
            recorder,
            finished: Vec::new(),
            gpu_scope,
        }
    }

    pub fn pass(&self) -> PassHandle {
        self.pass
    }

    pub fn name(&self) -> &'a str {
        self.node.name()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Thread this pass is recording on.
    pub fn thread(&self) -> RecordingThread {
        self.recorder.thread()
    }

    /// Typed access to a realized resource this pass declared.
    pub fn get<T: Any>(&self, handle: ResourceHandle<T>) -> Result<&'a T, PassError> {
        if !self.node.accesses_resource(handle.id()) {
            return Err(PassError::UndeclaredAccess(
                self.resources.name(handle.id()).to_string(),
            ));
        }
        self.resources.get_realized::<T>(handle.id())
    }

    /// The pass's recording context.
    pub fn commands(&mut self) -> &mut RecordingContext {
        &mut self.recorder
    }

    pub fn pool(&self) -> &'a WorkerPool {
        self.pool
    }

    pub fn profiler(&self) -> Option<&'a GpuProfiler> {
        self.profiler
    }

    /// Record a draw schedule on the worker pool.
    ///
    /// Commands recorded so far are closed into their own buffer first, then
    /// one buffer per scheduled thread follows in thread order, and recording
    /// continues in a fresh context. Submission therefore preserves the order
    /// in which the callback issued work.
    pub fn record_draws(&mut self, schedule: &DrawSchedule) -> Result<usize, PassError> {
        let buffers = schedule.record_parallel(self.pool, self.node.name(), self.profiler)?;
        self.flush();
        let count = buffers.len();
        self.finished.extend(buffers);
        Ok(count)
    }

    fn flush(&mut self) {
        let fresh = RecordingContext::new(self.node.name(), self.recorder.thread());
        let previous = std::mem::replace(&mut self.recorder, fresh);
        if !previous.is_empty() {
            self.finished.push(previous.finish());
        }
    }

    /// Close the pass and return its command buffers in recording order.
    pub(crate) fn finish(mut self) -> Vec<CommandBuffer> {
        if let (Some(profiler), Some(scope)) = (self.profiler, self.gpu_scope.take()) {
            profiler.end(&mut self.recorder, scope);
        }
        self.flush();
        self.finished
    }
}
