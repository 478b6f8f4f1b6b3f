//! Pass nodes of the render graph

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::PassError;
use crate::render_graph::context::PassContext;
use crate::render_graph::resource::ResourceId;

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw declaration index.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Where a pass's execute callback records its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    /// On the primary thread, submitted as soon as the callback returns.
    #[default]
    Inline,
    /// On a worker thread into a deferred recording context.
    Deferred,
}

/// Where a live pass stopped in a frame, as kept in a
/// [`FrameReport`](crate::render_graph::FrameReport).
///
/// Resources are realized for the whole frame before any pass records, and a
/// frame that fails there or at device submission yields no report. Every
/// reported pass has therefore recorded and ends in one of these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Gated on state that is not ready yet; nothing was submitted.
    Pending,
    /// The pass's command buffers reached the primary queue.
    Submitted,
    /// The execute callback failed or panicked.
    Failed,
}

/// Kind of access a pass declares on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Create,
}

/// One declared access, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub kind: AccessKind,
}

pub(crate) type ExecuteFn =
    Box<dyn Fn(&mut PassContext<'_>) -> Result<(), PassError> + Send + Sync>;

/// Metadata and callbacks of a pass in the graph
pub struct PassNode {
    name: String,
    accesses: Vec<ResourceAccess>,
    record_mode: RecordMode,
    cull_immune: bool,
    enabled: bool,
    data: Arc<dyn Any + Send + Sync>,
    execute: ExecuteFn,
}

impl PassNode {
    pub(crate) fn new(
        name: String,
        accesses: Vec<ResourceAccess>,
        record_mode: RecordMode,
        data: Arc<dyn Any + Send + Sync>,
        execute: ExecuteFn,
    ) -> Self {
        Self {
            name,
            accesses,
            record_mode,
            cull_immune: false,
            enabled: true,
            data,
            execute,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All accesses in declaration order.
    pub fn accesses(&self) -> &[ResourceAccess] {
        &self.accesses
    }

    fn resources_with(&self, kind: AccessKind) -> impl Iterator<Item = ResourceId> + '_ {
        self.accesses
            .iter()
            .filter(move |a| a.kind == kind)
            .map(|a| a.resource)
    }

    pub fn reads(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources_with(AccessKind::Read)
    }

    pub fn writes(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources_with(AccessKind::Write)
    }

    pub fn creates(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources_with(AccessKind::Create)
    }

    /// True if the pass declared any access to `resource`.
    pub fn accesses_resource(&self, resource: ResourceId) -> bool {
        self.accesses.iter().any(|a| a.resource == resource)
    }

    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    pub fn is_cull_immune(&self) -> bool {
        self.cull_immune
    }

    pub(crate) fn set_cull_immune(&mut self, cull_immune: bool) {
        self.cull_immune = cull_immune;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn data(&self) -> &(dyn Any + Send + Sync) {
        self.data.as_ref()
    }

    pub(crate) fn execute(&self, ctx: &mut PassContext<'_>) -> Result<(), PassError> {
        (self.execute)(ctx)
    }
}

impl fmt::Debug for PassNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassNode")
            .field("name", &self.name)
            .field("accesses", &self.accesses)
            .field("record_mode", &self.record_mode)
            .field("cull_immune", &self.cull_immune)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
