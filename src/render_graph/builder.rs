//! Setup-time dependency declaration.

use std::any::Any;

use crate::error::GraphError;
use crate::render_graph::pass::{AccessKind, PassHandle, RecordMode, ResourceAccess};
use crate::render_graph::resource::{GraphResource, ResourceDescriptor, ResourceHandle, ResourceRegistry};

/// Declares what a pass reads, writes and creates.
///
/// A builder is bound to one pass and only exists while that pass's setup
/// callback runs. Every operation returns a typed handle meant to be stored in
/// the pass data for use by the execute callback.
pub struct PassBuilder<'a> {
    pass: PassHandle,
    name: &'a str,
    registry: &'a mut ResourceRegistry,
    accesses: Vec<ResourceAccess>,
    record_mode: RecordMode,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(pass: PassHandle, name: &'a str, registry: &'a mut ResourceRegistry) -> Self {
        Self {
            pass,
            name,
            registry,
            accesses: Vec::new(),
            record_mode: RecordMode::Inline,
        }
    }

    /// Handle of the pass being set up.
    pub fn pass(&self) -> PassHandle {
        self.pass
    }

    /// Name of the pass being set up.
    pub fn name(&self) -> &str {
        self.name
    }

    fn push(&mut self, resource: ResourceHandle<impl Any>, kind: AccessKind) {
        let access = ResourceAccess {
            resource: resource.id(),
            kind,
        };
        if !self.accesses.contains(&access) {
            self.accesses.push(access);
        }
    }

    /// Declare a read.
    ///
    /// Whether the resource actually has a producer is checked when the graph
    /// is compiled, since producers can be toggled off after setup.
    pub fn read<T: Any>(&mut self, resource: ResourceHandle<T>) -> Result<ResourceHandle<T>, GraphError> {
        self.registry.check_type::<T>(resource.id())?;
        self.registry.add_reader(resource.id(), self.pass);
        self.push(resource, AccessKind::Read);
        Ok(resource)
    }

    /// Declare a read of a resource looked up by name.
    pub fn read_named<T: Any>(&mut self, name: &str) -> Result<ResourceHandle<T>, GraphError> {
        let handle = self
            .registry
            .find_typed::<T>(name)
            .map_err(|err| match err {
                GraphError::UnknownResource(resource) => GraphError::UndeclaredResource {
                    pass: self.name.to_string(),
                    resource,
                },
                other => other,
            })?;
        self.read(handle)
    }

    /// Declare a write.
    ///
    /// Writes do not version the resource: the handle keeps pointing at the
    /// same node, and the pass is ordered after the previous writer and
    /// before any later reader.
    pub fn write<T: Any>(&mut self, resource: ResourceHandle<T>) -> Result<ResourceHandle<T>, GraphError> {
        self.registry.check_type::<T>(resource.id())?;
        self.registry.add_writer(resource.id(), self.pass);
        self.push(resource, AccessKind::Write);
        Ok(resource)
    }

    /// Create a new transient resource produced by this pass.
    pub fn create<T: GraphResource>(
        &mut self,
        name: &str,
        descriptor: ResourceDescriptor,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let handle = self.registry.declare_created::<T>(name, descriptor, self.pass)?;
        self.push(handle, AccessKind::Create);
        Ok(handle)
    }

    /// Record this pass on a worker thread into its own deferred context.
    pub fn request_deferred_context(&mut self) {
        self.record_mode = RecordMode::Deferred;
    }

    pub(crate) fn finish(self) -> (Vec<ResourceAccess>, RecordMode) {
        (self.accesses, self.record_mode)
    }
}
