//! Render graph definition and compilation

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::device::RenderDevice;
use crate::error::{DeviceError, FrameError, GraphError, PassError};
use crate::profiling::GpuProfiler;
use crate::render_graph::builder::PassBuilder;
use crate::render_graph::compiler::{self, CompiledGraph};
use crate::render_graph::context::PassContext;
use crate::render_graph::executor::{self, FrameReport};
use crate::render_graph::factory::FactoryRegistry;
use crate::render_graph::pass::{PassHandle, PassNode};
use crate::render_graph::resource::{
    DescriptorKind, GraphResource, ResourceDescriptor, ResourceHandle, ResourceId, ResourceRegistry,
};
use crate::thread_pool::WorkerPool;

/// The render graph describes a frame's rendering work.
///
/// # Construction
///
/// Resources and passes are added once, at startup. Each pass's setup
/// callback runs immediately with a [`PassBuilder`] and returns the data its
/// execute callback receives every frame:
///
/// ```
/// use std::sync::Arc;
/// use frame_graph::{RenderGraph, ResourceDescriptor, TextureDesc, TextureFormat};
/// use frame_graph::device::GpuTexture;
///
/// let mut graph = RenderGraph::new();
/// let exposure = graph.declare_external("Exposure", Arc::new(1.0f32)).unwrap();
///
/// let (geometry, gbuffer) = graph
///     .add_callback_pass(
///         "Geometry",
///         |builder| {
///             builder.read(exposure)?;
///             builder.create::<GpuTexture>(
///                 "GBuffer",
///                 ResourceDescriptor::Texture(TextureDesc::new(64, 64, TextureFormat::Rgba8Unorm)),
///             )
///         },
///         |_gbuffer, ctx| {
///             ctx.commands().marker("geometry");
///             Ok(())
///         },
///     )
///     .unwrap();
/// graph.mark_frame_output(gbuffer).unwrap();
///
/// assert_eq!(graph.compile().unwrap().pass_order(), &[geometry]);
/// ```
///
/// # Execution
///
/// [`execute`](Self::execute) compiles when the graph shape changed, realizes
/// resources, records every live pass and submits the buffers in compiled
/// order.
#[derive(Debug, Default)]
pub struct RenderGraph {
    passes: Vec<PassNode>,
    pass_names: HashMap<String, PassHandle>,
    resources: ResourceRegistry,
    factories: FactoryRegistry,
    /// Explicit dependency edges stored as (dependent, dependency) pairs.
    explicit_edges: Vec<(PassHandle, PassHandle)>,
    compiled: Option<CompiledGraph>,
    compile_count: u64,
}

impl RenderGraph {
    /// Create a new empty render graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&mut self) {
        self.compiled = None;
    }

    fn report(err: GraphError) -> GraphError {
        log::error!("[{}] {}", err.category(), err);
        err
    }

    /// Register a caller-owned resource.
    pub fn declare_external<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        value: Arc<T>,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let handle = self
            .resources
            .declare_external(name, value)
            .map_err(Self::report)?;
        self.invalidate();
        Ok(handle)
    }

    /// Replace the value of an external resource without recompiling.
    pub fn set_external<T: Any + Send + Sync>(
        &mut self,
        handle: ResourceHandle<T>,
        value: Arc<T>,
    ) -> Result<(), GraphError> {
        self.resources.set_external(handle, value)
    }

    /// Register a graph-owned resource with no creating pass.
    ///
    /// The first live pass that writes it makes it readable.
    pub fn declare_transient<T: GraphResource>(
        &mut self,
        name: &str,
        descriptor: ResourceDescriptor,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let handle = self
            .resources
            .declare_transient(name, descriptor)
            .map_err(Self::report)?;
        self.invalidate();
        Ok(handle)
    }

    /// Register the constructor for `T` resources described by `descriptor`.
    pub fn register_factory<T, F>(&mut self, descriptor: DescriptorKind, factory: F)
    where
        T: GraphResource,
        F: Fn(&str, &ResourceDescriptor) -> Result<T, DeviceError> + Send + Sync + 'static,
    {
        if self.factories.register(descriptor, factory) {
            log::debug!(
                "Replaced {} factory for {:?}",
                descriptor,
                std::any::type_name::<T>()
            );
        }
    }

    /// Add a pass.
    ///
    /// `setup` runs immediately and declares the pass's resource accesses. Its
    /// result is stored and handed to `execute` every frame; a copy is
    /// returned alongside the pass handle. A failed setup leaves the graph
    /// unchanged.
    pub fn add_callback_pass<D, S, E>(
        &mut self,
        name: &str,
        setup: S,
        execute: E,
    ) -> Result<(PassHandle, D), GraphError>
    where
        D: Clone + Send + Sync + 'static,
        S: FnOnce(&mut PassBuilder<'_>) -> Result<D, GraphError>,
        E: Fn(&D, &mut PassContext<'_>) -> Result<(), PassError> + Send + Sync + 'static,
    {
        if self.pass_names.contains_key(name) {
            return Err(Self::report(GraphError::DuplicatePass(name.to_string())));
        }

        let handle = PassHandle::new(self.passes.len() as u32);
        let resource_mark = self.resources.len();

        let mut builder = PassBuilder::new(handle, name, &mut self.resources);
        let result = setup(&mut builder);
        let (accesses, record_mode) = builder.finish();

        let result = match result {
            Ok(_) if accesses.is_empty() => Err(GraphError::EmptyPass(name.to_string())),
            other => other,
        };
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                self.resources.rollback(resource_mark, handle);
                return Err(Self::report(err));
            }
        };

        let shared = Arc::new(data.clone());
        let captured = Arc::clone(&shared);
        let node = PassNode::new(
            name.to_string(),
            accesses,
            record_mode,
            shared,
            Box::new(move |ctx: &mut PassContext<'_>| execute(&*captured, ctx)),
        );
        log::debug!(
            "Added pass '{}' ({:?}, {} accesses)",
            name,
            record_mode,
            node.accesses().len()
        );

        self.passes.push(node);
        self.pass_names.insert(name.to_string(), handle);
        self.invalidate();
        Ok((handle, data))
    }

    fn node_mut(&mut self, pass: PassHandle) -> Result<&mut PassNode, GraphError> {
        self.passes
            .get_mut(pass.index())
            .ok_or(GraphError::InvalidPassHandle(pass.raw()))
    }

    /// Add a dependency between passes.
    ///
    /// The `dependent` pass will execute after the `dependency` pass, and
    /// keeps it alive during culling.
    pub fn add_dependency(
        &mut self,
        dependent: PassHandle,
        dependency: PassHandle,
    ) -> Result<(), GraphError> {
        let name = self.node_mut(dependent)?.name().to_string();
        self.node_mut(dependency)?;
        if dependent == dependency {
            return Err(Self::report(GraphError::SelfDependency(name)));
        }

        // Check for duplicates
        let exists = self
            .explicit_edges
            .iter()
            .any(|&(d, dep)| d == dependent && dep == dependency);
        if !exists {
            self.explicit_edges.push((dependent, dependency));
            self.invalidate();
        }
        Ok(())
    }

    /// Exempt a pass from culling.
    pub fn set_cull_immune(&mut self, pass: PassHandle, cull_immune: bool) -> Result<(), GraphError> {
        self.node_mut(pass)?.set_cull_immune(cull_immune);
        self.invalidate();
        Ok(())
    }

    /// Enable or disable a pass. The graph recompiles on the next frame.
    pub fn set_pass_enabled(&mut self, pass: PassHandle, enabled: bool) -> Result<(), GraphError> {
        let node = self.node_mut(pass)?;
        if node.is_enabled() != enabled {
            node.set_enabled(enabled);
            log::debug!(
                "Pass '{}' {}",
                node.name(),
                if enabled { "enabled" } else { "disabled" }
            );
            self.invalidate();
        }
        Ok(())
    }

    /// Mark a resource as consumed outside the graph.
    ///
    /// Its creator and every writer become culling roots.
    pub fn mark_frame_output<T>(&mut self, resource: ResourceHandle<T>) -> Result<(), GraphError> {
        self.resources.set_frame_output(resource.id(), true)?;
        self.invalidate();
        Ok(())
    }

    /// Remove a frame-output mark.
    pub fn clear_frame_output<T>(&mut self, resource: ResourceHandle<T>) -> Result<(), GraphError> {
        self.resources.set_frame_output(resource.id(), false)?;
        self.invalidate();
        Ok(())
    }

    /// True when the next [`compile`](Self::compile) will do work.
    pub fn is_dirty(&self) -> bool {
        self.compiled.is_none()
    }

    /// Number of compilations performed so far.
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }

    fn take_compiled(&mut self) -> Result<CompiledGraph, GraphError> {
        if let Some(compiled) = self.compiled.take() {
            return Ok(compiled);
        }

        crate::profile_scope!("compile_graph");
        let compiled = compiler::compile(&self.passes, &self.resources, &self.explicit_edges)
            .map_err(Self::report)?;
        let released = self.resources.begin_epoch();
        self.compile_count += 1;
        log::debug!(
            "Compiled render graph: {} live, {} culled, {} disabled, {} edges ({} resources released)",
            compiled.pass_count(),
            compiled.culled().len(),
            compiled.disabled().len(),
            compiled.edges().len(),
            released
        );
        Ok(compiled)
    }

    /// Compile the graph, reusing the cached result when the shape is
    /// unchanged.
    ///
    /// A fresh compilation starts a new realization epoch, releasing the
    /// graph-owned objects of the previous one.
    pub fn compile(&mut self) -> Result<&CompiledGraph, GraphError> {
        let compiled = self.take_compiled()?;
        Ok(self.compiled.insert(compiled))
    }

    /// The cached compilation, if the graph is not dirty.
    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Compiled pass names in execution order.
    pub fn compiled_pass_names(&mut self) -> Result<Vec<&str>, GraphError> {
        self.compile()?;
        Ok(self
            .compiled
            .iter()
            .flat_map(|c| c.pass_order())
            .map(|&h| self.passes[h.index()].name())
            .collect())
    }

    /// Run one frame: compile if needed, realize, record, submit in order.
    pub fn execute(
        &mut self,
        device: &mut dyn RenderDevice,
        pool: &WorkerPool,
        profiler: Option<&GpuProfiler>,
        frame_index: u64,
    ) -> Result<FrameReport, FrameError> {
        let compiled = self.take_compiled()?;
        let result = executor::execute_frame(
            &self.passes,
            &mut self.resources,
            &self.factories,
            &compiled,
            device,
            pool,
            profiler,
            frame_index,
        );
        self.compiled = Some(compiled);
        result
    }

    /// Get all passes in the graph.
    pub fn passes(&self) -> &[PassNode] {
        &self.passes
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn pass(&self, handle: PassHandle) -> Option<&PassNode> {
        self.passes.get(handle.index())
    }

    pub fn find_pass(&self, name: &str) -> Option<PassHandle> {
        self.pass_names.get(name).copied()
    }

    /// The data a pass's setup returned.
    pub fn pass_data<D: Any>(&self, handle: PassHandle) -> Option<&D> {
        self.pass(handle)?.data().downcast_ref::<D>()
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Typed lookup of a resource by name.
    pub fn resource<T: Any>(&self, name: &str) -> Result<ResourceHandle<T>, GraphError> {
        self.resources.find_typed(name)
    }

    pub fn resource_name(&self, id: ResourceId) -> &str {
        self.resources.name(id)
    }

    /// Explicit dependencies as (dependent, dependency) pairs.
    pub fn explicit_dependencies(&self) -> &[(PassHandle, PassHandle)] {
        &self.explicit_edges
    }

    /// Release every graph-owned object. External values are untouched.
    pub fn teardown(&mut self) -> usize {
        self.resources.teardown()
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.resources.teardown();
    }
}
